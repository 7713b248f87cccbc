// File: redeemfx-core/src/test_utils/mod.rs
//
// In-memory stand-ins for the remote platform and the host simulation. Used
// by the integration tests and by the CLI's offline commands.

use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use redeemfx_common::models::{RedemptionHandle, RedemptionStatus, RemoteRewardState, RewardPatch};
use crate::Error;
use crate::platforms::{RedemptionEvent, RedemptionTransport, RewardGateway};
use crate::services::SimulationProbe;

pub const FAKE_BROADCASTER_ID: &str = "1337";

#[derive(Debug, Clone)]
struct FakeReward {
    state: RemoteRewardState,
    owned: bool,
}

#[derive(Debug, Default)]
struct FakeGatewayState {
    rewards: Vec<FakeReward>,
    next_id: u64,
    fail_list: bool,
    fail_owned_list: bool,
    fail_create: bool,
    fail_mark: bool,
    fail_delete: bool,
    hold_updates: bool,
    held_updates: VecDeque<oneshot::Sender<()>>,
    broadcaster_type: String,
    marks: Vec<(RedemptionHandle, RedemptionStatus)>,
    list_calls: usize,
    create_calls: usize,
    update_calls: usize,
    delete_calls: usize,
    mark_calls: usize,
}

/// A channel's rewards kept in memory, with call counters.
///
/// Rewards created through the gateway are "owned"; rewards seeded with
/// [`FakeGateway::with_foreign_reward`] behave like ones a human made on the
/// platform's dashboard.
pub struct FakeGateway {
    state: Mutex<FakeGatewayState>,
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeGatewayState {
                broadcaster_type: "affiliate".into(),
                ..Default::default()
            }),
        }
    }

    fn insert(&self, title: &str, cost: u64, delay: u64, owned: bool) {
        let mut st = self.state.lock();
        st.next_id += 1;
        let id = format!("fake-{}", st.next_id);
        st.rewards.push(FakeReward {
            state: RemoteRewardState {
                id,
                title: title.to_string(),
                cost,
                is_global_cooldown_enabled: delay > 0,
                global_cooldown_seconds: delay,
                is_enabled: true,
                is_paused: false,
            },
            owned,
        });
    }

    pub fn with_foreign_reward(self, title: &str, cost: u64) -> Self {
        self.insert(title, cost, 0, false);
        self
    }

    pub fn with_owned_reward(self, title: &str, cost: u64, delay: u64) -> Self {
        self.insert(title, cost, delay, true);
        self
    }

    /// Simulates an account without channel points.
    pub fn without_channel_points(self) -> Self {
        {
            let mut st = self.state.lock();
            st.fail_list = true;
            st.broadcaster_type = String::new();
        }
        self
    }

    pub fn set_fail_list(&self, fail: bool) {
        self.state.lock().fail_list = fail;
    }

    /// Fails only the owner-only listing; the full listing keeps working.
    pub fn set_fail_owned_list(&self, fail: bool) {
        self.state.lock().fail_owned_list = fail;
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.state.lock().fail_create = fail;
    }

    pub fn set_fail_mark(&self, fail: bool) {
        self.state.lock().fail_mark = fail;
    }

    pub fn set_fail_delete(&self, fail: bool) {
        self.state.lock().fail_delete = fail;
    }

    /// While set, update calls are counted on arrival but only applied once
    /// released with [`FakeGateway::release_update`], oldest first.
    pub fn set_hold_updates(&self, hold: bool) {
        self.state.lock().hold_updates = hold;
    }

    /// Lets the oldest held update through. Returns false if none is waiting.
    pub fn release_update(&self) -> bool {
        let mut st = self.state.lock();
        while let Some(tx) = st.held_updates.pop_front() {
            if tx.send(()).is_ok() {
                return true;
            }
        }
        false
    }

    pub fn held_updates(&self) -> usize {
        self.state.lock().held_updates.len()
    }

    /// Changes a reward behind the session's back, like an edit on the
    /// platform's own UI.
    pub fn edit_remote(&self, title: &str, cost: u64) {
        let mut st = self.state.lock();
        if let Some(r) = st.rewards.iter_mut().find(|r| r.state.title == title) {
            r.state.cost = cost;
        }
    }

    pub fn remote(&self, title: &str) -> Option<RemoteRewardState> {
        self.state
            .lock()
            .rewards
            .iter()
            .find(|r| r.state.title == title)
            .map(|r| r.state.clone())
    }

    pub fn marks(&self) -> Vec<(RedemptionHandle, RedemptionStatus)> {
        self.state.lock().marks.clone()
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().list_calls
    }

    pub fn create_calls(&self) -> usize {
        self.state.lock().create_calls
    }

    pub fn update_calls(&self) -> usize {
        self.state.lock().update_calls
    }

    pub fn delete_calls(&self) -> usize {
        self.state.lock().delete_calls
    }

    pub fn mark_calls(&self) -> usize {
        self.state.lock().mark_calls
    }

    /// Handle of a fresh, unfulfilled redemption of `title`.
    pub fn redemption_handle(&self, title: &str, redemption_id: &str) -> RedemptionHandle {
        RedemptionHandle {
            broadcaster_id: FAKE_BROADCASTER_ID.into(),
            reward_id: self.remote(title).map(|r| r.id).unwrap_or_default(),
            redemption_id: redemption_id.into(),
            status: RedemptionStatus::Unfulfilled,
        }
    }
}

#[async_trait]
impl RewardGateway for FakeGateway {
    async fn list_rewards(&self, owned_only: bool) -> Result<Vec<RemoteRewardState>, Error> {
        let mut st = self.state.lock();
        st.list_calls += 1;
        if st.fail_list {
            return Err(Error::Platform("HTTP 403 => channel points unavailable".into()));
        }
        if owned_only && st.fail_owned_list {
            return Err(Error::Platform("HTTP 500 => owner-only listing failed".into()));
        }
        Ok(st
            .rewards
            .iter()
            .filter(|r| !owned_only || r.owned)
            .map(|r| r.state.clone())
            .collect())
    }

    async fn create_reward(
        &self,
        title: &str,
        cost: u64,
        delay: u64,
        enabled: bool,
    ) -> Result<RemoteRewardState, Error> {
        {
            let mut st = self.state.lock();
            st.create_calls += 1;
            if st.fail_create {
                return Err(Error::Platform("HTTP 500 => create failed".into()));
            }
            if st.rewards.iter().any(|r| r.state.title == title) {
                return Err(Error::Platform("HTTP 400 => CREATE_CUSTOM_REWARD_DUPLICATE_REWARD".into()));
            }
        }
        self.insert(title, cost, delay, true);
        let mut created = self
            .remote(title)
            .ok_or_else(|| Error::NotFound(title.to_string()))?;
        if !enabled {
            let mut st = self.state.lock();
            if let Some(r) = st.rewards.iter_mut().find(|r| r.state.title == title) {
                r.state.is_enabled = false;
            }
            created.is_enabled = false;
        }
        Ok(created)
    }

    async fn update_reward(&self, id: &str, patch: RewardPatch) -> Result<RemoteRewardState, Error> {
        let held = {
            let mut st = self.state.lock();
            st.update_calls += 1;
            if st.hold_updates {
                let (tx, rx) = oneshot::channel();
                st.held_updates.push_back(tx);
                Some(rx)
            } else {
                None
            }
        };
        if let Some(rx) = held {
            let _ = rx.await;
        }

        let mut st = self.state.lock();
        let reward = st
            .rewards
            .iter_mut()
            .find(|r| r.state.id == id)
            .ok_or_else(|| Error::NotFound(format!("reward {id}")))?;
        if !reward.owned {
            return Err(Error::Platform("HTTP 403 => not created by this client".into()));
        }
        let s = &mut reward.state;
        if let Some(cost) = patch.cost {
            s.cost = cost;
        }
        if let Some(delay) = patch.delay {
            s.is_global_cooldown_enabled = delay > 0;
            s.global_cooldown_seconds = delay;
        }
        if let Some(enabled) = patch.enabled {
            s.is_enabled = enabled;
        }
        if let Some(paused) = patch.paused {
            s.is_paused = paused;
        }
        Ok(s.clone())
    }

    async fn delete_reward(&self, id: &str) -> Result<(), Error> {
        let mut st = self.state.lock();
        st.delete_calls += 1;
        if st.fail_delete {
            return Err(Error::Platform("HTTP 500 => delete failed".into()));
        }
        let before = st.rewards.len();
        st.rewards.retain(|r| !(r.state.id == id && r.owned));
        if st.rewards.len() == before {
            return Err(Error::NotFound(format!("reward {id}")));
        }
        Ok(())
    }

    async fn mark_redemption_status(
        &self,
        handle: &RedemptionHandle,
        status: RedemptionStatus,
    ) -> Result<(), Error> {
        let mut st = self.state.lock();
        st.mark_calls += 1;
        if st.fail_mark {
            return Err(Error::Platform("HTTP 503".into()));
        }
        st.marks.push((handle.clone(), status));
        Ok(())
    }

    async fn broadcaster_type(&self) -> Result<String, Error> {
        Ok(self.state.lock().broadcaster_type.clone())
    }
}

/// A redemption stream whose first `failures` connection attempts fail.
/// Events pushed through [`FakeTransportControl`] are delivered once
/// subscribed.
pub struct FakeTransport {
    failures_left: usize,
    connected: bool,
    events: mpsc::UnboundedReceiver<Option<RedemptionEvent>>,
    control: FakeTransportControl,
}

/// Test-side handle of a [`FakeTransport`].
#[derive(Clone)]
pub struct FakeTransportControl {
    events: mpsc::UnboundedSender<Option<RedemptionEvent>>,
    connect_attempts: Arc<Mutex<Vec<Instant>>>,
    subscribes: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl FakeTransport {
    pub fn new(failures: usize) -> (Self, FakeTransportControl) {
        let (tx, rx) = mpsc::unbounded_channel();
        let control = FakeTransportControl {
            events: tx,
            connect_attempts: Arc::new(Mutex::new(Vec::new())),
            subscribes: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
        };
        let transport = Self {
            failures_left: failures,
            connected: false,
            events: rx,
            control: control.clone(),
        };
        (transport, control)
    }
}

impl FakeTransportControl {
    pub fn push(&self, event: RedemptionEvent) {
        let _ = self.events.send(Some(event));
    }

    /// Makes the current connection drop.
    pub fn disconnect(&self) {
        let _ = self.events.send(None);
    }

    /// Instants of every connection attempt, successful or not.
    pub fn connect_attempts(&self) -> Vec<Instant> {
        self.connect_attempts.lock().clone()
    }

    pub fn subscribes(&self) -> usize {
        self.subscribes.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RedemptionTransport for FakeTransport {
    async fn connect(&mut self) -> Result<(), Error> {
        self.control.connect_attempts.lock().push(Instant::now());
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(Error::Platform("connection refused".into()));
        }
        self.connected = true;
        Ok(())
    }

    async fn subscribe(&mut self, _channel_id: &str) -> Result<(), Error> {
        if !self.connected {
            return Err(Error::Platform("not connected".into()));
        }
        self.control.subscribes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn next_event(&mut self) -> Result<Option<RedemptionEvent>, Error> {
        if !self.connected {
            return Ok(None);
        }
        match self.events.recv().await {
            Some(Some(evt)) => Ok(Some(evt)),
            Some(None) | None => {
                self.connected = false;
                Ok(None)
            }
        }
    }

    async fn close(&mut self) {
        self.connected = false;
        self.control.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Builds the event the platform would send for a redemption of `title`.
pub fn redemption_event(gateway: &FakeGateway, title: &str, user: &str, redemption_id: &str) -> RedemptionEvent {
    let handle = gateway.redemption_handle(title, redemption_id);
    RedemptionEvent {
        broadcaster_id: handle.broadcaster_id,
        redemption_id: handle.redemption_id,
        reward_id: handle.reward_id,
        reward_title: title.to_string(),
        user_name: user.to_string(),
        status: handle.status,
    }
}

/// A simulation whose running/paused state tests can flip. Clones share
/// state.
#[derive(Clone)]
pub struct FakeProbe {
    running: Rc<Cell<bool>>,
    paused_for: Rc<Cell<f64>>,
}

impl Default for FakeProbe {
    fn default() -> Self {
        Self {
            running: Rc::new(Cell::new(true)),
            paused_for: Rc::new(Cell::new(0.0)),
        }
    }
}

impl FakeProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_running(&self, running: bool) {
        self.running.set(running);
    }

    pub fn set_paused_for(&self, secs: f64) {
        self.paused_for.set(secs);
    }
}

impl SimulationProbe for FakeProbe {
    fn is_running(&self) -> bool {
        self.running.get()
    }

    fn paused_for(&self) -> f64 {
        self.paused_for.get()
    }
}
