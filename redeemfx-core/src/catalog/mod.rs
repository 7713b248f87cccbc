// File: redeemfx-core/src/catalog/mod.rs
//
// Local reward intent merged with the best-known remote state, plus the
// write path (create/update/delete/mark) that keeps the two in step.
//
// Every network call runs as a tokio task holding only a `Weak` to the
// catalog state, so a completion that lands after the session is gone is a
// silent no-op. Local state is always overwritten with what the server echoed,
// never with what we asked for.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use redeemfx_common::models::{
    CatalogAvailability, RedemptionHandle, RedemptionStatus, RemoteRewardState, RewardDefinition,
    RewardPatch, RewardSnapshot,
};
use crate::platforms::RewardGateway;

/// One declared reward and whatever we currently know about it remotely.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub definition: RewardDefinition,
    /// `None` means "not created remotely (as far as we know)".
    pub remote: Option<RemoteRewardState>,
    /// This session created the reward and may mutate or auto-resolve it.
    pub manageable: bool,
    /// Fields of update requests still in flight.
    in_flight: Option<RewardPatch>,
    in_flight_count: u32,
    /// Bumped whenever the bookkeeping above is reset.
    epoch: u64,
    creating: bool,
}

impl CatalogEntry {
    fn new(definition: RewardDefinition) -> Self {
        Self {
            definition,
            remote: None,
            manageable: false,
            in_flight: None,
            in_flight_count: 0,
            epoch: 0,
            creating: false,
        }
    }

    fn forget_remote(&mut self) {
        self.remote = None;
        self.manageable = false;
        self.in_flight = None;
        self.in_flight_count = 0;
        self.epoch += 1;
    }

    pub fn is_created(&self) -> bool {
        self.remote.is_some()
    }

    pub fn cost(&self) -> u64 {
        self.remote
            .as_ref()
            .map_or(self.definition.default_cost, |r| r.cost)
    }

    pub fn delay(&self) -> u64 {
        self.remote
            .as_ref()
            .map_or(self.definition.default_delay, RemoteRewardState::delay)
    }

    pub fn snapshot(&self) -> RewardSnapshot {
        RewardSnapshot {
            title: self.definition.title.clone(),
            cost: self.cost(),
            delay: self.delay(),
            enabled: self.remote.as_ref().is_some_and(|r| r.is_enabled),
            paused: self.remote.as_ref().is_some_and(|r| r.is_paused),
            manageable: self.manageable,
            created: self.is_created(),
            available_in_menu: self.definition.available_in_menu,
        }
    }

    /// Only the fields of `patch` that differ from the remote state as it
    /// will look once in-flight updates land.
    fn effective_diff(&self, remote: &RemoteRewardState, patch: RewardPatch) -> RewardPatch {
        let pending = self.in_flight.unwrap_or_default();
        let cost = pending.cost.unwrap_or(remote.cost);
        let delay = pending.delay.unwrap_or(remote.delay());
        let enabled = pending.enabled.unwrap_or(remote.is_enabled);
        let paused = pending.paused.unwrap_or(remote.is_paused);

        RewardPatch {
            cost: patch.cost.filter(|c| *c != cost),
            delay: patch.delay.filter(|d| *d != delay),
            enabled: patch.enabled.filter(|e| *e != enabled),
            paused: patch.paused.filter(|p| *p != paused),
        }
    }
}

#[derive(Debug, Default)]
struct CatalogState {
    entries: Vec<CatalogEntry>,
    index: HashMap<String, usize>,
    availability: CatalogAvailability,
    /// Bumped by every refresh; older fetch results are dropped.
    generation: u64,
}

impl CatalogState {
    fn entry(&self, title: &str) -> Option<&CatalogEntry> {
        self.index.get(title).map(|&i| &self.entries[i])
    }

    fn entry_mut(&mut self, title: &str) -> Option<&mut CatalogEntry> {
        self.index.get(title).map(|&i| &mut self.entries[i])
    }

    fn mutation_target(&mut self, title: &str, op: &str) -> Option<&mut CatalogEntry> {
        if self.availability != CatalogAvailability::Available {
            debug!("{op}('{title}') skipped => catalog is {:?}", self.availability);
            return None;
        }
        let entry = self.entry_mut(title);
        if entry.is_none() {
            warn!("{op}('{title}') => no such reward declared");
        }
        entry
    }
}

/// Owned by the session; dropping it turns every outstanding network
/// continuation into a no-op.
pub struct RewardCatalog {
    state: Arc<Mutex<CatalogState>>,
    gateway: Arc<dyn RewardGateway>,
    runtime: Handle,
}

impl RewardCatalog {
    pub fn new(
        definitions: Vec<RewardDefinition>,
        gateway: Arc<dyn RewardGateway>,
        runtime: Handle,
    ) -> Self {
        let mut state = CatalogState::default();
        for def in definitions {
            if state.index.contains_key(&def.title) {
                warn!("Duplicate reward definition '{}' => keeping the first", def.title);
                continue;
            }
            state.index.insert(def.title.clone(), state.entries.len());
            state.entries.push(CatalogEntry::new(def));
        }
        Self {
            state: Arc::new(Mutex::new(state)),
            gateway,
            runtime,
        }
    }

    fn weak(&self) -> Weak<Mutex<CatalogState>> {
        Arc::downgrade(&self.state)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn availability(&self) -> CatalogAvailability {
        self.state.lock().availability
    }

    pub fn contains(&self, title: &str) -> bool {
        self.state.lock().index.contains_key(title)
    }

    pub fn is_manageable(&self, title: &str) -> bool {
        self.state.lock().entry(title).is_some_and(|e| e.manageable)
    }

    pub fn definition(&self, title: &str) -> Option<RewardDefinition> {
        self.state.lock().entry(title).map(|e| e.definition.clone())
    }

    pub fn entry(&self, title: &str) -> Option<CatalogEntry> {
        self.state.lock().entry(title).cloned()
    }

    pub fn titles(&self) -> Vec<String> {
        self.state
            .lock()
            .entries
            .iter()
            .map(|e| e.definition.title.clone())
            .collect()
    }

    /// Rows in declaration order.
    pub fn snapshot(&self) -> Vec<RewardSnapshot> {
        self.state.lock().entries.iter().map(CatalogEntry::snapshot).collect()
    }

    // ------------------------------------------------------------------
    // RemoteSync
    // ------------------------------------------------------------------

    /// Forgets all remote state and reloads it: first every reward on the
    /// channel, then the subset this client may manage.
    pub fn refresh_all(&self) -> JoinHandle<()> {
        let generation = {
            let mut st = self.state.lock();
            st.generation += 1;
            st.availability = CatalogAvailability::Unknown;
            for e in st.entries.iter_mut() {
                e.forget_remote();
            }
            st.generation
        };
        info!("Refreshing reward catalog (generation {})", generation);

        let gateway = self.gateway.clone();
        let weak = self.weak();
        self.runtime.spawn(async move {
            let all = match gateway.list_rewards(false).await {
                Ok(list) => list,
                Err(e) => {
                    let diagnostic = match gateway.broadcaster_type().await {
                        Ok(t) if t.is_empty() => {
                            "channel points need an affiliate or partner account".to_string()
                        }
                        Ok(t) => format!("listing rewards failed for a '{t}' account: {e}"),
                        Err(e2) => format!("listing rewards failed: {e}; account lookup failed: {e2}"),
                    };
                    let Some(state) = weak.upgrade() else { return };
                    let mut st = state.lock();
                    if st.generation == generation {
                        st.availability = CatalogAvailability::Unavailable;
                        error!("Reward catalog unavailable => {}", diagnostic);
                    }
                    return;
                }
            };

            {
                let Some(state) = weak.upgrade() else { return };
                let mut st = state.lock();
                if st.generation != generation {
                    debug!("Dropping stale reward list (generation {})", generation);
                    return;
                }
                st.availability = CatalogAvailability::Available;
                apply_listing(&mut st, all, false);
            }

            match gateway.list_rewards(true).await {
                Ok(owned) => {
                    let Some(state) = weak.upgrade() else { return };
                    let mut st = state.lock();
                    if st.generation != generation {
                        debug!("Dropping stale owned-reward list (generation {})", generation);
                        return;
                    }
                    apply_listing(&mut st, owned, true);
                    info!(
                        "Reward catalog ready => {} created, {} manageable",
                        st.entries.iter().filter(|e| e.is_created()).count(),
                        st.entries.iter().filter(|e| e.manageable).count()
                    );
                }
                Err(e) => warn!("Listing manageable rewards failed => {}", e),
            }
        })
    }

    /// Creates `title` remotely. Only valid while the entry has no remote
    /// state; returns `None` when the call was skipped.
    pub fn create(&self, title: &str, cost: u64, delay: u64) -> Option<JoinHandle<()>> {
        {
            let mut st = self.state.lock();
            let entry = st.mutation_target(title, "create")?;
            if entry.remote.is_some() || entry.creating {
                debug!("create('{title}') skipped => already created or being created");
                return None;
            }
            entry.creating = true;
        }

        let gateway = self.gateway.clone();
        let weak = self.weak();
        let title = title.to_string();
        Some(self.runtime.spawn(async move {
            let result = gateway.create_reward(&title, cost, delay, true).await;
            let Some(state) = weak.upgrade() else { return };
            let mut st = state.lock();
            let Some(entry) = st.entry_mut(&title) else { return };
            entry.creating = false;
            match result {
                Ok(remote) => {
                    info!("Created reward '{}' (id={})", title, remote.id);
                    entry.remote = Some(remote);
                    entry.manageable = true;
                }
                Err(e) => warn!("Creating reward '{}' failed => {}", title, e),
            }
        }))
    }

    /// Applies the fields of `patch` that differ from the current remote
    /// state. Returns `None` when nothing needed sending.
    pub fn update(&self, title: &str, patch: RewardPatch) -> Option<JoinHandle<()>> {
        let (id, diff, epoch) = {
            let mut st = self.state.lock();
            let entry = st.mutation_target(title, "update")?;
            let remote = entry.remote.clone()?;
            if !entry.manageable {
                debug!("update('{title}') skipped => not manageable");
                return None;
            }
            let diff = entry.effective_diff(&remote, patch);
            if diff.is_empty() {
                debug!("update('{title}') => no change");
                return None;
            }
            entry.in_flight = Some(entry.in_flight.unwrap_or_default().merged_with(diff));
            entry.in_flight_count += 1;
            (remote.id, diff, entry.epoch)
        };
        debug!("update('{}') => sending {:?}", title, diff);

        let gateway = self.gateway.clone();
        let weak = self.weak();
        let title = title.to_string();
        Some(self.runtime.spawn(async move {
            let result = gateway.update_reward(&id, diff).await;
            let Some(state) = weak.upgrade() else { return };
            let mut st = state.lock();
            let Some(entry) = st.entry_mut(&title) else { return };

            // A refresh or delete in between already reset the bookkeeping.
            let same_reward = entry.remote.as_ref().is_some_and(|r| r.id == id);
            if !same_reward {
                debug!("update('{}') landed after the reward went away => ignored", title);
                return;
            }
            // Requests sent before a refresh no longer count towards the overlay.
            if entry.epoch == epoch {
                entry.in_flight_count = entry.in_flight_count.saturating_sub(1);
                if entry.in_flight_count == 0 {
                    entry.in_flight = None;
                }
            }
            match result {
                Ok(remote) => entry.remote = Some(remote),
                Err(e) => warn!("Updating reward '{}' failed => {}", title, e),
            }
        }))
    }

    /// Deletes `title` remotely. Local state is cleared right away; a failed
    /// call is only logged.
    pub fn delete(&self, title: &str) -> Option<JoinHandle<()>> {
        let id = {
            let mut st = self.state.lock();
            let entry = st.mutation_target(title, "delete")?;
            if !entry.manageable {
                debug!("delete('{title}') skipped => not manageable");
                return None;
            }
            let id = entry.remote.as_ref()?.id.clone();
            entry.forget_remote();
            id
        };

        let gateway = self.gateway.clone();
        let title = title.to_string();
        Some(self.runtime.spawn(async move {
            match gateway.delete_reward(&id).await {
                Ok(()) => info!("Deleted reward '{}'", title),
                Err(e) => warn!("Deleting reward '{}' failed => {}", title, e),
            }
        }))
    }

    /// Creates every declared reward that does not exist yet, with its
    /// default cost and cooldown.
    pub fn create_all(&self) -> Vec<JoinHandle<()>> {
        let missing: Vec<(String, u64, u64)> = {
            let st = self.state.lock();
            st.entries
                .iter()
                .filter(|e| e.remote.is_none())
                .map(|e| {
                    let d = &e.definition;
                    (d.title.clone(), d.default_cost, d.default_delay)
                })
                .collect()
        };
        missing
            .into_iter()
            .filter_map(|(title, cost, delay)| self.create(&title, cost, delay))
            .collect()
    }

    /// Deletes every reward this session manages.
    pub fn delete_all(&self) -> Vec<JoinHandle<()>> {
        let owned: Vec<String> = {
            let st = self.state.lock();
            st.entries
                .iter()
                .filter(|e| e.manageable)
                .map(|e| e.definition.title.clone())
                .collect()
        };
        owned.iter().filter_map(|t| self.delete(t)).collect()
    }

    /// Reports a redemption's final status. Skipped for rewards this session
    /// does not manage.
    pub fn mark_redemption(
        &self,
        title: &str,
        handle: &RedemptionHandle,
        status: RedemptionStatus,
    ) -> Option<JoinHandle<()>> {
        if status == RedemptionStatus::Unfulfilled {
            warn!("mark_redemption('{title}') => can only mark FULFILLED or CANCELED");
            return None;
        }
        if !self.is_manageable(title) {
            debug!("mark_redemption('{title}') skipped => not manageable");
            return None;
        }
        let gateway = self.gateway.clone();
        let handle = handle.clone();
        let title = title.to_string();
        Some(self.runtime.spawn(async move {
            match gateway.mark_redemption_status(&handle, status).await {
                Ok(()) => debug!("Marked redemption {} of '{}' as {}", handle.redemption_id, title, status),
                Err(e) => warn!(
                    "Marking redemption {} of '{}' as {} failed => {}",
                    handle.redemption_id, title, status, e
                ),
            }
        }))
    }
}

/// Matches remote rewards to declared titles. Titles we never declared are
/// ignored.
fn apply_listing(st: &mut CatalogState, list: Vec<RemoteRewardState>, owned: bool) {
    let mut seen = HashSet::new();
    for remote in list {
        let Some(entry) = st.entry_mut(&remote.title) else { continue };
        if !seen.insert(remote.title.clone()) {
            warn!("Remote lists '{}' more than once => keeping the first", remote.title);
            continue;
        }
        if owned {
            entry.manageable = true;
        }
        entry.remote = Some(remote);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::MockRewardGateway;

    fn remote(title: &str, cost: u64) -> RemoteRewardState {
        RemoteRewardState {
            id: format!("id-{title}"),
            title: title.to_string(),
            cost,
            is_global_cooldown_enabled: false,
            global_cooldown_seconds: 0,
            is_enabled: true,
            is_paused: false,
        }
    }

    fn handle() -> RedemptionHandle {
        RedemptionHandle {
            broadcaster_id: "1337".into(),
            reward_id: "id-Kill".into(),
            redemption_id: "r-1".into(),
            status: RedemptionStatus::Unfulfilled,
        }
    }

    #[tokio::test]
    async fn foreign_rewards_are_observable_but_never_marked() {
        let mut gw = MockRewardGateway::new();
        gw.expect_list_rewards()
            .withf(|owned| !*owned)
            .times(1)
            .returning(|_| Ok(vec![remote("Kill", 50)]));
        gw.expect_list_rewards()
            .withf(|owned| *owned)
            .times(1)
            .returning(|_| Ok(vec![]));
        gw.expect_mark_redemption_status().never();
        gw.expect_update_reward().never();
        gw.expect_delete_reward().never();

        let catalog = RewardCatalog::new(
            vec![RewardDefinition::new("Kill").with_cost(10)],
            Arc::new(gw),
            Handle::current(),
        );
        catalog.refresh_all().await.unwrap();

        let row = &catalog.snapshot()[0];
        assert!(row.created);
        assert!(!row.manageable);
        assert_eq!(row.cost, 50);

        assert!(catalog.mark_redemption("Kill", &handle(), RedemptionStatus::Fulfilled).is_none());
        assert!(catalog.update("Kill", RewardPatch { cost: Some(1), ..Default::default() }).is_none());
        assert!(catalog.delete("Kill").is_none());
    }

    #[tokio::test]
    async fn failed_listing_marks_catalog_unavailable() {
        let mut gw = MockRewardGateway::new();
        gw.expect_list_rewards()
            .returning(|_| Err(crate::Error::Platform("HTTP 403".into())));
        gw.expect_broadcaster_type().returning(|| Ok(String::new()));
        gw.expect_create_reward().never();

        let catalog = RewardCatalog::new(
            vec![RewardDefinition::new("Kill")],
            Arc::new(gw),
            Handle::current(),
        );
        catalog.refresh_all().await.unwrap();

        assert_eq!(catalog.availability(), CatalogAvailability::Unavailable);
        assert!(catalog.create("Kill", 10, 0).is_none());
    }

    #[test]
    fn entry_falls_back_to_definition_defaults() {
        let entry = CatalogEntry::new(RewardDefinition::new("Kill").with_cost(10).with_delay(30));
        assert_eq!(entry.cost(), 10);
        assert_eq!(entry.delay(), 30);
        assert!(!entry.snapshot().created);
    }
}
