// File: redeemfx-core/src/services/realtime_client.rs
//
// Keeps a redemption stream alive in the background and hands every event
// for a known reward to the redemption queue.

use std::collections::HashSet;
use std::time::Duration;

use rand::Rng;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use redeemfx_common::models::PendingRedemption;
use crate::Error;
use crate::config::SessionConfig;
use crate::platforms::{ConnectionState, RedemptionEvent, RedemptionTransport};
use crate::services::redemption_processor::RedemptionQueue;

/// Jittered exponential backoff: attempt `n` (1-based) waits
/// `min(j * 2^(n-1), cap)` seconds with `j` drawn uniformly from `base`.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    base: (f64, f64),
    cap: f64,
    attempt: u32,
}

impl ReconnectBackoff {
    pub fn new(base: (f64, f64), cap: f64) -> Self {
        Self { base, cap, attempt: 0 }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.reconnect_base_secs, config.reconnect_cap_secs)
    }

    /// Deterministic part of the schedule, for a given jitter factor.
    /// Never negative, even for a config that skipped validation.
    pub fn delay_secs(attempt: u32, jitter: f64, cap: f64) -> f64 {
        let exp = attempt.saturating_sub(1).min(63) as i32;
        (jitter * 2f64.powi(exp)).min(cap).max(0.0)
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn next_delay(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        let (lo, hi) = self.base;
        let jitter = if hi > lo { rand::rng().random_range(lo..=hi) } else { lo };
        let secs = Self::delay_secs(self.attempt, jitter, self.cap);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Handle to the background connection task. Dropping it stops the task.
pub struct RealtimeEventClient {
    state: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl RealtimeEventClient {
    /// Spawns the connection loop on `runtime`. Events whose reward title is
    /// not in `known_titles` are dropped.
    pub fn spawn<T>(
        runtime: &Handle,
        transport: T,
        channel_id: impl Into<String>,
        known_titles: HashSet<String>,
        queue: RedemptionQueue,
        backoff: ReconnectBackoff,
    ) -> Self
    where
        T: RedemptionTransport + 'static,
    {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let cancel = CancellationToken::new();
        let worker = Worker {
            transport,
            channel_id: channel_id.into(),
            known_titles,
            queue,
            backoff,
            state: state_tx,
            cancel: cancel.clone(),
        };
        let task = runtime.spawn(worker.run());
        Self {
            state: state_rx,
            cancel,
            task: Some(task),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Stops the connection, including a reconnect wait in progress.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Stops and waits until the transport has been closed.
    pub async fn shutdown_and_wait(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Realtime client task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for RealtimeEventClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Worker<T> {
    transport: T,
    channel_id: String,
    known_titles: HashSet<String>,
    queue: RedemptionQueue,
    backoff: ReconnectBackoff,
    state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
}

enum StreamEnd {
    Closed,
    Failed(Error),
    QueueGone,
}

impl<T: RedemptionTransport> Worker<T> {
    fn set_state(&self, state: ConnectionState) {
        debug!("Realtime connection => {:?}", state);
        self.state.send_replace(state);
    }

    async fn run(mut self) {
        self.set_state(ConnectionState::Connecting);
        loop {
            let connected = tokio::select! {
                _ = self.cancel.cancelled() => break,
                r = connect_and_subscribe(&mut self.transport, &self.channel_id) => r,
            };

            match connected {
                Ok(()) => {
                    self.backoff.reset();
                    self.set_state(ConnectionState::Subscribed);
                    info!("Listening for redemptions on channel {}", self.channel_id);

                    let end = tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        end = pump(&mut self.transport, &self.known_titles, &self.queue) => end,
                    };
                    match end {
                        StreamEnd::Closed => warn!("Redemption stream closed"),
                        StreamEnd::Failed(e) => warn!("Redemption stream failed => {}", e),
                        StreamEnd::QueueGone => {
                            debug!("Redemption queue dropped => stopping realtime client");
                            break;
                        }
                    }
                }
                Err(e) => warn!("Connecting to the redemption stream failed => {}", e),
            }

            self.set_state(ConnectionState::Disconnected);
            let delay = self.backoff.next_delay();
            self.set_state(ConnectionState::Reconnecting);
            info!(
                "Reconnecting in {:.1}s (attempt {})",
                delay.as_secs_f64(),
                self.backoff.attempt()
            );
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.transport.close().await;
        self.set_state(ConnectionState::Disconnected);
        debug!("Realtime client stopped");
    }
}

async fn connect_and_subscribe<T: RedemptionTransport>(transport: &mut T, channel_id: &str) -> Result<(), Error> {
    transport.connect().await?;
    transport.subscribe(channel_id).await
}

async fn pump<T: RedemptionTransport>(
    transport: &mut T,
    known_titles: &HashSet<String>,
    queue: &RedemptionQueue,
) -> StreamEnd {
    loop {
        let evt: RedemptionEvent = match transport.next_event().await {
            Ok(Some(evt)) => evt,
            Ok(None) => return StreamEnd::Closed,
            Err(e) => return StreamEnd::Failed(e),
        };
        if !known_titles.contains(&evt.reward_title) {
            debug!("Ignoring redemption for unknown reward '{}'", evt.reward_title);
            continue;
        }
        let handle = evt.handle();
        let pending = PendingRedemption::from_event(evt.reward_title, evt.user_name, handle);
        if queue.send(pending).is_err() {
            return StreamEnd::QueueGone;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_and_caps() {
        let d: Vec<f64> = (1..=7).map(|n| ReconnectBackoff::delay_secs(n, 1.5, 30.0)).collect();
        assert_eq!(d, vec![1.5, 3.0, 6.0, 12.0, 24.0, 30.0, 30.0]);
    }

    #[test]
    fn jitter_stays_in_bounds() {
        let mut b = ReconnectBackoff::new((1.0, 2.0), 30.0);
        for n in 1..=8u32 {
            let secs = b.next_delay().as_secs_f64();
            let lo = (2f64.powi(n as i32 - 1)).min(30.0);
            let hi = (2.0 * 2f64.powi(n as i32 - 1)).min(30.0);
            assert!(secs >= lo && secs <= hi, "attempt {n}: {secs} not in [{lo}, {hi}]");
        }
        b.reset();
        assert!(b.next_delay().as_secs_f64() <= 2.0);
    }

    #[test]
    fn unchecked_negative_base_waits_zero() {
        let mut b = ReconnectBackoff::new((-1.0, -1.0), -5.0);
        for _ in 0..3 {
            assert_eq!(b.next_delay(), Duration::ZERO);
        }
        assert_eq!(ReconnectBackoff::delay_secs(2, f64::NAN, 30.0), 30.0);
    }
}
