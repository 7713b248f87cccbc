// File: redeemfx-core/src/services/redemption_processor.rs
//
// Drains the redemption queue on the simulation thread, runs the effect for
// each redemption, and decides what gets reported back to the platform.

use chrono::Utc;
use crossbeam_channel::{Receiver, Sender};
use rand::Rng;
use tracing::{debug, info, warn};
use uuid::Uuid;

use redeemfx_common::models::{Fulfillment, Outcome, PendingRedemption, RedemptionStatus};
use crate::catalog::RewardCatalog;
use crate::config::SessionConfig;
use crate::registry::HandlerTable;
use crate::services::scheduler::Scheduler;

/// Producer side of the redemption queue. Safe to move to another thread.
pub type RedemptionQueue = Sender<PendingRedemption>;

/// Receives the human-readable "X redeemed by Y" lines.
pub type NotificationSink = Box<dyn Fn(&str)>;

/// What the host simulation reports about itself, polled once per redemption.
#[cfg_attr(test, mockall::automock)]
pub trait SimulationProbe {
    /// False while there is nothing to apply effects to (e.g. main menu).
    fn is_running(&self) -> bool;

    /// Seconds the simulation has been paused or idle; 0 when active.
    fn paused_for(&self) -> f64;
}

/// Probe for hosts that never pause.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysRunning;

impl SimulationProbe for AlwaysRunning {
    fn is_running(&self) -> bool {
        true
    }

    fn paused_for(&self) -> f64 {
        0.0
    }
}

/// The result of one processing attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRedemption {
    pub id: Uuid,
    pub reward_title: String,
    pub user_name: String,
    pub retries: u32,
    pub fulfillment: Fulfillment,
}

pub struct RedemptionProcessor {
    receiver: Receiver<PendingRedemption>,
    sender: Sender<PendingRedemption>,
    handlers: HandlerTable,
    scheduler: Scheduler,
    probe: Box<dyn SimulationProbe>,
    notify: NotificationSink,
    config: SessionConfig,
}

impl RedemptionProcessor {
    pub fn new(handlers: HandlerTable, scheduler: Scheduler, config: SessionConfig) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            receiver,
            sender,
            handlers,
            scheduler,
            probe: Box::new(AlwaysRunning),
            notify: Box::new(|msg| info!("{}", msg)),
            config,
        }
    }

    pub fn set_probe(&mut self, probe: Box<dyn SimulationProbe>) {
        self.probe = probe;
    }

    pub fn set_notifier(&mut self, notify: NotificationSink) {
        self.notify = notify;
    }

    pub fn queue(&self) -> RedemptionQueue {
        self.sender.clone()
    }

    pub fn queued(&self) -> usize {
        self.receiver.len()
    }

    /// Resolves everything that was queued when the call started. Retries
    /// scheduled during this drain come back through the scheduler later.
    pub fn drain(&mut self, catalog: &RewardCatalog) -> Vec<ResolvedRedemption> {
        let mut resolved = Vec::new();
        for _ in 0..self.receiver.len() {
            let Ok(redemption) = self.receiver.try_recv() else { break };
            resolved.push(self.process(redemption, catalog));
        }
        resolved
    }

    /// Drops whatever is still queued without resolving it.
    pub fn discard_queued(&mut self) -> usize {
        self.receiver.try_iter().count()
    }

    pub fn process(&mut self, mut redemption: PendingRedemption, catalog: &RewardCatalog) -> ResolvedRedemption {
        let title = redemption.reward_title.clone();
        let fulfillment = match catalog.definition(&title) {
            None => {
                warn!("Redemption {} for unknown reward '{}' => refund", redemption.id, title);
                Fulfillment::Refund
            }
            Some(def) if !def.available_in_menu && !self.is_simulation_available() => {
                info!(
                    "'{}' redeemed by {} while the game is unavailable => refund",
                    title, redemption.user_name
                );
                Fulfillment::Refund
            }
            Some(def) => {
                let outcome = self.handlers.invoke(&title);
                debug!("'{}' (attempt {}) => {:?}", title, redemption.retries + 1, outcome);
                match outcome {
                    Outcome::Done => {
                        (self.notify)(&format!(
                            "{} redeemed by {}",
                            def.notification_name(),
                            redemption.user_name
                        ));
                        Fulfillment::Fulfill
                    }
                    Outcome::Cancel => Fulfillment::Refund,
                    Outcome::TryLater => self.retry_or_refund(&mut redemption),
                }
            }
        };

        let report = ResolvedRedemption {
            id: redemption.id,
            reward_title: title,
            user_name: redemption.user_name.clone(),
            retries: redemption.retries,
            fulfillment,
        };

        match fulfillment {
            Fulfillment::None => self.schedule_retry(redemption),
            Fulfillment::Fulfill => self.report(&redemption, catalog, RedemptionStatus::Fulfilled),
            Fulfillment::Refund => self.report(&redemption, catalog, RedemptionStatus::Canceled),
        }
        report
    }

    fn is_simulation_available(&self) -> bool {
        self.probe.is_running() && self.probe.paused_for() <= self.config.idle_threshold_secs
    }

    fn retry_or_refund(&self, redemption: &mut PendingRedemption) -> Fulfillment {
        if !self.config.retry_failed_rewards {
            debug!("'{}' asked to retry but retries are off => refund", redemption.reward_title);
            return Fulfillment::Refund;
        }
        if redemption.retries >= self.config.max_retries {
            let waited = (Utc::now() - redemption.received_at).num_seconds();
            info!(
                "'{}' for {} still failing after {} retries ({}s since redeemed) => refund",
                redemption.reward_title, redemption.user_name, redemption.retries, waited
            );
            return Fulfillment::Refund;
        }
        redemption.retries += 1;
        Fulfillment::None
    }

    fn schedule_retry(&self, redemption: PendingRedemption) {
        let (lo, hi) = self.config.retry_delay_secs;
        let delay = if hi > lo { rand::rng().random_range(lo..=hi) } else { lo };
        debug!(
            "Retrying '{}' for {} in {:.1}s (retry {})",
            redemption.reward_title, redemption.user_name, delay, redemption.retries
        );

        let queue = self.sender.clone();
        self.scheduler.set(delay, move || {
            if queue.send(redemption).is_err() {
                debug!("Redemption queue closed => retry dropped");
            }
        });
    }

    fn report(&self, redemption: &PendingRedemption, catalog: &RewardCatalog, status: RedemptionStatus) {
        let Some(handle) = redemption.handle.as_ref() else {
            return;
        };
        let title = &redemption.reward_title;
        if handle.status != RedemptionStatus::Unfulfilled {
            debug!("Redemption {} already {} => not marking", handle.redemption_id, handle.status);
            return;
        }
        if !catalog.is_manageable(title) {
            debug!("'{}' is not ours => leaving redemption for manual review", title);
            return;
        }
        if !self.config.should_auto_fulfill(title) {
            debug!("Auto-fulfill off for '{}' => leaving redemption for manual review", title);
            return;
        }
        let _ = catalog.mark_redemption(title, handle, status);
    }
}
