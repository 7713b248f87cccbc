// File: redeemfx-core/src/session.rs
//
// The top-level object a host owns between login and logout. Ties the
// catalog, the redemption queue and processor, the scheduler and the
// realtime client together. `update` must be called once per frame.

use std::collections::HashSet;
use std::sync::Arc;

use rand::seq::IndexedRandom;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use redeemfx_common::models::{CatalogAvailability, PendingRedemption, RewardPatch, RewardSnapshot};
use crate::catalog::RewardCatalog;
use crate::config::SessionConfig;
use crate::platforms::{ConnectionState, RedemptionTransport, RewardGateway};
use crate::registry::RewardRegistry;
use crate::services::{
    RealtimeEventClient, ReconnectBackoff, RedemptionProcessor, RedemptionQueue, ResolvedRedemption,
    Scheduler, SimulationProbe,
};

/// User name attached to redemptions from [`IntegrationSession::stress_test`].
pub const STRESS_TEST_USER: &str = "Stress Test";

pub struct IntegrationSession {
    config: SessionConfig,
    catalog: RewardCatalog,
    processor: RedemptionProcessor,
    scheduler: Scheduler,
    queue: RedemptionQueue,
    realtime: Option<RealtimeEventClient>,
    runtime: Handle,
    disposed: bool,
}

impl IntegrationSession {
    /// `scheduler` should be the same instance the registered effects hold,
    /// so their follow-up work runs on this session's clock.
    pub fn new(
        config: SessionConfig,
        registry: RewardRegistry,
        gateway: Arc<dyn RewardGateway>,
        scheduler: Scheduler,
        runtime: Handle,
    ) -> Self {
        let (definitions, handlers) = registry.into_parts();
        info!("Starting integration session with {} rewards", definitions.len());

        let catalog = RewardCatalog::new(definitions, gateway, runtime.clone());
        let processor = RedemptionProcessor::new(handlers, scheduler.clone(), config.clone());
        let queue = processor.queue();
        Self {
            config,
            catalog,
            processor,
            scheduler,
            queue,
            realtime: None,
            runtime,
            disposed: false,
        }
    }

    pub fn with_probe(mut self, probe: impl SimulationProbe + 'static) -> Self {
        self.processor.set_probe(Box::new(probe));
        self
    }

    pub fn with_notifier(mut self, notify: impl Fn(&str) + 'static) -> Self {
        self.processor.set_notifier(Box::new(notify));
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn catalog(&self) -> &RewardCatalog {
        &self.catalog
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    // ------------------------------------------------------------------
    // Per-frame
    // ------------------------------------------------------------------

    /// Advances the scheduler by `dt` simulation seconds, then resolves
    /// every queued redemption.
    pub fn update(&mut self, dt: f64) -> Vec<ResolvedRedemption> {
        if self.disposed {
            return Vec::new();
        }
        self.scheduler.tick(dt);
        self.processor.drain(&self.catalog)
    }

    /// Producer side of the redemption queue, for hosts that bring their own
    /// event source.
    pub fn queue(&self) -> RedemptionQueue {
        self.queue.clone()
    }

    pub fn queued_redemptions(&self) -> usize {
        self.processor.queued()
    }

    /// True when nothing is queued or scheduled.
    pub fn is_idle(&self) -> bool {
        self.processor.queued() == 0 && self.scheduler.is_idle()
    }

    // ------------------------------------------------------------------
    // Catalog commands
    // ------------------------------------------------------------------

    pub fn availability(&self) -> CatalogAvailability {
        self.catalog.availability()
    }

    pub fn snapshot(&self) -> Vec<RewardSnapshot> {
        self.catalog.snapshot()
    }

    pub fn refresh_all(&self) -> JoinHandle<()> {
        self.catalog.refresh_all()
    }

    pub fn create(&self, title: &str, cost: u64, delay: u64) -> Option<JoinHandle<()>> {
        self.catalog.create(title, cost, delay)
    }

    pub fn update_reward(&self, title: &str, patch: RewardPatch) -> Option<JoinHandle<()>> {
        self.catalog.update(title, patch)
    }

    pub fn delete(&self, title: &str) -> Option<JoinHandle<()>> {
        self.catalog.delete(title)
    }

    pub fn create_all(&self) -> Vec<JoinHandle<()>> {
        self.catalog.create_all()
    }

    pub fn delete_all(&self) -> Vec<JoinHandle<()>> {
        self.catalog.delete_all()
    }

    // ------------------------------------------------------------------
    // Test harness
    // ------------------------------------------------------------------

    /// Queues a redemption without going through the realtime client.
    /// Returns false for titles the catalog does not declare.
    pub fn inject_redemption(&self, title: &str, user_name: &str) -> bool {
        if !self.catalog.contains(title) {
            warn!("Cannot redeem '{}' => no such reward", title);
            return false;
        }
        self.enqueue(PendingRedemption::manual(title, user_name))
    }

    /// Queues `count` redemptions of randomly chosen rewards.
    pub fn stress_test(&self, count: usize) -> usize {
        let titles = self.catalog.titles();
        let mut rng = rand::rng();
        let mut queued = 0;
        for _ in 0..count {
            let Some(title) = titles.choose(&mut rng) else { break };
            if self.enqueue(PendingRedemption::manual(title.as_str(), STRESS_TEST_USER)) {
                queued += 1;
            }
        }
        info!("Stress test queued {} redemptions", queued);
        queued
    }

    /// Makes every pending timer due on the next `update`.
    pub fn skip_timers(&self) -> usize {
        let n = self.scheduler.fast_forward_all();
        info!("Skipping {} timers", n);
        n
    }

    fn enqueue(&self, redemption: PendingRedemption) -> bool {
        if self.disposed {
            return false;
        }
        self.queue.send(redemption).is_ok()
    }

    // ------------------------------------------------------------------
    // Realtime
    // ------------------------------------------------------------------

    /// Starts listening for redemptions on `channel_id`. Replaces any
    /// previous connection.
    pub fn connect_realtime<T>(&mut self, transport: T, channel_id: &str)
    where
        T: RedemptionTransport + 'static,
    {
        if self.disposed {
            return;
        }
        if let Some(old) = self.realtime.take() {
            old.shutdown();
        }
        let known: HashSet<String> = self.catalog.titles().into_iter().collect();
        self.realtime = Some(RealtimeEventClient::spawn(
            &self.runtime,
            transport,
            channel_id,
            known,
            self.queue.clone(),
            ReconnectBackoff::from_config(&self.config),
        ));
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.realtime
            .as_ref()
            .map_or(ConnectionState::Disconnected, RealtimeEventClient::state)
    }

    pub fn realtime(&self) -> Option<&RealtimeEventClient> {
        self.realtime.as_ref()
    }

    /// Stops the realtime client and drops queued redemptions unresolved.
    /// In-flight remote calls finish on their own.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        if let Some(rt) = self.realtime.take() {
            rt.shutdown();
        }
        let dropped = self.processor.discard_queued();
        debug!("Session disposed ({} queued redemptions dropped)", dropped);
    }
}

impl Drop for IntegrationSession {
    fn drop(&mut self) {
        self.dispose();
    }
}
