// File: src/platforms/mod.rs

use async_trait::async_trait;
use redeemfx_common::models::{RedemptionHandle, RedemptionStatus, RemoteRewardState, RewardPatch};
use crate::Error;

pub use redeemfx_common::models::ConnectionState;

/// Remote reward/redemption API for a single channel.
///
/// Implementations may run on any thread; callers only rely on the
/// success/failure contract of each call.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RewardGateway: Send + Sync {
    /// All custom rewards, or only those this client is allowed to manage.
    async fn list_rewards(&self, owned_only: bool) -> Result<Vec<RemoteRewardState>, Error>;

    async fn create_reward(
        &self,
        title: &str,
        cost: u64,
        delay: u64,
        enabled: bool,
    ) -> Result<RemoteRewardState, Error>;

    async fn update_reward(&self, id: &str, patch: RewardPatch) -> Result<RemoteRewardState, Error>;

    async fn delete_reward(&self, id: &str) -> Result<(), Error>;

    /// Marking a redemption that is already resolved must not fail.
    async fn mark_redemption_status(
        &self,
        handle: &RedemptionHandle,
        status: RedemptionStatus,
    ) -> Result<(), Error>;

    /// "partner", "affiliate" or "" for regular accounts.
    async fn broadcaster_type(&self) -> Result<String, Error>;
}

/// One redemption notification from the realtime stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedemptionEvent {
    pub broadcaster_id: String,
    pub redemption_id: String,
    pub reward_id: String,
    pub reward_title: String,
    pub user_name: String,
    pub status: RedemptionStatus,
}

impl RedemptionEvent {
    pub fn handle(&self) -> RedemptionHandle {
        RedemptionHandle {
            broadcaster_id: self.broadcaster_id.clone(),
            reward_id: self.reward_id.clone(),
            redemption_id: self.redemption_id.clone(),
            status: self.status,
        }
    }
}

/// A live connection that delivers redemption events for one channel.
#[async_trait]
pub trait RedemptionTransport: Send {
    /// Opens (or reopens) the underlying connection.
    async fn connect(&mut self) -> Result<(), Error>;

    /// Subscribes the current connection to the channel's redemption topic.
    async fn subscribe(&mut self, channel_id: &str) -> Result<(), Error>;

    /// Waits for the next redemption. `Ok(None)` means the connection closed.
    async fn next_event(&mut self) -> Result<Option<RedemptionEvent>, Error>;

    async fn close(&mut self);
}

pub mod twitch;
pub mod twitch_eventsub;
