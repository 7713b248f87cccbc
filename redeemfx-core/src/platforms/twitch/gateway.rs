// File: redeemfx-core/src/platforms/twitch/gateway.rs

use async_trait::async_trait;
use tracing::debug;

use redeemfx_common::models::{RedemptionHandle, RedemptionStatus, RemoteRewardState, RewardPatch};
use crate::Error;
use crate::platforms::RewardGateway;
use crate::platforms::twitch::client::TwitchHelixClient;
use crate::platforms::twitch::requests::channel_points::CustomRewardBody;

/// `RewardGateway` backed by Helix, bound to one broadcaster.
#[derive(Clone)]
pub struct HelixRewardGateway {
    client: TwitchHelixClient,
    broadcaster_id: String,
}

impl HelixRewardGateway {
    pub fn new(client: TwitchHelixClient, broadcaster_id: impl Into<String>) -> Self {
        Self {
            client,
            broadcaster_id: broadcaster_id.into(),
        }
    }

    pub fn broadcaster_id(&self) -> &str {
        &self.broadcaster_id
    }

    pub fn client(&self) -> &TwitchHelixClient {
        &self.client
    }
}

#[async_trait]
impl RewardGateway for HelixRewardGateway {
    async fn list_rewards(&self, owned_only: bool) -> Result<Vec<RemoteRewardState>, Error> {
        let rewards = self
            .client
            .get_custom_rewards(&self.broadcaster_id, owned_only)
            .await?;
        Ok(rewards.into_iter().map(RemoteRewardState::from).collect())
    }

    async fn create_reward(
        &self,
        title: &str,
        cost: u64,
        delay: u64,
        enabled: bool,
    ) -> Result<RemoteRewardState, Error> {
        let body = CustomRewardBody::for_create(title, cost, delay, enabled);
        let created = self
            .client
            .create_custom_reward(&self.broadcaster_id, &body)
            .await?;
        Ok(created.into())
    }

    async fn update_reward(&self, id: &str, patch: RewardPatch) -> Result<RemoteRewardState, Error> {
        let body = CustomRewardBody::for_patch(&patch);
        let updated = self
            .client
            .update_custom_reward(&self.broadcaster_id, id, &body)
            .await?;
        Ok(updated.into())
    }

    async fn delete_reward(&self, id: &str) -> Result<(), Error> {
        self.client.delete_custom_reward(&self.broadcaster_id, id).await
    }

    async fn mark_redemption_status(
        &self,
        handle: &RedemptionHandle,
        status: RedemptionStatus,
    ) -> Result<(), Error> {
        let changed = self
            .client
            .update_redemption_status(
                &handle.broadcaster_id,
                &handle.reward_id,
                &handle.redemption_id,
                status.as_helix_str(),
            )
            .await?;
        if !changed {
            debug!(
                "mark_redemption_status => '{}' was already resolved; nothing to do",
                handle.redemption_id
            );
        }
        Ok(())
    }

    async fn broadcaster_type(&self) -> Result<String, Error> {
        self.client.get_broadcaster_type(&self.broadcaster_id).await
    }
}
