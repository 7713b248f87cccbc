//! Helix channel points requests:
//!  - getCustomReward
//!  - createCustomReward
//!  - updateCustomReward
//!  - deleteCustomReward
//!  - updateRedemptionStatus
//!
//! All of them require the `channel:manage:redemptions` scope, except the
//! read which also accepts `channel:read:redemptions`.

use serde::{Deserialize, Serialize};
use tracing::debug;
use redeemfx_common::models::{RemoteRewardState, RewardPatch};
use crate::Error;
use crate::platforms::twitch::client::TwitchHelixClient;

/// A single custom reward as returned by Helix. Only the fields the catalog
/// tracks are required; the rest are tolerated when a mock API omits them.
#[derive(Debug, Clone, Deserialize)]
pub struct CustomReward {
    pub broadcaster_id: String,
    pub id: String,
    pub title: String,
    pub cost: u64,
    #[serde(default)]
    pub prompt: String,
    pub is_enabled: bool,
    #[serde(default)]
    pub is_paused: bool,
    #[serde(default)]
    pub is_in_stock: bool,
    #[serde(default)]
    pub global_cooldown_setting: GlobalCooldownSetting,
    #[serde(default)]
    pub should_redemptions_skip_request_queue: bool,
    #[serde(default)]
    pub cooldown_expires_at: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GlobalCooldownSetting {
    pub is_enabled: bool,
    pub global_cooldown_seconds: u64,
}

impl From<CustomReward> for RemoteRewardState {
    fn from(r: CustomReward) -> Self {
        RemoteRewardState {
            id: r.id,
            title: r.title,
            cost: r.cost,
            is_global_cooldown_enabled: r.global_cooldown_setting.is_enabled,
            global_cooldown_seconds: r.global_cooldown_setting.global_cooldown_seconds,
            is_enabled: r.is_enabled,
            is_paused: r.is_paused,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CustomRewardResponse {
    pub data: Vec<CustomReward>,
}

/// Request body for creating/updating a custom reward.
/// For "create", `title` and `cost` are required.
#[derive(Debug, Serialize, Default, PartialEq, Eq)]
pub struct CustomRewardBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_enabled: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_global_cooldown_enabled: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_cooldown_seconds: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_paused: Option<bool>,
}

impl CustomRewardBody {
    pub fn for_create(title: &str, cost: u64, delay: u64, enabled: bool) -> Self {
        Self {
            title: Some(title.to_string()),
            cost: Some(cost),
            is_enabled: Some(enabled),
            is_global_cooldown_enabled: Some(delay > 0),
            global_cooldown_seconds: (delay > 0).then_some(delay),
            ..Default::default()
        }
    }

    /// Cooldown fields are only sent when the patch carries a delay; a delay
    /// of 0 turns the global cooldown off.
    pub fn for_patch(patch: &RewardPatch) -> Self {
        Self {
            cost: patch.cost,
            is_enabled: patch.enabled,
            is_paused: patch.paused,
            is_global_cooldown_enabled: patch.delay.map(|d| d > 0),
            global_cooldown_seconds: patch.delay.filter(|d| *d > 0),
            ..Default::default()
        }
    }
}

/// The body used when updating redemption status, e.g. FULFILLED or CANCELED.
#[derive(Debug, Serialize)]
pub struct UpdateRedemptionStatusBody {
    pub status: String,
}

fn first_reward(op: &str, body: &str) -> Result<CustomReward, Error> {
    let parsed: CustomRewardResponse = serde_json::from_str(body)
        .map_err(|e| Error::Platform(format!("{op} parse error: {e}")))?;
    parsed
        .data
        .into_iter()
        .next()
        .ok_or_else(|| Error::Platform(format!("No reward returned by {op}")))
}

impl TwitchHelixClient {
    /// Gets the channel's custom rewards. With `only_manageable_rewards = true`
    /// Twitch only returns rewards created by this client id.
    pub async fn get_custom_rewards(
        &self,
        broadcaster_id: &str,
        only_manageable_rewards: bool,
    ) -> Result<Vec<CustomReward>, Error> {
        let mut url = format!(
            "{}?broadcaster_id={}",
            self.endpoint("/channel_points/custom_rewards"),
            urlencoding::encode(broadcaster_id)
        );
        if only_manageable_rewards {
            url.push_str("&only_manageable_rewards=true");
        }
        debug!("get_custom_rewards => URL='{}'", url);

        let body = self
            .execute("get_custom_rewards", self.http_client().get(&url))
            .await?
            .success("get_custom_rewards")?;

        let parsed: CustomRewardResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Platform(format!("get_custom_rewards parse error: {e}")))?;

        debug!(
            "get_custom_rewards => returned {} rewards for broadcaster_id='{}' (manageable_only={})",
            parsed.data.len(),
            broadcaster_id,
            only_manageable_rewards
        );
        Ok(parsed.data)
    }

    pub async fn create_custom_reward(
        &self,
        broadcaster_id: &str,
        params: &CustomRewardBody,
    ) -> Result<CustomReward, Error> {
        let url = format!(
            "{}?broadcaster_id={}",
            self.endpoint("/channel_points/custom_rewards"),
            urlencoding::encode(broadcaster_id)
        );
        debug!("create_custom_reward => URL='{}' body={:?}", url, params);

        let body = self
            .execute("create_custom_reward", self.http_client().post(&url).json(params))
            .await?
            .success("create_custom_reward")?;

        let created = first_reward("create_custom_reward", &body)?;
        debug!(
            "create_custom_reward => success => returned ID='{}' title='{}'",
            created.id, created.title
        );
        Ok(created)
    }

    /// Only fields present in `params` are modified.
    pub async fn update_custom_reward(
        &self,
        broadcaster_id: &str,
        reward_id: &str,
        params: &CustomRewardBody,
    ) -> Result<CustomReward, Error> {
        let url = format!(
            "{}?broadcaster_id={}&id={}",
            self.endpoint("/channel_points/custom_rewards"),
            urlencoding::encode(broadcaster_id),
            urlencoding::encode(reward_id)
        );
        debug!("update_custom_reward => URL='{}' body={:?}", url, params);

        let body = self
            .execute("update_custom_reward", self.http_client().patch(&url).json(params))
            .await?
            .success("update_custom_reward")?;

        first_reward("update_custom_reward", &body)
    }

    pub async fn delete_custom_reward(
        &self,
        broadcaster_id: &str,
        reward_id: &str,
    ) -> Result<(), Error> {
        let url = format!(
            "{}?broadcaster_id={}&id={}",
            self.endpoint("/channel_points/custom_rewards"),
            urlencoding::encode(broadcaster_id),
            urlencoding::encode(reward_id)
        );
        debug!("delete_custom_reward => URL='{}'", url);

        self.execute("delete_custom_reward", self.http_client().delete(&url))
            .await?
            .success("delete_custom_reward")?;

        debug!("delete_custom_reward => success => reward_id='{}'", reward_id);
        Ok(())
    }

    /// Updates one redemption to FULFILLED or CANCELED.
    ///
    /// Twitch answers 404 when the redemption is no longer UNFULFILLED, which
    /// callers should treat as "already resolved".
    pub async fn update_redemption_status(
        &self,
        broadcaster_id: &str,
        reward_id: &str,
        redemption_id: &str,
        status: &str,
    ) -> Result<bool, Error> {
        let url = format!(
            "{}?broadcaster_id={}&reward_id={}&id={}",
            self.endpoint("/channel_points/custom_rewards/redemptions"),
            urlencoding::encode(broadcaster_id),
            urlencoding::encode(reward_id),
            urlencoding::encode(redemption_id)
        );
        debug!(
            "update_redemption_status => URL='{}' new_status='{}'",
            url, status
        );

        let body = UpdateRedemptionStatusBody {
            status: status.to_string(),
        };
        let resp = self
            .execute("update_redemption_status", self.http_client().patch(&url).json(&body))
            .await?;

        if resp.status == reqwest::StatusCode::NOT_FOUND {
            debug!(
                "update_redemption_status => redemption '{}' already resolved",
                redemption_id
            );
            return Ok(false);
        }
        resp.success("update_redemption_status")?;
        Ok(true)
    }
}
