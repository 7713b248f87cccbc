// File: redeemfx-core/src/platforms/twitch_eventsub/events.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use redeemfx_common::models::RedemptionStatus;
use crate::Error;
use crate::platforms::RedemptionEvent;

pub const REDEMPTION_ADD: &str = "channel.channel_points_custom_reward_redemption.add";

/// Each subscription wrapper has metadata like `id`, `type`, etc.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubscriptionData {
    pub id: String,
    #[serde(rename = "type")]
    pub sub_type: String,
    pub version: String,
    pub status: String,
    #[serde(default)]
    pub cost: u32,

    #[serde(default)]
    pub condition: serde_json::Value,

    #[serde(default)]
    pub transport: serde_json::Value,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// The `payload` of a "notification" message:
/// { "subscription": { ... }, "event": { ... } }
#[derive(Debug, Clone, Deserialize)]
pub struct EventSubNotificationEnvelope {
    pub subscription: SubscriptionData,
    pub event: serde_json::Value,
}

// ------------------------------------------------------------------------
// "channel.channel_points_custom_reward_redemption.add" event
// ------------------------------------------------------------------------
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelPointsCustomRewardRedemption {
    pub id: String,
    pub broadcaster_user_id: String,
    #[serde(default)]
    pub broadcaster_user_login: String,
    #[serde(default)]
    pub broadcaster_user_name: String,
    pub user_id: String,
    #[serde(default)]
    pub user_login: String,
    pub user_name: String,
    #[serde(default)]
    pub user_input: String,
    pub status: String, // "unfulfilled", "fulfilled", "canceled"
    pub reward: RedemptionReward,
    #[serde(default)]
    pub redeemed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedemptionReward {
    pub id: String,
    pub title: String,
    pub cost: u64,
    #[serde(default)]
    pub prompt: String,
}

impl TryFrom<ChannelPointsCustomRewardRedemption> for RedemptionEvent {
    type Error = Error;

    fn try_from(evt: ChannelPointsCustomRewardRedemption) -> Result<Self, Self::Error> {
        let status = evt.status.parse::<RedemptionStatus>().map_err(Error::Parse)?;
        Ok(RedemptionEvent {
            broadcaster_id: evt.broadcaster_user_id,
            redemption_id: evt.id,
            reward_id: evt.reward.id,
            reward_title: evt.reward.title,
            user_name: evt.user_name,
            status,
        })
    }
}

/// A websocket TEXT frame, classified by `metadata.message_type`.
#[derive(Debug, Clone)]
pub enum EventSubMessage {
    Welcome { session_id: String },
    Keepalive,
    Reconnect { url: String },
    Notification(EventSubNotificationEnvelope),
    Revocation,
    Other(Option<String>),
}

impl EventSubMessage {
    pub fn parse(txt: &str) -> Result<Self, Error> {
        let parsed: serde_json::Value = serde_json::from_str(txt)
            .map_err(|e| Error::Platform(format!("bad json: {e}")))?;

        let message_type = parsed
            .pointer("/metadata/message_type")
            .and_then(|v| v.as_str());

        Ok(match message_type {
            Some("session_welcome") => {
                let session_id = parsed
                    .pointer("/payload/session/id")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| Error::Platform("welcome without session id".into()))?;
                EventSubMessage::Welcome {
                    session_id: session_id.to_string(),
                }
            }
            Some("session_keepalive") => EventSubMessage::Keepalive,
            Some("session_reconnect") => {
                let url = parsed
                    .pointer("/payload/session/reconnect_url")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| Error::Platform("missing reconnect_url".into()))?;
                EventSubMessage::Reconnect { url: url.to_string() }
            }
            Some("notification") => {
                let payload = parsed
                    .get("payload")
                    .cloned()
                    .ok_or_else(|| Error::Platform("notification without payload".into()))?;
                EventSubMessage::Notification(serde_json::from_value(payload)?)
            }
            Some("revocation") => EventSubMessage::Revocation,
            other => EventSubMessage::Other(other.map(str::to_string)),
        })
    }

    pub fn is_health_check(&self) -> bool {
        matches!(self, EventSubMessage::Keepalive)
    }
}

/// Extracts a redemption from a notification, ignoring every other topic.
pub fn parse_redemption(env: &EventSubNotificationEnvelope) -> Option<RedemptionEvent> {
    if env.subscription.sub_type != REDEMPTION_ADD {
        return None;
    }
    let typed: ChannelPointsCustomRewardRedemption = match serde_json::from_value(env.event.clone()) {
        Ok(t) => t,
        Err(e) => {
            warn!("[EventSub] could not parse redemption event: {}", e);
            return None;
        }
    };
    match RedemptionEvent::try_from(typed) {
        Ok(evt) => Some(evt),
        Err(e) => {
            warn!("[EventSub] dropping redemption event: {}", e);
            None
        }
    }
}
