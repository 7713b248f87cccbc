// File: redeemfx-common/src/models/redemption.rs

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Verdict returned by an effect handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// Transient failure; worth retrying later.
    TryLater,
    /// Permanent failure; refund the viewer.
    Cancel,
    /// Success; fulfill the redemption.
    Done,
}

/// What gets reported back to the platform for one processing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Fulfillment {
    /// Requeued for a later attempt; nothing reported yet.
    None,
    Fulfill,
    Refund,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RedemptionStatus {
    Unfulfilled,
    Fulfilled,
    Canceled,
}

impl RedemptionStatus {
    /// Spelling used by the Helix API.
    pub fn as_helix_str(&self) -> &'static str {
        match self {
            RedemptionStatus::Unfulfilled => "UNFULFILLED",
            RedemptionStatus::Fulfilled => "FULFILLED",
            RedemptionStatus::Canceled => "CANCELED",
        }
    }
}

impl fmt::Display for RedemptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_helix_str())
    }
}

impl FromStr for RedemptionStatus {
    type Err = String;

    // EventSub sends lowercase, Helix sends uppercase.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "unfulfilled" => Ok(RedemptionStatus::Unfulfilled),
            "fulfilled" => Ok(RedemptionStatus::Fulfilled),
            "canceled" | "cancelled" => Ok(RedemptionStatus::Canceled),
            other => Err(format!("unknown redemption status '{other}'")),
        }
    }
}

/// Everything the gateway needs to later mark a real redemption's status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionHandle {
    pub broadcaster_id: String,
    pub reward_id: String,
    pub redemption_id: String,
    /// Status at the time the event was received.
    pub status: RedemptionStatus,
}

/// A redemption waiting to be resolved on the simulation thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRedemption {
    /// Local id, only used to correlate log lines.
    pub id: Uuid,
    pub reward_title: String,
    pub user_name: String,
    pub retries: u32,
    /// `None` for manually injected redemptions.
    pub handle: Option<RedemptionHandle>,
    pub received_at: DateTime<Utc>,
}

impl PendingRedemption {
    /// A test/stress redemption that bypasses the realtime client.
    pub fn manual(reward_title: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            reward_title: reward_title.into(),
            user_name: user_name.into(),
            retries: 0,
            handle: None,
            received_at: Utc::now(),
        }
    }

    pub fn from_event(
        reward_title: impl Into<String>,
        user_name: impl Into<String>,
        handle: RedemptionHandle,
    ) -> Self {
        Self {
            handle: Some(handle),
            ..Self::manual(reward_title, user_name)
        }
    }

    pub fn is_manual(&self) -> bool {
        self.handle.is_none()
    }
}
