// File: redeemfx-common/src/models/reward.rs

use serde::{Deserialize, Serialize};

/// A locally declared reward. Built once at startup from the reward registry
/// and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardDefinition {
    /// Unique key; also the title used on the remote platform.
    pub title: String,
    /// Name shown in notifications. Falls back to `title`.
    pub display_name: Option<String>,
    pub default_cost: u64,
    /// Default global cooldown in seconds. 0 means no cooldown.
    pub default_delay: u64,
    /// Whether the reward may run while the simulation is paused or idle.
    pub available_in_menu: bool,
}

impl RewardDefinition {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            display_name: None,
            default_cost: 1,
            default_delay: 0,
            available_in_menu: false,
        }
    }

    pub fn with_cost(mut self, cost: u64) -> Self {
        self.default_cost = cost;
        self
    }

    pub fn with_delay(mut self, delay_secs: u64) -> Self {
        self.default_delay = delay_secs;
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn available_in_menu(mut self, available: bool) -> Self {
        self.available_in_menu = available;
        self
    }

    pub fn notification_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.title)
    }
}

/// Best-known remote state of one reward, exactly as the server last echoed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRewardState {
    pub id: String,
    pub title: String,
    pub cost: u64,
    pub is_global_cooldown_enabled: bool,
    pub global_cooldown_seconds: u64,
    pub is_enabled: bool,
    pub is_paused: bool,
}

impl RemoteRewardState {
    /// Effective cooldown; a disabled cooldown reads as 0.
    pub fn delay(&self) -> u64 {
        if self.is_global_cooldown_enabled {
            self.global_cooldown_seconds
        } else {
            0
        }
    }
}

/// Tri-state availability of the remote rewards feature for the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CatalogAvailability {
    #[default]
    Unknown,
    /// e.g. the channel is not affiliate/partner.
    Unavailable,
    Available,
}

/// Partial update of a remote reward. `None` fields are left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RewardPatch {
    pub cost: Option<u64>,
    pub delay: Option<u64>,
    pub enabled: Option<bool>,
    pub paused: Option<bool>,
}

impl RewardPatch {
    pub fn is_empty(&self) -> bool {
        self.cost.is_none() && self.delay.is_none() && self.enabled.is_none() && self.paused.is_none()
    }

    /// Fields of `newer` take precedence over `self`.
    pub fn merged_with(self, newer: RewardPatch) -> RewardPatch {
        RewardPatch {
            cost: newer.cost.or(self.cost),
            delay: newer.delay.or(self.delay),
            enabled: newer.enabled.or(self.enabled),
            paused: newer.paused.or(self.paused),
        }
    }
}

/// One row of the catalog as exposed to configuration UIs and the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardSnapshot {
    pub title: String,
    pub cost: u64,
    pub delay: u64,
    pub enabled: bool,
    pub paused: bool,
    pub manageable: bool,
    pub created: bool,
    pub available_in_menu: bool,
}
