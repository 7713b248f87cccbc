// File: redeemfx-common/src/models/mod.rs
pub mod connection;
pub mod reward;
pub mod redemption;

pub use connection::ConnectionState;

pub use reward::{
    CatalogAvailability, RemoteRewardState, RewardDefinition, RewardPatch, RewardSnapshot,
};
pub use redemption::{Fulfillment, Outcome, PendingRedemption, RedemptionHandle, RedemptionStatus};
