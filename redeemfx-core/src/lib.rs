// src/lib.rs

pub mod config;
pub mod platforms;
pub mod catalog;
pub mod registry;
pub mod services;
pub mod session;
pub mod test_utils;

pub use redeemfx_common::error::Error;
pub use redeemfx_common::models;
pub use catalog::RewardCatalog;
pub use config::SessionConfig;
pub use registry::{EffectHandler, HandlerTable, RewardRegistry};
pub use session::IntegrationSession;
