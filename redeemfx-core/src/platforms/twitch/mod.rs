pub mod client;
pub mod gateway;
pub mod requests;

pub use client::TwitchHelixClient;
pub use gateway::HelixRewardGateway;
