// File: redeemfx-common/src/models/connection.rs

use serde::{Deserialize, Serialize};

/// Lifecycle of the realtime redemption stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Subscribed,
    Reconnecting,
}
