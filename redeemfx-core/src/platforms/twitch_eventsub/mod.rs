pub mod events;
pub mod runtime;

pub use runtime::TwitchEventSubTransport;
