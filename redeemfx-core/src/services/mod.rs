pub mod realtime_client;
pub mod redemption_processor;
pub mod scheduler;

pub use realtime_client::{RealtimeEventClient, ReconnectBackoff};
pub use redemption_processor::{
    AlwaysRunning, NotificationSink, RedemptionProcessor, RedemptionQueue, ResolvedRedemption,
    SimulationProbe,
};
pub use scheduler::Scheduler;
