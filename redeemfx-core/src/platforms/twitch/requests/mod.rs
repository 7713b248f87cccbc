pub mod channel_points;
pub mod users;
