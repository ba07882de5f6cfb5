pub mod ids;
pub mod pii;
pub mod timestamp;

pub use ids::{BookingId, ScheduleId, SlotId, UserId};
pub use pii::Masked;
pub use timestamp::Timestamp;

/// Collection names. Queries and indexes outside this workspace depend on them.
pub mod collections {
    pub const USERS: &str = "users";
    pub const SCHEDULES: &str = "schedules";
    pub const BOOKINGS: &str = "bookings";
}
