pub mod availability;
pub mod bookings;
pub mod discovery;
pub mod users;
