pub mod lifecycle;
pub mod rating;
pub mod service;
pub mod views;

pub use rating::RatingAggregate;
pub use service::{BookingService, SlotSelection};
pub use views::{BookingView, StudentBookings, TutorBookings};
