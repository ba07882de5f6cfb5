//! Booking state transitions.
//!
//! `booked → completed` is the only status change; it is tutor-triggered and
//! only once the session has ended. Removal is a hard delete, not a status.
//! `cancelled` is readable on the wire but nothing moves a booking there.

use chrono::{DateTime, Utc};
use tutorme_core::models::{Booking, BookingStatus};
use tutorme_core::{CoreError, CoreResult};

fn invalid_transition(from: BookingStatus, to: &str) -> CoreError {
    CoreError::ValidationError(format!("Invalid booking transition from {:?} to {}", from, to))
}

/// Transition: Booked → Completed (session over)
pub fn complete(booking: &Booking, now: DateTime<Utc>) -> CoreResult<BookingStatus> {
    let status = booking.status();
    if status != BookingStatus::Booked {
        return Err(invalid_transition(status, "completed"));
    }
    if booking.window().end > now {
        return Err(CoreError::ValidationError(
            "A session can only be marked complete after it ends".to_string(),
        ));
    }
    Ok(BookingStatus::Completed)
}

/// A booking can be rated once, after its session has ended.
pub fn ensure_ratable(booking: &Booking, now: DateTime<Utc>) -> CoreResult<()> {
    if booking.is_rated() {
        return Err(CoreError::ValidationError(format!("Booking {} is already rated", booking.id)));
    }
    if booking.window().end > now {
        return Err(CoreError::ValidationError("Only past sessions can be rated".to_string()));
    }
    Ok(())
}

/// Ended but still in `booked`: the tutor owes a completion.
pub fn needs_completion(booking: &Booking, now: DateTime<Utc>) -> bool {
    booking.status() == BookingStatus::Booked && booking.window().end <= now
}
