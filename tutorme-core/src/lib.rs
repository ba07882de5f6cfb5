pub mod clock;
pub mod conflict;
pub mod models;
pub mod repository;
pub mod subscription;
pub mod time;

use serde::Serialize;
use std::fmt;
use std::future::Future;
use tutorme_shared::BookingId;

pub use clock::{Clock, FixedClock, SystemClock};
pub use repository::StoreError;

/// Which committed window a rejected candidate collided with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictKind {
    /// New slot overlaps the tutor's own published availability.
    Availability,
    /// New slot overlaps a session the tutor booked as a student.
    TeachingVsLearning,
    /// New booking overlaps one of the student's existing bookings.
    DoubleBooking,
    /// New booking overlaps availability the student publishes as a tutor.
    TeachLearnOverlap,
    /// The tutor is already booked by someone else for that window.
    SlotTaken,
}

impl ConflictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictKind::Availability => "availability",
            ConflictKind::TeachingVsLearning => "teaching-vs-learning",
            ConflictKind::DoubleBooking => "double-booking",
            ConflictKind::TeachLearnOverlap => "teach-learn-overlap",
            ConflictKind::SlotTaken => "slot-taken",
        }
    }
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Conflicting window: {0}")]
    ConflictError(ConflictKind),
    #[error("Document not found: {0}")]
    NotFoundError(String),
    #[error("Store failure: {0}")]
    StoreError(StoreError),
    /// The booking kept its rating but the tutor's aggregate was not updated.
    #[error("Rating stored on booking {booking_id} but tutor aggregate is stale: {source}")]
    ReconciliationError {
        booking_id: BookingId,
        #[source]
        source: StoreError,
    },
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Missing { collection, id } => {
                CoreError::NotFoundError(format!("{}/{}", collection, id))
            }
            other => CoreError::StoreError(other),
        }
    }
}

impl CoreError {
    pub fn is_stale_write(&self) -> bool {
        matches!(self, CoreError::StoreError(StoreError::Stale { .. }))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Runs a check-then-write operation, re-running it from the top while the
/// conditional write reports that a watched partition moved underneath it.
pub async fn retry_stale<T, F, Fut>(operation: &str, max_attempts: u32, mut attempt: F) -> CoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CoreResult<T>>,
{
    let max_attempts = max_attempts.max(1);
    let mut tries = 0;
    loop {
        tries += 1;
        match attempt().await {
            Err(err) if err.is_stale_write() && tries < max_attempts => {
                tracing::warn!("{} raced a concurrent write (attempt {}/{}), retrying", operation, tries, max_attempts);
            }
            other => return other,
        }
    }
}
