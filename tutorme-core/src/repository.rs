use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tutorme_shared::{BookingId, ScheduleId, SlotId, UserId};

use crate::models::{Booking, BookingStatus, NewBooking, Schedule, Slot, User};
use crate::subscription::Subscription;

/// Store-wide commit counter. Every committed write advances it by one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Revision(pub u64);

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Slice of the store a conditional write can pin.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Partition {
    /// Every schedule owned by the tutor.
    TutorSchedules(UserId),
    /// Every booking the user holds as a student.
    StudentBookings(UserId),
    /// Every booking made with the user as tutor.
    TutorBookings(UserId),
    /// One booking document.
    Booking(BookingId),
    /// The user document itself.
    User(UserId),
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Partition::TutorSchedules(id) => write!(f, "schedules(tutor={})", id),
            Partition::StudentBookings(id) => write!(f, "bookings(student={})", id),
            Partition::TutorBookings(id) => write!(f, "bookings(tutor={})", id),
            Partition::Booking(id) => write!(f, "bookings/{}", id),
            Partition::User(id) => write!(f, "users/{}", id),
        }
    }
}

/// Precondition attached to a write: none of `partitions` may have changed
/// after `read_at`. An empty guard always passes.
#[derive(Debug, Clone, Default)]
pub struct WriteGuard {
    pub read_at: Option<Revision>,
    pub partitions: Vec<Partition>,
}

impl WriteGuard {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn unchanged_since(read_at: Revision) -> Self {
        Self {
            read_at: Some(read_at),
            partitions: Vec::new(),
        }
    }

    pub fn watch(mut self, partition: Partition) -> Self {
        self.partitions.push(partition);
        self
    }
}

/// Result of a collection query together with the revision it reflects.
#[derive(Debug, Clone)]
pub struct Snapshot<T> {
    pub docs: Vec<T>,
    pub revision: Revision,
}

#[derive(Debug, Clone)]
pub struct Versioned<T> {
    pub doc: T,
    pub revision: Revision,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("{collection}/{id} does not exist")]
    Missing { collection: &'static str, id: String },
    #[error("{partition} changed after {read_at}")]
    Stale { partition: Partition, read_at: Revision },
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
}

pub trait Document: Clone + Send + Sync + 'static {
    fn doc_id(&self) -> &str;
}

impl Document for Schedule {
    fn doc_id(&self) -> &str {
        self.id.as_str()
    }
}

impl Document for Booking {
    fn doc_id(&self) -> &str {
        self.id.as_str()
    }
}

impl Document for User {
    fn doc_id(&self) -> &str {
        self.id.as_str()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleQuery {
    ByTutor(UserId),
    /// Discovery view: everyone's schedules except the viewer's own.
    ExcludingTutor(UserId),
    All,
}

impl ScheduleQuery {
    pub fn matches(&self, schedule: &Schedule) -> bool {
        match self {
            ScheduleQuery::ByTutor(id) => schedule.tutor_id == *id,
            ScheduleQuery::ExcludingTutor(id) => schedule.tutor_id != *id,
            ScheduleQuery::All => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingQuery {
    ByStudent(UserId),
    ByTutor(UserId),
    All,
}

impl BookingQuery {
    pub fn matches(&self, booking: &Booking) -> bool {
        match self {
            BookingQuery::ByStudent(id) => booking.student == *id,
            BookingQuery::ByTutor(id) => booking.tutor == *id,
            BookingQuery::All => true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookingPatch {
    pub ratings: Option<u8>,
    pub review: Option<String>,
    pub status: Option<BookingStatus>,
}

/// Partial update of a user document. Setting any profile field creates the
/// profile when the user has none.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserPatch {
    pub name: Option<String>,
    pub contact: Option<String>,
    pub bio: Option<String>,
    pub speciality: Option<String>,
    pub hourly_rate: Option<f64>,
    pub rating: Option<f64>,
    /// Applied atomically on top of the stored count.
    pub total_reviews_increment: Option<u32>,
}

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn query_schedules(&self, query: &ScheduleQuery) -> Result<Snapshot<Schedule>, StoreError>;

    async fn get_schedule(&self, id: &ScheduleId) -> Result<Option<Schedule>, StoreError>;

    /// Creates a schedule document; the store assigns its id.
    async fn create_schedule(
        &self,
        tutor_id: &UserId,
        slots: Vec<Slot>,
        guard: &WriteGuard,
    ) -> Result<Schedule, StoreError>;

    /// Array-union of one slot into the schedule.
    async fn add_slot(&self, schedule_id: &ScheduleId, slot: Slot, guard: &WriteGuard) -> Result<Schedule, StoreError>;

    /// Removes one slot by id. Unknown slot ids leave the schedule unchanged.
    async fn remove_slot(
        &self,
        schedule_id: &ScheduleId,
        slot_id: &SlotId,
        guard: &WriteGuard,
    ) -> Result<Schedule, StoreError>;

    /// Overwrites the whole slot array. Anything a concurrent writer added
    /// since the caller's read is lost unless `guard` pins the tutor.
    async fn replace_slots(
        &self,
        schedule_id: &ScheduleId,
        slots: Vec<Slot>,
        guard: &WriteGuard,
    ) -> Result<Schedule, StoreError>;

    async fn delete_schedule(&self, id: &ScheduleId) -> Result<(), StoreError>;

    fn watch_schedules(&self, query: ScheduleQuery) -> Subscription<Schedule>;
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn query_bookings(&self, query: &BookingQuery) -> Result<Snapshot<Booking>, StoreError>;

    async fn get_booking(&self, id: &BookingId) -> Result<Option<Versioned<Booking>>, StoreError>;

    /// Persists the booking with a store-assigned id and server `createdAt`.
    async fn create_booking(&self, booking: NewBooking, guard: &WriteGuard) -> Result<Booking, StoreError>;

    /// Applies `patch` if `guard` still holds. Guard on
    /// `Partition::Booking` to make a read-check-write on one booking atomic.
    async fn update_booking(&self, id: &BookingId, patch: BookingPatch, guard: &WriteGuard) -> Result<Booking, StoreError>;

    async fn delete_booking(&self, id: &BookingId) -> Result<(), StoreError>;

    fn watch_bookings(&self, query: BookingQuery) -> Subscription<Booking>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user(&self, id: &UserId) -> Result<Option<Versioned<User>>, StoreError>;

    /// Batch lookup; unknown ids are skipped.
    async fn get_users(&self, ids: &[UserId]) -> Result<Vec<User>, StoreError>;

    /// Users that carry a tutor profile.
    async fn list_tutors(&self) -> Result<Vec<User>, StoreError>;

    /// Creates or merges a user document. `createdAt` is stamped by the
    /// store the first time only.
    async fn upsert_user(&self, user: User) -> Result<User, StoreError>;

    async fn update_user(&self, id: &UserId, patch: UserPatch, guard: &WriteGuard) -> Result<User, StoreError>;
}
