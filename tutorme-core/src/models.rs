use serde::{Deserialize, Serialize};
use tutorme_shared::{BookingId, Masked, ScheduleId, SlotId, Timestamp, UserId};

use crate::time::TimeWindow;

/// One concrete, dated availability window embedded in a schedule.
/// Time and price are frozen at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    pub id: SlotId,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub price: i32,
}

impl Slot {
    pub fn new(window: &TimeWindow, price: i32) -> Self {
        Self {
            id: SlotId::generate(),
            start_time: Timestamp::from_date(window.start),
            end_time: Timestamp::from_date(window.end),
            price,
        }
    }

    pub fn window(&self) -> TimeWindow {
        TimeWindow::from_timestamps(&self.start_time, &self.end_time)
    }
}

/// Per-tutor container of slots (`schedules/{id}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub id: ScheduleId,
    pub tutor_id: UserId,
    #[serde(default)]
    pub slots: Vec<Slot>,
}

impl Schedule {
    pub fn windows(&self) -> impl Iterator<Item = TimeWindow> + '_ {
        self.slots.iter().map(Slot::window)
    }

    pub fn slot_with_window(&self, start: &Timestamp, end: &Timestamp) -> Option<&Slot> {
        self.slots
            .iter()
            .find(|slot| slot.start_time == *start && slot.end_time == *end)
    }
}

/// Copy of a slot taken when it was booked; later edits to the source slot
/// do not reach it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookedSlot {
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub price: i32,
}

impl BookedSlot {
    pub fn window(&self) -> TimeWindow {
        TimeWindow::from_timestamps(&self.start_time, &self.end_time)
    }
}

impl From<&Slot> for BookedSlot {
    fn from(slot: &Slot) -> Self {
        Self {
            start_time: slot.start_time,
            end_time: slot.end_time,
            price: slot.price,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    #[default]
    Booked,
    Completed,
    Cancelled,
}

/// A confirmed reservation (`bookings/{id}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: BookingId,
    pub tutor: UserId,
    pub student: UserId,
    pub schedule: ScheduleId,
    pub booked_slot: BookedSlot,
    #[serde(default)]
    pub ratings: u8,
    #[serde(default)]
    pub review: String,
    pub is_paid: bool,
    // Absent on most documents; absence reads as `booked`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<BookingStatus>,
    pub created_at: Timestamp,
}

impl Booking {
    pub fn status(&self) -> BookingStatus {
        self.status.unwrap_or_default()
    }

    pub fn window(&self) -> TimeWindow {
        self.booked_slot.window()
    }

    pub fn is_rated(&self) -> bool {
        self.ratings > 0
    }
}

/// Booking payload before the store assigns `id` and `createdAt`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBooking {
    pub tutor: UserId,
    pub student: UserId,
    pub schedule: ScheduleId,
    pub booked_slot: BookedSlot,
    pub ratings: u8,
    pub review: String,
    pub is_paid: bool,
}

impl NewBooking {
    pub fn new(tutor: UserId, student: UserId, schedule: ScheduleId, booked_slot: BookedSlot) -> Self {
        Self {
            tutor,
            student,
            schedule,
            booked_slot,
            ratings: 0,
            review: String::new(),
            // No payment step exists yet; every booking is recorded as paid.
            is_paid: true,
        }
    }

    pub fn into_booking(self, id: BookingId, created_at: Timestamp) -> Booking {
        Booking {
            id,
            tutor: self.tutor,
            student: self.student,
            schedule: self.schedule,
            booked_slot: self.booked_slot,
            ratings: self.ratings,
            review: self.review,
            is_paid: self.is_paid,
            status: None,
            created_at,
        }
    }
}

/// Tutor profile embedded in a user document. Its presence is what makes a
/// user a tutor.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Profile {
    pub bio: String,
    pub speciality: String,
    pub rating: f64,
    pub total_reviews: u32,
    pub hourly_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<Masked<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<Profile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<Masked<String>>,
    #[serde(default)]
    pub created_at: Option<Timestamp>,
}

impl User {
    pub fn new(id: UserId, name: Option<String>, email: Option<String>) -> Self {
        Self {
            id,
            name,
            email: email.map(Masked),
            profile: None,
            contact: None,
            created_at: None,
        }
    }

    pub fn is_tutor(&self) -> bool {
        self.profile.is_some()
    }

    /// Rate usable for pricing; unset, zero and negative rates are `None`.
    pub fn hourly_rate(&self) -> Option<f64> {
        self.profile
            .as_ref()
            .map(|p| p.hourly_rate)
            .filter(|rate| *rate > 0.0)
    }
}

/// Identity of a bookable window across the two collections:
/// `tutorId-startMillis-endMillis`. A slot is booked when some booking
/// carries the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotKey {
    pub tutor: UserId,
    pub start_millis: i64,
    pub end_millis: i64,
}

impl SlotKey {
    pub fn of_slot(tutor: &UserId, slot: &Slot) -> Self {
        Self {
            tutor: tutor.clone(),
            start_millis: slot.start_time.to_millis(),
            end_millis: slot.end_time.to_millis(),
        }
    }

    pub fn of_booking(booking: &Booking) -> Self {
        Self {
            tutor: booking.tutor.clone(),
            start_millis: booking.booked_slot.start_time.to_millis(),
            end_millis: booking.booked_slot.end_time.to_millis(),
        }
    }
}

impl std::fmt::Display for SlotKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}-{}", self.tutor, self.start_millis, self.end_millis)
    }
}
