use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use tutorme_core::models::{Booking, BookingStatus};
use tutorme_core::time;

use crate::lifecycle;

/// A booking with the flags list screens act on.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingView {
    #[serde(flatten)]
    pub booking: Booking,
    pub day: String,
    pub needs_completion: bool,
    /// Still far enough ahead of its start to be removed.
    pub can_delete: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StudentBookings {
    pub upcoming: Vec<BookingView>,
    pub past: Vec<BookingView>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TutorBookings {
    pub completed: Vec<BookingView>,
    pub pending: Vec<BookingView>,
}

struct ViewContext<'a, Tz: TimeZone> {
    now: DateTime<Utc>,
    lead_minutes: i64,
    tz: &'a Tz,
}

impl<Tz> ViewContext<'_, Tz>
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    fn view(&self, booking: Booking) -> BookingView {
        let start = booking.window().start;
        BookingView {
            day: time::slot_day_label(&booking.booked_slot.start_time, self.tz),
            needs_completion: lifecycle::needs_completion(&booking, self.now),
            can_delete: booking.status() == BookingStatus::Booked
                && !time::within_lead_time(start, self.now, self.lead_minutes),
            booking,
        }
    }
}

fn by_start(views: &mut [BookingView]) {
    views.sort_by_key(|v| v.booking.booked_slot.start_time);
}

/// Splits a student's bookings at `now` by start time.
pub fn student_view<Tz>(bookings: Vec<Booking>, now: DateTime<Utc>, lead_minutes: i64, tz: &Tz) -> StudentBookings
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let ctx = ViewContext { now, lead_minutes, tz };
    let (mut upcoming, mut past): (Vec<_>, Vec<_>) = bookings
        .into_iter()
        .map(|b| ctx.view(b))
        .partition(|v| v.booking.window().start >= now);
    by_start(&mut upcoming);
    by_start(&mut past);
    StudentBookings { upcoming, past }
}

/// Splits a tutor's bookings by completion status.
pub fn tutor_view<Tz>(bookings: Vec<Booking>, now: DateTime<Utc>, lead_minutes: i64, tz: &Tz) -> TutorBookings
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let ctx = ViewContext { now, lead_minutes, tz };
    let (mut completed, mut pending): (Vec<_>, Vec<_>) = bookings
        .into_iter()
        .map(|b| ctx.view(b))
        .partition(|v| v.booking.status() == BookingStatus::Completed);
    by_start(&mut completed);
    by_start(&mut pending);
    TutorBookings { completed, pending }
}
