use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use std::collections::HashSet;
use tutorme_core::models::{Booking, Schedule, SlotKey};
use tutorme_core::time;
use tutorme_shared::{ScheduleId, SlotId, Timestamp};

/// One of the tutor's own upcoming slots, as the tutor sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TutorSlot {
    pub schedule_id: ScheduleId,
    pub slot_id: SlotId,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub price: i32,
    pub is_booked: bool,
    pub day: String,
}

/// Upcoming slots across `schedules`, flagged booked when any of `bookings`
/// carries the same key. Sorted by start.
pub fn tutor_slots<Tz>(schedules: &[Schedule], bookings: &[Booking], now: DateTime<Utc>, tz: &Tz) -> Vec<TutorSlot>
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let booked: HashSet<SlotKey> = bookings.iter().map(SlotKey::of_booking).collect();

    let mut slots: Vec<TutorSlot> = schedules
        .iter()
        .flat_map(|schedule| {
            schedule
                .slots
                .iter()
                .filter(|slot| slot.start_time.to_date() >= now)
                .map(|slot| TutorSlot {
                    schedule_id: schedule.id.clone(),
                    slot_id: slot.id.clone(),
                    start_time: slot.start_time,
                    end_time: slot.end_time,
                    price: slot.price,
                    is_booked: booked.contains(&SlotKey::of_slot(&schedule.tutor_id, slot)),
                    day: time::slot_day_label(&slot.start_time, tz),
                })
        })
        .collect();
    slots.sort_by_key(|slot| slot.start_time);
    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tutorme_core::models::{BookedSlot, NewBooking, Slot};
    use tutorme_core::time::TimeWindow;
    use tutorme_shared::{BookingId, UserId};

    fn slot_at(day: u32, hour: u32) -> Slot {
        let start = Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap();
        Slot::new(&TimeWindow::new(start, start + Duration::hours(1)), 25)
    }

    #[test]
    fn test_marks_booked_and_hides_past() {
        let tutor = UserId::new("t1");
        let past = slot_at(2, 9);
        let later = slot_at(4, 15);
        let sooner = slot_at(3, 10);
        let schedule = Schedule {
            id: ScheduleId::new("sch"),
            tutor_id: tutor.clone(),
            slots: vec![past, later.clone(), sooner.clone()],
        };
        let booking = NewBooking::new(tutor, UserId::new("s1"), schedule.id.clone(), BookedSlot::from(&sooner))
            .into_booking(BookingId::new("b1"), Timestamp::from_millis(0));

        let now = Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();
        let view = tutor_slots(&[schedule], &[booking], now, &Utc);

        assert_eq!(view.len(), 2);
        assert_eq!(view[0].slot_id, sooner.id);
        assert!(view[0].is_booked);
        assert_eq!(view[0].day, "Tue 3 Mar");
        assert_eq!(view[1].slot_id, later.id);
        assert!(!view[1].is_booked);
    }
}
