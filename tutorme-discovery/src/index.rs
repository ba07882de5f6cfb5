use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tutorme_core::models::{Booking, Schedule, SlotKey};
use tutorme_core::subscription::Change;
use tutorme_shared::{BookingId, ScheduleId};

use crate::projection::{project_schedule, DiscoverySchedule};

/// Incremental join of the schedule and booking streams.
///
/// Each change touches only the entries for its own document, and the two
/// streams can be applied in any relative order: the rendered projection
/// always equals a full recompute over the documents applied so far.
#[derive(Debug, Default)]
pub struct DiscoveryIndex {
    schedules: BTreeMap<ScheduleId, Schedule>,
    booking_keys: HashMap<BookingId, SlotKey>,
    booked: HashMap<SlotKey, BTreeSet<BookingId>>,
}

impl DiscoveryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset_schedules(&mut self, docs: Vec<Schedule>) {
        self.schedules = docs.into_iter().map(|s| (s.id.clone(), s)).collect();
    }

    pub fn reset_bookings(&mut self, docs: Vec<Booking>) {
        self.booking_keys.clear();
        self.booked.clear();
        for booking in docs {
            self.insert_booking(&booking);
        }
    }

    pub fn apply_schedule(&mut self, change: Change<Schedule>) {
        match change {
            Change::Added(schedule) | Change::Modified(schedule) => {
                self.schedules.insert(schedule.id.clone(), schedule);
            }
            Change::Removed(schedule) => {
                self.schedules.remove(&schedule.id);
            }
        }
    }

    pub fn apply_booking(&mut self, change: Change<Booking>) {
        match change {
            Change::Added(booking) | Change::Modified(booking) => {
                self.remove_booking(&booking.id);
                self.insert_booking(&booking);
            }
            Change::Removed(booking) => self.remove_booking(&booking.id),
        }
    }

    fn insert_booking(&mut self, booking: &Booking) {
        let key = SlotKey::of_booking(booking);
        self.booked.entry(key.clone()).or_default().insert(booking.id.clone());
        self.booking_keys.insert(booking.id.clone(), key);
    }

    fn remove_booking(&mut self, booking_id: &BookingId) {
        let Some(key) = self.booking_keys.remove(booking_id) else {
            return;
        };
        if let Some(ids) = self.booked.get_mut(&key) {
            ids.remove(booking_id);
            if ids.is_empty() {
                self.booked.remove(&key);
            }
        }
    }

    pub fn is_booked(&self, key: &SlotKey) -> bool {
        self.booked.contains_key(key)
    }

    pub fn project(&self, now: DateTime<Utc>) -> Vec<DiscoverySchedule> {
        self.schedules
            .values()
            .filter_map(|schedule| project_schedule(schedule, now, |key| self.is_booked(key)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::project;
    use chrono::{Duration, TimeZone};
    use tutorme_core::models::{BookedSlot, NewBooking, Slot};
    use tutorme_core::time::TimeWindow;
    use tutorme_shared::{Timestamp, UserId};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap()
    }

    fn slot(id: &str, offset_hours: i64) -> Slot {
        let start = now() + Duration::hours(offset_hours);
        let mut slot = Slot::new(&TimeWindow::new(start, start + Duration::hours(1)), 30);
        slot.id = id.into();
        slot
    }

    fn schedule(id: &str, tutor: &str, slots: Vec<Slot>) -> Schedule {
        Schedule { id: id.into(), tutor_id: tutor.into(), slots }
    }

    fn booking(id: &str, tutor: &str, slot: &Slot) -> Booking {
        NewBooking::new(tutor.into(), UserId::new("student"), "sch".into(), BookedSlot::from(slot))
            .into_booking(id.into(), Timestamp::from_millis(0))
    }

    /// Reference model: the documents currently present in each collection.
    #[derive(Default)]
    struct Collections {
        schedules: BTreeMap<ScheduleId, Schedule>,
        bookings: BTreeMap<BookingId, Booking>,
    }

    impl Collections {
        fn apply_schedule(&mut self, change: &Change<Schedule>) {
            match change {
                Change::Added(s) | Change::Modified(s) => {
                    self.schedules.insert(s.id.clone(), s.clone());
                }
                Change::Removed(s) => {
                    self.schedules.remove(&s.id);
                }
            }
        }

        fn apply_booking(&mut self, change: &Change<Booking>) {
            match change {
                Change::Added(b) | Change::Modified(b) => {
                    self.bookings.insert(b.id.clone(), b.clone());
                }
                Change::Removed(b) => {
                    self.bookings.remove(&b.id);
                }
            }
        }

        fn full(&self) -> Vec<DiscoverySchedule> {
            let schedules: Vec<_> = self.schedules.values().cloned().collect();
            let bookings: Vec<_> = self.bookings.values().cloned().collect();
            project(&schedules, &bookings, now())
        }
    }

    fn schedule_stream() -> Vec<Change<Schedule>> {
        let a1 = slot("a1", 2);
        let a2 = slot("a2", 4);
        let b1 = slot("b1", 2);
        vec![
            Change::Added(schedule("A", "t1", vec![a1.clone()])),
            Change::Added(schedule("B", "t2", vec![b1.clone()])),
            Change::Modified(schedule("A", "t1", vec![a1, a2.clone()])),
            Change::Removed(schedule("B", "t2", vec![b1])),
            Change::Modified(schedule("A", "t1", vec![a2])),
        ]
    }

    fn booking_stream() -> Vec<Change<Booking>> {
        let a1 = slot("a1", 2);
        let a2 = slot("a2", 4);
        let b1 = slot("b1", 2);
        vec![
            Change::Added(booking("x", "t1", &a1)),
            Change::Added(booking("y", "t2", &b1)),
            Change::Added(booking("z", "t1", &a2)),
            Change::Removed(booking("x", "t1", &a1)),
            Change::Modified(booking("z", "t1", &a1)),
        ]
    }

    #[test]
    fn test_matches_full_recompute_under_every_interleaving() {
        let schedules = schedule_stream();
        let bookings = booking_stream();
        let total = schedules.len() + bookings.len();

        // Each mask with exactly `schedules.len()` bits set is one interleaving:
        // bit i set means step i takes the next schedule change.
        let mut interleavings = 0;
        for mask in 0u32..(1 << total) {
            if mask.count_ones() as usize != schedules.len() {
                continue;
            }
            interleavings += 1;

            let mut index = DiscoveryIndex::new();
            let mut reference = Collections::default();
            let (mut si, mut bi) = (0, 0);
            for step in 0..total {
                if mask & (1 << step) != 0 {
                    reference.apply_schedule(&schedules[si]);
                    index.apply_schedule(schedules[si].clone());
                    si += 1;
                } else {
                    reference.apply_booking(&bookings[bi]);
                    index.apply_booking(bookings[bi].clone());
                    bi += 1;
                }
                assert_eq!(index.project(now()), reference.full(), "mask {:b} step {}", mask, step);
            }
        }
        assert_eq!(interleavings, 252);
    }

    #[test]
    fn test_reset_matches_full_recompute() {
        let a1 = slot("a1", 2);
        let a2 = slot("a2", 4);
        let schedules = vec![schedule("A", "t1", vec![a1.clone(), a2])];
        let bookings = vec![booking("x", "t1", &a1)];

        let mut index = DiscoveryIndex::new();
        index.apply_booking(Change::Added(booking("stale", "t1", &slot("a2", 4))));
        index.reset_schedules(schedules.clone());
        index.reset_bookings(bookings.clone());

        assert_eq!(index.project(now()), project(&schedules, &bookings, now()));
    }

    #[test]
    fn test_shared_key_stays_booked_until_last_booking_goes() {
        let a1 = slot("a1", 2);
        let key = SlotKey::of_slot(&"t1".into(), &a1);
        let mut index = DiscoveryIndex::new();
        index.apply_booking(Change::Added(booking("x", "t1", &a1)));
        index.apply_booking(Change::Added(booking("w", "t1", &a1)));
        assert!(index.is_booked(&key));

        index.apply_booking(Change::Removed(booking("w", "t1", &a1)));
        assert!(index.is_booked(&key));
        index.apply_booking(Change::Removed(booking("x", "t1", &a1)));
        assert!(!index.is_booked(&key));
    }
}
