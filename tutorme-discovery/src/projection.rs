//! What students see when browsing: every other tutor's upcoming slots,
//! each flagged booked when some booking carries the same
//! `tutor-start-end` key. Schedules with nothing upcoming are dropped.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use tutorme_core::models::{Booking, Schedule, SlotKey, User};
use tutorme_shared::{ScheduleId, SlotId, Timestamp, UserId};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverySlot {
    pub id: SlotId,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub price: i32,
    pub is_booked: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TutorSummary {
    pub id: UserId,
    pub name: String,
    pub bio: String,
    pub speciality: String,
    pub rating: f64,
    pub total_reviews: u32,
    pub hourly_rate: f64,
}

impl From<&User> for TutorSummary {
    fn from(user: &User) -> Self {
        let profile = user.profile.clone().unwrap_or_default();
        Self {
            id: user.id.clone(),
            name: user.name.clone().unwrap_or_else(|| "Unknown".to_string()),
            bio: profile.bio,
            speciality: profile.speciality,
            rating: profile.rating,
            total_reviews: profile.total_reviews,
            hourly_rate: profile.hourly_rate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverySchedule {
    pub id: ScheduleId,
    pub tutor_id: UserId,
    /// Filled in after projection; `None` when the tutor document is gone.
    pub tutor: Option<TutorSummary>,
    pub slots: Vec<DiscoverySlot>,
}

/// Projects one schedule given a booked-key predicate. Shared by the full
/// recompute and the incremental index so both render identically.
pub(crate) fn project_schedule<F>(schedule: &Schedule, now: DateTime<Utc>, is_booked: F) -> Option<DiscoverySchedule>
where
    F: Fn(&SlotKey) -> bool,
{
    let mut slots: Vec<DiscoverySlot> = schedule
        .slots
        .iter()
        .filter(|slot| slot.start_time.to_date() >= now)
        .map(|slot| DiscoverySlot {
            id: slot.id.clone(),
            start_time: slot.start_time,
            end_time: slot.end_time,
            price: slot.price,
            is_booked: is_booked(&SlotKey::of_slot(&schedule.tutor_id, slot)),
        })
        .collect();
    if slots.is_empty() {
        return None;
    }
    slots.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id)));

    Some(DiscoverySchedule {
        id: schedule.id.clone(),
        tutor_id: schedule.tutor_id.clone(),
        tutor: None,
        slots,
    })
}

/// Full recompute from both collections.
pub fn project(schedules: &[Schedule], bookings: &[Booking], now: DateTime<Utc>) -> Vec<DiscoverySchedule> {
    let booked: HashSet<SlotKey> = bookings.iter().map(SlotKey::of_booking).collect();

    let mut projected: Vec<DiscoverySchedule> = schedules
        .iter()
        .filter_map(|schedule| project_schedule(schedule, now, |key| booked.contains(key)))
        .collect();
    projected.sort_by(|a, b| a.id.cmp(&b.id));
    projected
}
