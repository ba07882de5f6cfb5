use chrono::FixedOffset;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tutorme_core::conflict::has_conflict;
use tutorme_core::models::{Schedule, Slot};
use tutorme_core::repository::{
    BookingQuery, BookingStore, Partition, ScheduleQuery, ScheduleStore, UserStore, WriteGuard,
};
use tutorme_core::subscription::Subscription;
use tutorme_core::{retry_stale, Clock, ConflictKind, CoreError, CoreResult};
use tutorme_shared::{collections, ScheduleId, SlotId, UserId};
use tutorme_store::BusinessRules;

use crate::pricing::SlotPricer;
use crate::request::SlotRequest;
use crate::view::{tutor_slots, TutorSlot};

/// Publishes and withdraws a tutor's bookable slots.
pub struct AvailabilityService {
    schedules: Arc<dyn ScheduleStore>,
    bookings: Arc<dyn BookingStore>,
    users: Arc<dyn UserStore>,
    clock: Arc<dyn Clock>,
    timezone: FixedOffset,
    max_write_attempts: u32,
}

impl AvailabilityService {
    pub fn new(
        schedules: Arc<dyn ScheduleStore>,
        bookings: Arc<dyn BookingStore>,
        users: Arc<dyn UserStore>,
        clock: Arc<dyn Clock>,
        rules: &BusinessRules,
    ) -> Self {
        Self {
            schedules,
            bookings,
            users,
            clock,
            timezone: rules.timezone(),
            max_write_attempts: rules.max_write_attempts,
        }
    }

    /// Adds a slot on the next occurrence of the requested weekday.
    ///
    /// The overlap checks and the write form one guarded unit: if the
    /// tutor's schedules or student bookings change between the reads and
    /// the write, the whole check is re-run.
    pub async fn add_slot(&self, tutor_id: &UserId, request: &SlotRequest) -> CoreResult<Slot> {
        let now = self.clock.now();
        let window = request.resolve(&self.timezone, &now.with_timezone(&self.timezone))?;

        let tutor = self
            .users
            .get_user(tutor_id)
            .await?
            .ok_or_else(|| CoreError::NotFoundError(format!("{}/{}", collections::USERS, tutor_id)))?;
        let pricer = SlotPricer::for_tutor(&tutor.doc)?;

        if window.start < now {
            return Err(CoreError::ValidationError("Cannot add a slot that starts in the past".to_string()));
        }
        let price = pricer.price(&window);

        retry_stale("add_slot", self.max_write_attempts, || async {
            let own = self.schedules.query_schedules(&ScheduleQuery::ByTutor(tutor_id.clone())).await?;
            let own_windows: Vec<_> = own.docs.iter().flat_map(Schedule::windows).collect();
            if has_conflict(&window, &own_windows) {
                warn!("Rejected slot for tutor {}: overlaps own availability", tutor_id);
                return Err(CoreError::ConflictError(ConflictKind::Availability));
            }

            let learning = self.bookings.query_bookings(&BookingQuery::ByStudent(tutor_id.clone())).await?;
            let learning_windows: Vec<_> = learning.docs.iter().map(|b| b.window()).collect();
            if has_conflict(&window, &learning_windows) {
                warn!("Rejected slot for tutor {}: overlaps a session booked as student", tutor_id);
                return Err(CoreError::ConflictError(ConflictKind::TeachingVsLearning));
            }

            let guard = WriteGuard::unchanged_since(own.revision.min(learning.revision))
                .watch(Partition::TutorSchedules(tutor_id.clone()))
                .watch(Partition::StudentBookings(tutor_id.clone()));
            let slot = Slot::new(&window, price);

            let schedule = match own.docs.first() {
                Some(existing) => self.schedules.add_slot(&existing.id, slot.clone(), &guard).await?,
                None => self.schedules.create_schedule(tutor_id, vec![slot.clone()], &guard).await?,
            };
            info!("Tutor {} published slot {} on schedule {} at price {}", tutor_id, slot.id, schedule.id, price);
            Ok(slot)
        })
        .await
    }

    /// Removes a slot by id. An id that is not in the schedule leaves it
    /// untouched; a missing schedule is `NotFoundError`.
    pub async fn delete_slot(&self, slot_id: &SlotId, schedule_id: &ScheduleId) -> CoreResult<Schedule> {
        let before = self
            .schedules
            .get_schedule(schedule_id)
            .await?
            .ok_or_else(|| CoreError::NotFoundError(format!("{}/{}", collections::SCHEDULES, schedule_id)))?;

        let after = self.schedules.remove_slot(schedule_id, slot_id, &WriteGuard::none()).await?;
        if after.slots.len() == before.slots.len() {
            debug!("Slot {} not present in schedule {}, nothing removed", slot_id, schedule_id);
        } else {
            info!("Removed slot {} from schedule {}", slot_id, schedule_id);
        }
        Ok(after)
    }

    /// `delete_slot` restricted to the caller's own schedules. Someone
    /// else's schedule reads as missing.
    pub async fn delete_own_slot(&self, tutor_id: &UserId, slot_id: &SlotId, schedule_id: &ScheduleId) -> CoreResult<Schedule> {
        match self.schedules.get_schedule(schedule_id).await? {
            Some(schedule) if schedule.tutor_id == *tutor_id => self.delete_slot(slot_id, schedule_id).await,
            _ => Err(CoreError::NotFoundError(format!("{}/{}", collections::SCHEDULES, schedule_id))),
        }
    }

    pub async fn get_tutor_slots(&self, tutor_id: &UserId) -> CoreResult<Vec<TutorSlot>> {
        let schedules = self.schedules.query_schedules(&ScheduleQuery::ByTutor(tutor_id.clone())).await?;
        let bookings = self.bookings.query_bookings(&BookingQuery::ByTutor(tutor_id.clone())).await?;
        Ok(tutor_slots(&schedules.docs, &bookings.docs, self.clock.now(), &self.timezone))
    }

    pub fn watch_tutor_schedules(&self, tutor_id: &UserId) -> Subscription<Schedule> {
        self.schedules.watch_schedules(ScheduleQuery::ByTutor(tutor_id.clone()))
    }
}
