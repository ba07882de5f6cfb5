use chrono::FixedOffset;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use tutorme_core::conflict::has_conflict;
use tutorme_core::models::{BookedSlot, Booking, NewBooking, Schedule};
use tutorme_core::repository::{
    BookingPatch, BookingQuery, BookingStore, Partition, ScheduleQuery, ScheduleStore, StoreError, UserPatch,
    UserStore, Versioned, WriteGuard,
};
use tutorme_core::time::TimeWindow;
use tutorme_core::{retry_stale, Clock, ConflictKind, CoreError, CoreResult};
use tutorme_shared::{collections, BookingId, ScheduleId, Timestamp, UserId};
use tutorme_store::BusinessRules;

use crate::lifecycle;
use crate::rating::{validate_rating, RatingAggregate};
use crate::views::{self, StudentBookings, TutorBookings};

/// The slot a student picked, as shown to them in discovery.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotSelection {
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub price: i32,
}

impl SlotSelection {
    pub fn window(&self) -> TimeWindow {
        TimeWindow::from_timestamps(&self.start_time, &self.end_time)
    }
}

pub struct BookingService {
    schedules: Arc<dyn ScheduleStore>,
    bookings: Arc<dyn BookingStore>,
    users: Arc<dyn UserStore>,
    clock: Arc<dyn Clock>,
    timezone: FixedOffset,
    lead_minutes: i64,
    max_write_attempts: u32,
}

impl BookingService {
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
            lead_minutes: rules.min_cancel_lead_minutes,
            max_write_attempts: rules.max_write_attempts,
        }
    }

    pub async fn get_booking(&self, booking_id: &BookingId) -> CoreResult<Booking> {
        Ok(self.read_booking(booking_id).await?.doc)
    }

    async fn read_booking(&self, booking_id: &BookingId) -> CoreResult<Versioned<Booking>> {
        self.bookings
            .get_booking(booking_id)
            .await?
            .ok_or_else(|| not_found(collections::BOOKINGS, booking_id.as_str()))
    }

    /// Re-checks and patches one booking until the write lands on the
    /// revision the check saw.
    async fn update_checked<F>(&self, operation: &str, booking_id: &BookingId, check: F) -> CoreResult<Booking>
    where
        F: Fn(&Booking) -> CoreResult<BookingPatch>,
    {
        retry_stale(operation, self.max_write_attempts, || async {
            let read = self.read_booking(booking_id).await?;
            let patch = check(&read.doc)?;
            let guard = WriteGuard::unchanged_since(read.revision).watch(Partition::Booking(booking_id.clone()));
            Ok(self.bookings.update_booking(booking_id, patch, &guard).await?)
        })
        .await
    }

    /// Books `selection` on the tutor's schedule for the student.
    ///
    /// The stored slot is the source of truth: the booking copies its time
    /// and price, and a selection that no longer matches any slot is
    /// `NotFoundError`.
    pub async fn create_booking(
        &self,
        tutor_id: &UserId,
        student_id: &UserId,
        schedule_id: &ScheduleId,
        selection: &SlotSelection,
    ) -> CoreResult<Booking> {
        if tutor_id == student_id {
            return Err(CoreError::ValidationError("Tutors cannot book their own slots".to_string()));
        }
        let window = selection.window();
        if window.end <= window.start {
            return Err(CoreError::ValidationError("End time must be after start time".to_string()));
        }
        if window.start < self.clock.now() {
            return Err(CoreError::ValidationError("Cannot book a slot that has already started".to_string()));
        }

        retry_stale("create_booking", self.max_write_attempts, || async {
            let schedule = self
                .schedules
                .get_schedule(schedule_id)
                .await?
                .filter(|s| s.tutor_id == *tutor_id)
                .ok_or_else(|| not_found(collections::SCHEDULES, schedule_id.as_str()))?;
            let slot = schedule
                .slot_with_window(&selection.start_time, &selection.end_time)
                .ok_or_else(|| {
                    CoreError::NotFoundError(format!(
                        "{}/{}/slots@{}-{}",
                        collections::SCHEDULES,
                        schedule_id,
                        selection.start_time.to_millis(),
                        selection.end_time.to_millis()
                    ))
                })?;
            if slot.price != selection.price {
                warn!("Slot price on {} changed from {} to {} since it was shown", schedule_id, selection.price, slot.price);
            }

            let studying = self.bookings.query_bookings(&BookingQuery::ByStudent(student_id.clone())).await?;
            let studying_windows: Vec<_> = studying.docs.iter().map(Booking::window).collect();
            if has_conflict(&window, &studying_windows) {
                warn!("Rejected booking for student {}: double booking", student_id);
                return Err(CoreError::ConflictError(ConflictKind::DoubleBooking));
            }

            let teaching = self.schedules.query_schedules(&ScheduleQuery::ByTutor(student_id.clone())).await?;
            let teaching_windows: Vec<_> = teaching.docs.iter().flat_map(Schedule::windows).collect();
            if has_conflict(&window, &teaching_windows) {
                warn!("Rejected booking for student {}: overlaps own availability", student_id);
                return Err(CoreError::ConflictError(ConflictKind::TeachLearnOverlap));
            }

            let taken = self.bookings.query_bookings(&BookingQuery::ByTutor(tutor_id.clone())).await?;
            let taken_windows: Vec<_> = taken.docs.iter().map(Booking::window).collect();
            if has_conflict(&window, &taken_windows) {
                warn!("Rejected booking for student {}: tutor {} already booked", student_id, tutor_id);
                return Err(CoreError::ConflictError(ConflictKind::SlotTaken));
            }

            let read_at = studying.revision.min(teaching.revision).min(taken.revision);
            let guard = WriteGuard::unchanged_since(read_at)
                .watch(Partition::StudentBookings(student_id.clone()))
                .watch(Partition::TutorSchedules(student_id.clone()))
                .watch(Partition::TutorBookings(tutor_id.clone()));

            let booking = NewBooking::new(tutor_id.clone(), student_id.clone(), schedule.id.clone(), BookedSlot::from(slot));
            let created = self.bookings.create_booking(booking, &guard).await?;
            info!("Student {} booked tutor {} as {}", student_id, tutor_id, created.id);
            Ok(created)
        })
        .await
    }

    /// Records the student's rating on the booking, then folds it into the
    /// tutor's aggregate. If the second write fails the rating stays on the
    /// booking and the failure is reported as `ReconciliationError`.
    pub async fn submit_rating(
        &self,
        booking_id: &BookingId,
        rating: u8,
        review: &str,
        tutor_id: &UserId,
    ) -> CoreResult<Booking> {
        let rating = validate_rating(rating)?;
        let review = review.trim();
        let rated = self
            .update_checked("submit_rating", booking_id, |booking| {
                if booking.tutor != *tutor_id {
                    return Err(CoreError::ValidationError(format!(
                        "Booking {} is not with tutor {}",
                        booking_id, tutor_id
                    )));
                }
                lifecycle::ensure_ratable(booking, self.clock.now())?;
                Ok(BookingPatch {
                    ratings: Some(rating),
                    review: Some(review.to_string()),
                    ..BookingPatch::default()
                })
            })
            .await?;

        let folded = retry_stale("submit_rating", self.max_write_attempts, || async {
            let tutor = self
                .users
                .get_user(tutor_id)
                .await?
                .ok_or_else(|| not_found(collections::USERS, tutor_id.as_str()))?;
            let next = RatingAggregate::of(tutor.doc.profile.as_ref()).with_review(rating);
            let patch = UserPatch {
                rating: Some(next.rating),
                total_reviews_increment: Some(1),
                ..UserPatch::default()
            };
            let guard = WriteGuard::unchanged_since(tutor.revision).watch(Partition::User(tutor_id.clone()));
            self.users.update_user(tutor_id, patch, &guard).await?;
            Ok(next)
        })
        .await;

        match folded {
            Ok(aggregate) => {
                info!(
                    "Booking {} rated {}; tutor {} now {:.2} over {} reviews",
                    booking_id, rating, tutor_id, aggregate.rating, aggregate.total_reviews
                );
                Ok(rated)
            }
            Err(err) => {
                error!("Rating on booking {} not folded into tutor {}: {}", booking_id, tutor_id, err);
                Err(CoreError::ReconciliationError {
                    booking_id: booking_id.clone(),
                    source: reconciliation_source(err, tutor_id),
                })
            }
        }
    }

    pub async fn mark_complete(&self, booking_id: &BookingId) -> CoreResult<Booking> {
        let updated = self
            .update_checked("mark_complete", booking_id, |booking| {
                Ok(BookingPatch {
                    status: Some(lifecycle::complete(booking, self.clock.now())?),
                    ..BookingPatch::default()
                })
            })
            .await?;
        info!("Booking {} marked complete", booking_id);
        Ok(updated)
    }

    /// Hard delete. The lead-time rule is applied by callers, not here.
    pub async fn delete_booking(&self, booking_id: &BookingId) -> CoreResult<()> {
        self.bookings.delete_booking(booking_id).await?;
        info!("Booking {} deleted", booking_id);
        Ok(())
    }

    pub async fn student_bookings(&self, student_id: &UserId) -> CoreResult<StudentBookings> {
        let snapshot = self.bookings.query_bookings(&BookingQuery::ByStudent(student_id.clone())).await?;
        Ok(views::student_view(snapshot.docs, self.clock.now(), self.lead_minutes, &self.timezone))
    }

    pub async fn tutor_bookings(&self, tutor_id: &UserId) -> CoreResult<TutorBookings> {
        let snapshot = self.bookings.query_bookings(&BookingQuery::ByTutor(tutor_id.clone())).await?;
        Ok(views::tutor_view(snapshot.docs, self.clock.now(), self.lead_minutes, &self.timezone))
    }
}

fn not_found(collection: &str, id: &str) -> CoreError {
    CoreError::NotFoundError(format!("{}/{}", collection, id))
}

fn reconciliation_source(err: CoreError, tutor_id: &UserId) -> StoreError {
    match err {
        CoreError::StoreError(source) => source,
        CoreError::NotFoundError(_) => StoreError::Missing {
            collection: collections::USERS,
            id: tutor_id.to_string(),
        },
        other => StoreError::Unavailable(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use tutorme_core::models::{BookingStatus, Profile, Slot, User};
    use tutorme_core::repository::Snapshot;
    use tutorme_core::subscription::Subscription;
    use tutorme_core::FixedClock;
    use tutorme_store::MemoryStore;

    /// Booking reads hand control back to the runtime before answering, so
    /// concurrent callers interleave between their read and their write.
    struct YieldingBookings(MemoryStore);

    #[async_trait]
    impl BookingStore for YieldingBookings {
        async fn query_bookings(&self, query: &BookingQuery) -> Result<Snapshot<Booking>, StoreError> {
            self.0.query_bookings(query).await
        }

        async fn get_booking(&self, id: &BookingId) -> Result<Option<Versioned<Booking>>, StoreError> {
            let read = self.0.get_booking(id).await;
            tokio::task::yield_now().await;
            read
        }

        async fn create_booking(&self, booking: NewBooking, guard: &WriteGuard) -> Result<Booking, StoreError> {
            self.0.create_booking(booking, guard).await
        }

        async fn update_booking(&self, id: &BookingId, patch: BookingPatch, guard: &WriteGuard) -> Result<Booking, StoreError> {
            self.0.update_booking(id, patch, guard).await
        }

        async fn delete_booking(&self, id: &BookingId) -> Result<(), StoreError> {
            self.0.delete_booking(id).await
        }

        fn watch_bookings(&self, query: BookingQuery) -> Subscription<Booking> {
            self.0.watch_bookings(query)
        }
    }

    struct Fixture {
        service: BookingService,
        store: MemoryStore,
        clock: FixedClock,
        tutor: UserId,
        student: UserId,
        schedule: Schedule,
    }

    fn monday_morning() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap()
    }

    fn wednesday(hour: u32) -> TimeWindow {
        let start = Utc.with_ymd_and_hms(2026, 3, 4, hour, 0, 0).unwrap();
        TimeWindow::new(start, start + Duration::hours(1))
    }

    fn selection(slot: &Slot) -> SlotSelection {
        SlotSelection {
            start_time: slot.start_time,
            end_time: slot.end_time,
            price: slot.price,
        }
    }

    async fn fixture() -> Fixture {
        let clock = FixedClock::new(monday_morning());
        let store = MemoryStore::new(Arc::new(clock.clone()));
        let tutor = UserId::new("tutor-1");
        let student = UserId::new("student-1");

        let mut tutor_user = User::new(tutor.clone(), Some("Ravi".into()), None);
        tutor_user.profile = Some(Profile { rating: 4.0, total_reviews: 1, hourly_rate: 30.0, ..Profile::default() });
        store.upsert_user(tutor_user).await.unwrap();
        store.upsert_user(User::new(student.clone(), Some("Mina".into()), None)).await.unwrap();

        let slots = vec![Slot::new(&wednesday(10), 30), Slot::new(&wednesday(14), 30)];
        let schedule = store.create_schedule(&tutor, slots, &WriteGuard::none()).await.unwrap();

        let service = BookingService::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(clock.clone()),
            &BusinessRules::default(),
        );
        Fixture { service, store, clock, tutor, student, schedule }
    }

    #[tokio::test]
    async fn test_create_booking_copies_slot() {
        let f = fixture().await;
        let slot = &f.schedule.slots[0];

        let booking = f.service.create_booking(&f.tutor, &f.student, &f.schedule.id, &selection(slot)).await.unwrap();
        assert_eq!(booking.booked_slot, BookedSlot::from(slot));
        assert!(booking.is_paid);
        assert_eq!(booking.ratings, 0);
        assert_eq!(booking.review, "");

        // The schedule keeps the slot; booked state is derived elsewhere.
        let schedule = f.store.get_schedule(&f.schedule.id).await.unwrap().unwrap();
        assert_eq!(schedule.slots.len(), 2);
    }

    #[tokio::test]
    async fn test_double_booking_is_rejected_without_second_document() {
        let f = fixture().await;
        let slot = &f.schedule.slots[0];
        f.service.create_booking(&f.tutor, &f.student, &f.schedule.id, &selection(slot)).await.unwrap();

        // Same student, overlapping window with a different tutor.
        let other_tutor = UserId::new("tutor-2");
        let other = f
            .store
            .create_schedule(&other_tutor, vec![Slot::new(&wednesday(10), 25)], &WriteGuard::none())
            .await
            .unwrap();
        let err = f
            .service
            .create_booking(&other_tutor, &f.student, &other.id, &selection(&other.slots[0]))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ConflictError(ConflictKind::DoubleBooking)));

        let all = f.store.query_bookings(&BookingQuery::All).await.unwrap();
        assert_eq!(all.docs.len(), 1);
    }

    #[tokio::test]
    async fn test_slot_taken_by_another_student() {
        let f = fixture().await;
        let slot = &f.schedule.slots[1];
        f.service.create_booking(&f.tutor, &f.student, &f.schedule.id, &selection(slot)).await.unwrap();

        let err = f
            .service
            .create_booking(&f.tutor, &UserId::new("student-2"), &f.schedule.id, &selection(slot))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ConflictError(ConflictKind::SlotTaken)));
    }

    #[tokio::test]
    async fn test_student_teaching_at_same_time() {
        let f = fixture().await;
        f.store
            .create_schedule(&f.student, vec![Slot::new(&wednesday(10), 20)], &WriteGuard::none())
            .await
            .unwrap();

        let err = f
            .service
            .create_booking(&f.tutor, &f.student, &f.schedule.id, &selection(&f.schedule.slots[0]))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ConflictError(ConflictKind::TeachLearnOverlap)));
    }

    #[tokio::test]
    async fn test_rejects_self_booking_and_unknown_slots() {
        let f = fixture().await;
        let slot = &f.schedule.slots[0];

        let err = f.service.create_booking(&f.tutor, &f.tutor, &f.schedule.id, &selection(slot)).await.unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));

        let err = f
            .service
            .create_booking(&f.tutor, &f.student, &ScheduleId::new("nope"), &selection(slot))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFoundError(_)));

        let ghost = Slot::new(&wednesday(18), 30);
        let err = f
            .service
            .create_booking(&f.tutor, &f.student, &f.schedule.id, &selection(&ghost))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFoundError(_)));
    }

    #[tokio::test]
    async fn test_rating_updates_running_average() {
        let f = fixture().await;
        let booking = f
            .service
            .create_booking(&f.tutor, &f.student, &f.schedule.id, &selection(&f.schedule.slots[0]))
            .await
            .unwrap();

        let err = f.service.submit_rating(&booking.id, 5, "great", &f.tutor).await.unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));

        f.clock.advance(Duration::days(3));
        let rated = f.service.submit_rating(&booking.id, 5, "great", &f.tutor).await.unwrap();
        assert_eq!(rated.ratings, 5);
        assert_eq!(rated.review, "great");

        let tutor = f.store.get_user(&f.tutor).await.unwrap().unwrap().doc;
        let profile = tutor.profile.unwrap();
        assert_eq!(profile.rating, 4.5);
        assert_eq!(profile.total_reviews, 2);

        let again = f.service.submit_rating(&booking.id, 1, "changed my mind", &f.tutor).await.unwrap_err();
        assert!(matches!(again, CoreError::ValidationError(_)));
        assert!(matches!(
            f.service.submit_rating(&booking.id, 9, "", &f.tutor).await,
            Err(CoreError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_ratings_of_one_booking_fold_once() {
        let f = fixture().await;
        let booking = f
            .service
            .create_booking(&f.tutor, &f.student, &f.schedule.id, &selection(&f.schedule.slots[0]))
            .await
            .unwrap();
        f.clock.advance(Duration::days(3));

        let service = BookingService::new(
            Arc::new(f.store.clone()),
            Arc::new(YieldingBookings(f.store.clone())),
            Arc::new(f.store.clone()),
            Arc::new(f.clock.clone()),
            &BusinessRules::default(),
        );
        let (first, second) = tokio::join!(
            service.submit_rating(&booking.id, 5, "great", &f.tutor),
            service.submit_rating(&booking.id, 1, "poor", &f.tutor),
        );

        let outcomes = [first, second];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        for outcome in &outcomes {
            if let Err(err) = outcome {
                assert!(matches!(err, CoreError::ValidationError(_)), "unexpected {:?}", err);
            }
        }

        let stored = f.service.get_booking(&booking.id).await.unwrap();
        let profile = f.store.get_user(&f.tutor).await.unwrap().unwrap().doc.profile.unwrap();
        assert_eq!(profile.total_reviews, 2);
        assert_eq!(profile.rating, (4.0 + f64::from(stored.ratings)) / 2.0);
    }

    #[tokio::test]
    async fn test_rating_reports_reconciliation_when_tutor_missing() {
        let f = fixture().await;
        let ghost_tutor = UserId::new("ghost");
        let schedule = f
            .store
            .create_schedule(&ghost_tutor, vec![Slot::new(&wednesday(16), 30)], &WriteGuard::none())
            .await
            .unwrap();
        let booking = f
            .service
            .create_booking(&ghost_tutor, &f.student, &schedule.id, &selection(&schedule.slots[0]))
            .await
            .unwrap();
        f.clock.advance(Duration::days(3));

        let err = f.service.submit_rating(&booking.id, 4, "ok", &ghost_tutor).await.unwrap_err();
        match err {
            CoreError::ReconciliationError { booking_id, source } => {
                assert_eq!(booking_id, booking.id);
                assert!(matches!(source, StoreError::Missing { collection: "users", .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
        // The booking half of the write stays.
        assert_eq!(f.service.get_booking(&booking.id).await.unwrap().ratings, 4);
    }

    #[tokio::test]
    async fn test_mark_complete_after_session() {
        let f = fixture().await;
        let booking = f
            .service
            .create_booking(&f.tutor, &f.student, &f.schedule.id, &selection(&f.schedule.slots[0]))
            .await
            .unwrap();

        assert!(f.service.mark_complete(&booking.id).await.is_err());

        f.clock.set(Utc.with_ymd_and_hms(2026, 3, 4, 11, 0, 0).unwrap());
        let done = f.service.mark_complete(&booking.id).await.unwrap();
        assert_eq!(done.status(), BookingStatus::Completed);
        assert!(f.service.mark_complete(&booking.id).await.is_err());

        let view = f.service.tutor_bookings(&f.tutor).await.unwrap();
        assert_eq!(view.completed.len(), 1);
        assert!(view.pending.is_empty());
    }

    #[tokio::test]
    async fn test_delete_booking_frees_slot() {
        let f = fixture().await;
        let slot = &f.schedule.slots[0];
        let booking = f.service.create_booking(&f.tutor, &f.student, &f.schedule.id, &selection(slot)).await.unwrap();

        f.service.delete_booking(&booking.id).await.unwrap();
        assert!(matches!(f.service.delete_booking(&booking.id).await, Err(CoreError::NotFoundError(_))));

        let again = f.service.create_booking(&f.tutor, &f.student, &f.schedule.id, &selection(slot)).await;
        assert!(again.is_ok());
        assert_eq!(f.service.student_bookings(&f.student).await.unwrap().upcoming.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_bookings_of_one_slot_commit_once() {
        let f = fixture().await;
        let service = Arc::new(f.service);
        let slot = selection(&f.schedule.slots[0]);

        let mut handles = Vec::new();
        for n in 0..4 {
            let service = service.clone();
            let tutor = f.tutor.clone();
            let schedule = f.schedule.id.clone();
            let slot = slot.clone();
            handles.push(tokio::spawn(async move {
                let student = UserId::new(format!("racer-{}", n));
                service.create_booking(&tutor, &student, &schedule, &slot).await
            }));
        }

        let mut committed = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => committed += 1,
                Err(err) => assert!(
                    matches!(err, CoreError::ConflictError(ConflictKind::SlotTaken)) || err.is_stale_write(),
                    "unexpected {:?}",
                    err
                ),
            }
        }
        assert_eq!(committed, 1);
        assert_eq!(f.store.query_bookings(&BookingQuery::ByTutor(f.tutor.clone())).await.unwrap().docs.len(), 1);
    }
}
