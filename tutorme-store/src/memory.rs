use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use tutorme_core::models::{Booking, NewBooking, Profile, Schedule, Slot, User};
use tutorme_core::repository::{
    BookingPatch, BookingQuery, BookingStore, Document, Partition, Revision, ScheduleQuery, ScheduleStore, Snapshot,
    StoreError, UserPatch, UserStore, Versioned, WriteGuard,
};
use tutorme_core::subscription::{StreamEvent, Subscription};
use tutorme_core::Clock;
use tutorme_shared::{collections, BookingId, Masked, ScheduleId, SlotId, Timestamp, UserId};

use crate::app_config::StoreConfig;
use crate::events::{classify, ChangeFeed, StoreEvent};

#[derive(Default)]
struct State {
    revision: Revision,
    schedules: BTreeMap<ScheduleId, Schedule>,
    bookings: BTreeMap<BookingId, Booking>,
    users: BTreeMap<UserId, User>,
    // Last revision that modified each partition.
    touched: HashMap<Partition, Revision>,
    offline: Option<String>,
}

impl State {
    fn ensure_online(&self) -> Result<(), StoreError> {
        match &self.offline {
            Some(reason) => Err(StoreError::Unavailable(reason.clone())),
            None => Ok(()),
        }
    }

    fn check(&self, guard: &WriteGuard) -> Result<(), StoreError> {
        let Some(read_at) = guard.read_at else {
            return Ok(());
        };
        for partition in &guard.partitions {
            if let Some(changed_at) = self.touched.get(partition) {
                if *changed_at > read_at {
                    return Err(StoreError::Stale {
                        partition: partition.clone(),
                        read_at,
                    });
                }
            }
        }
        Ok(())
    }

    fn commit(&mut self, partitions: impl IntoIterator<Item = Partition>) -> Revision {
        self.revision = Revision(self.revision.0 + 1);
        for partition in partitions {
            self.touched.insert(partition, self.revision);
        }
        self.revision
    }
}

fn booking_partitions(booking: &Booking) -> [Partition; 3] {
    [
        Partition::Booking(booking.id.clone()),
        Partition::StudentBookings(booking.student.clone()),
        Partition::TutorBookings(booking.tutor.clone()),
    ]
}

fn missing(collection: &'static str, id: &str) -> StoreError {
    StoreError::Missing {
        collection,
        id: id.to_string(),
    }
}

/// Documents a live query can be opened on.
trait Watched: Document {
    type Query: Clone + Send + Sync + std::fmt::Debug + 'static;

    fn select(state: &State, query: &Self::Query) -> Vec<Self>;
    fn from_event(event: &StoreEvent) -> Option<(Revision, Option<&Self>, Option<&Self>)>;
    fn matches(query: &Self::Query, doc: &Self) -> bool;
}

impl Watched for Schedule {
    type Query = ScheduleQuery;

    fn select(state: &State, query: &ScheduleQuery) -> Vec<Schedule> {
        state.schedules.values().filter(|s| query.matches(s)).cloned().collect()
    }

    fn from_event(event: &StoreEvent) -> Option<(Revision, Option<&Schedule>, Option<&Schedule>)> {
        match event {
            StoreEvent::Schedule { revision, before, after } => Some((*revision, before.as_ref(), after.as_ref())),
            _ => None,
        }
    }

    fn matches(query: &ScheduleQuery, doc: &Schedule) -> bool {
        query.matches(doc)
    }
}

impl Watched for Booking {
    type Query = BookingQuery;

    fn select(state: &State, query: &BookingQuery) -> Vec<Booking> {
        state.bookings.values().filter(|b| query.matches(b)).cloned().collect()
    }

    fn from_event(event: &StoreEvent) -> Option<(Revision, Option<&Booking>, Option<&Booking>)> {
        match event {
            StoreEvent::Booking { revision, before, after } => Some((*revision, before.as_ref(), after.as_ref())),
            _ => None,
        }
    }

    fn matches(query: &BookingQuery, doc: &Booking) -> bool {
        query.matches(doc)
    }
}

/// In-process document store. Holds the three collections behind one lock so
/// guarded writes check and commit atomically.
#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
    feed: ChangeFeed,
    clock: Arc<dyn Clock>,
    subscription_buffer: usize,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::from_config(&StoreConfig::default(), clock)
    }

    pub fn from_config(config: &StoreConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(RwLock::new(State::default())),
            feed: ChangeFeed::new(config.subscription_buffer),
            clock,
            subscription_buffer: config.subscription_buffer.max(1),
        }
    }

    pub async fn revision(&self) -> Revision {
        self.state.read().await.revision
    }

    /// Simulates a dropped connection: open live queries receive an error
    /// and end, every call fails with `Unavailable` until [`Self::reconnect`].
    pub async fn disconnect(&self, reason: &str) {
        let mut state = self.state.write().await;
        state.offline = Some(reason.to_string());
        warn!("Store disconnected: {}", reason);
        self.feed.publish(StoreEvent::Disconnected(reason.to_string()));
    }

    pub async fn reconnect(&self) {
        self.state.write().await.offline = None;
        info!("Store reconnected");
    }

    fn server_timestamp(&self) -> Timestamp {
        Timestamp::from_date(self.clock.now())
    }

    async fn mutate_schedule<F>(&self, schedule_id: &ScheduleId, guard: &WriteGuard, apply: F) -> Result<Schedule, StoreError>
    where
        F: FnOnce(&mut Schedule) + Send,
    {
        let mut state = self.state.write().await;
        state.ensure_online()?;
        state.check(guard)?;

        let Some(current) = state.schedules.get_mut(schedule_id) else {
            return Err(missing(collections::SCHEDULES, schedule_id.as_str()));
        };
        let before = current.clone();
        apply(current);
        let after = current.clone();

        let revision = state.commit([Partition::TutorSchedules(after.tutor_id.clone())]);
        self.feed.publish(StoreEvent::Schedule {
            revision,
            before: Some(before),
            after: Some(after.clone()),
        });
        Ok(after)
    }

    fn watch<T: Watched>(&self, query: T::Query) -> Subscription<T> {
        let (tx, rx) = mpsc::channel(self.subscription_buffer);
        let state = self.state.clone();
        let feed = self.feed.clone();

        let listener = tokio::spawn(async move {
            let mut events = {
                let current = state.read().await;
                if let Some(reason) = &current.offline {
                    let _ = tx.send(StreamEvent::Error(StoreError::Unavailable(reason.clone()))).await;
                    return;
                }
                // Subscribing under the read lock pins the snapshot to the feed position.
                let events = feed.subscribe();
                let snapshot = StreamEvent::Snapshot {
                    docs: T::select(&current, &query),
                    revision: current.revision,
                };
                drop(current);
                if tx.send(snapshot).await.is_err() {
                    return;
                }
                events
            };

            loop {
                match events.recv().await {
                    Ok(StoreEvent::Disconnected(reason)) => {
                        let _ = tx.send(StreamEvent::Error(StoreError::Unavailable(reason))).await;
                        return;
                    }
                    Ok(event) => {
                        let Some((revision, before, after)) = T::from_event(&event) else {
                            continue;
                        };
                        let Some(change) = classify(before, after, |doc| T::matches(&query, doc)) else {
                            continue;
                        };
                        let batch = StreamEvent::Changes {
                            changes: vec![change],
                            revision,
                        };
                        if tx.send(batch).await.is_err() {
                            return;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Live query {:?} fell {} changes behind, resyncing", query, skipped);
                        let current = state.read().await;
                        if let Some(reason) = &current.offline {
                            let _ = tx.send(StreamEvent::Error(StoreError::Unavailable(reason.clone()))).await;
                            return;
                        }
                        events = feed.subscribe();
                        let snapshot = StreamEvent::Snapshot {
                            docs: T::select(&current, &query),
                            revision: current.revision,
                        };
                        drop(current);
                        if tx.send(snapshot).await.is_err() {
                            return;
                        }
                    }
                    Err(RecvError::Closed) => return,
                }
            }
        });

        Subscription::new(rx, listener)
    }
}

#[async_trait]
impl ScheduleStore for MemoryStore {
    async fn query_schedules(&self, query: &ScheduleQuery) -> Result<Snapshot<Schedule>, StoreError> {
        let state = self.state.read().await;
        state.ensure_online()?;
        Ok(Snapshot {
            docs: Schedule::select(&state, query),
            revision: state.revision,
        })
    }

    async fn get_schedule(&self, id: &ScheduleId) -> Result<Option<Schedule>, StoreError> {
        let state = self.state.read().await;
        state.ensure_online()?;
        Ok(state.schedules.get(id).cloned())
    }

    async fn create_schedule(&self, tutor_id: &UserId, slots: Vec<Slot>, guard: &WriteGuard) -> Result<Schedule, StoreError> {
        let mut state = self.state.write().await;
        state.ensure_online()?;
        state.check(guard)?;

        let schedule = Schedule {
            id: ScheduleId::generate(),
            tutor_id: tutor_id.clone(),
            slots,
        };
        state.schedules.insert(schedule.id.clone(), schedule.clone());
        let revision = state.commit([Partition::TutorSchedules(tutor_id.clone())]);
        info!("Created schedule {} for tutor {} at {}", schedule.id, tutor_id, revision);
        self.feed.publish(StoreEvent::Schedule {
            revision,
            before: None,
            after: Some(schedule.clone()),
        });
        Ok(schedule)
    }

    async fn add_slot(&self, schedule_id: &ScheduleId, slot: Slot, guard: &WriteGuard) -> Result<Schedule, StoreError> {
        self.mutate_schedule(schedule_id, guard, move |schedule| {
            // Array-union: an identical slot is not added twice.
            if !schedule.slots.contains(&slot) {
                schedule.slots.push(slot);
            }
        })
        .await
    }

    async fn remove_slot(&self, schedule_id: &ScheduleId, slot_id: &SlotId, guard: &WriteGuard) -> Result<Schedule, StoreError> {
        let slot_id = slot_id.clone();
        self.mutate_schedule(schedule_id, guard, move |schedule| {
            schedule.slots.retain(|slot| slot.id != slot_id);
        })
        .await
    }

    async fn replace_slots(&self, schedule_id: &ScheduleId, slots: Vec<Slot>, guard: &WriteGuard) -> Result<Schedule, StoreError> {
        self.mutate_schedule(schedule_id, guard, move |schedule| schedule.slots = slots)
            .await
    }

    async fn delete_schedule(&self, id: &ScheduleId) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.ensure_online()?;
        let Some(removed) = state.schedules.remove(id) else {
            debug!("Schedule {} already absent", id);
            return Ok(());
        };
        let revision = state.commit([Partition::TutorSchedules(removed.tutor_id.clone())]);
        self.feed.publish(StoreEvent::Schedule {
            revision,
            before: Some(removed),
            after: None,
        });
        Ok(())
    }

    fn watch_schedules(&self, query: ScheduleQuery) -> Subscription<Schedule> {
        self.watch(query)
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn query_bookings(&self, query: &BookingQuery) -> Result<Snapshot<Booking>, StoreError> {
        let state = self.state.read().await;
        state.ensure_online()?;
        Ok(Snapshot {
            docs: Booking::select(&state, query),
            revision: state.revision,
        })
    }

    async fn get_booking(&self, id: &BookingId) -> Result<Option<Versioned<Booking>>, StoreError> {
        let state = self.state.read().await;
        state.ensure_online()?;
        Ok(state.bookings.get(id).map(|booking| Versioned {
            doc: booking.clone(),
            revision: state.revision,
        }))
    }

    async fn create_booking(&self, booking: NewBooking, guard: &WriteGuard) -> Result<Booking, StoreError> {
        let mut state = self.state.write().await;
        state.ensure_online()?;
        state.check(guard)?;

        let booking = booking.into_booking(BookingId::generate(), self.server_timestamp());
        state.bookings.insert(booking.id.clone(), booking.clone());
        let revision = state.commit(booking_partitions(&booking));
        info!("Created booking {} ({} with {}) at {}", booking.id, booking.student, booking.tutor, revision);
        self.feed.publish(StoreEvent::Booking {
            revision,
            before: None,
            after: Some(booking.clone()),
        });
        Ok(booking)
    }

    async fn update_booking(&self, id: &BookingId, patch: BookingPatch, guard: &WriteGuard) -> Result<Booking, StoreError> {
        let mut state = self.state.write().await;
        state.ensure_online()?;
        state.check(guard)?;

        let Some(current) = state.bookings.get_mut(id) else {
            return Err(missing(collections::BOOKINGS, id.as_str()));
        };
        let before = current.clone();
        if let Some(ratings) = patch.ratings {
            current.ratings = ratings;
        }
        if let Some(review) = patch.review {
            current.review = review;
        }
        if let Some(status) = patch.status {
            current.status = Some(status);
        }
        let after = current.clone();

        let revision = state.commit(booking_partitions(&after));
        self.feed.publish(StoreEvent::Booking {
            revision,
            before: Some(before),
            after: Some(after.clone()),
        });
        Ok(after)
    }

    async fn delete_booking(&self, id: &BookingId) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.ensure_online()?;

        let Some(removed) = state.bookings.remove(id) else {
            return Err(missing(collections::BOOKINGS, id.as_str()));
        };
        let revision = state.commit(booking_partitions(&removed));
        info!("Deleted booking {} at {}", id, revision);
        self.feed.publish(StoreEvent::Booking {
            revision,
            before: Some(removed),
            after: None,
        });
        Ok(())
    }

    fn watch_bookings(&self, query: BookingQuery) -> Subscription<Booking> {
        self.watch(query)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn get_user(&self, id: &UserId) -> Result<Option<Versioned<User>>, StoreError> {
        let state = self.state.read().await;
        state.ensure_online()?;
        Ok(state.users.get(id).map(|user| Versioned {
            doc: user.clone(),
            revision: state.revision,
        }))
    }

    async fn get_users(&self, ids: &[UserId]) -> Result<Vec<User>, StoreError> {
        let state = self.state.read().await;
        state.ensure_online()?;
        Ok(ids.iter().filter_map(|id| state.users.get(id).cloned()).collect())
    }

    async fn list_tutors(&self) -> Result<Vec<User>, StoreError> {
        let state = self.state.read().await;
        state.ensure_online()?;
        Ok(state.users.values().filter(|u| u.is_tutor()).cloned().collect())
    }

    async fn upsert_user(&self, user: User) -> Result<User, StoreError> {
        let now = self.server_timestamp();
        let mut state = self.state.write().await;
        state.ensure_online()?;

        let before = state.users.get(&user.id).cloned();
        let merged = match &before {
            Some(existing) => User {
                id: user.id,
                name: user.name.or_else(|| existing.name.clone()),
                email: user.email.or_else(|| existing.email.clone()),
                profile: user.profile.or_else(|| existing.profile.clone()),
                contact: user.contact.or_else(|| existing.contact.clone()),
                created_at: existing.created_at.or(Some(now)),
            },
            None => User {
                created_at: Some(now),
                ..user
            },
        };
        state.users.insert(merged.id.clone(), merged.clone());
        let revision = state.commit([Partition::User(merged.id.clone())]);
        info!("Upserted user {} at {}", merged.id, revision);
        self.feed.publish(StoreEvent::User {
            revision,
            before,
            after: Some(merged.clone()),
        });
        Ok(merged)
    }

    async fn update_user(&self, id: &UserId, patch: UserPatch, guard: &WriteGuard) -> Result<User, StoreError> {
        let mut state = self.state.write().await;
        state.ensure_online()?;
        state.check(guard)?;

        let Some(current) = state.users.get_mut(id) else {
            return Err(missing(collections::USERS, id.as_str()));
        };
        let before = current.clone();
        apply_user_patch(current, patch);
        let after = current.clone();

        let revision = state.commit([Partition::User(id.clone())]);
        self.feed.publish(StoreEvent::User {
            revision,
            before: Some(before),
            after: Some(after.clone()),
        });
        Ok(after)
    }
}

fn apply_user_patch(user: &mut User, patch: UserPatch) {
    if let Some(name) = patch.name {
        user.name = Some(name);
    }
    if let Some(contact) = patch.contact {
        user.contact = Some(Masked(contact));
    }

    let touches_profile = patch.bio.is_some()
        || patch.speciality.is_some()
        || patch.hourly_rate.is_some()
        || patch.rating.is_some()
        || patch.total_reviews_increment.is_some();
    if !touches_profile {
        return;
    }

    let profile = user.profile.get_or_insert_with(Profile::default);
    if let Some(bio) = patch.bio {
        profile.bio = bio;
    }
    if let Some(speciality) = patch.speciality {
        profile.speciality = speciality;
    }
    if let Some(rate) = patch.hourly_rate {
        profile.hourly_rate = rate;
    }
    if let Some(rating) = patch.rating {
        profile.rating = rating;
    }
    if let Some(increment) = patch.total_reviews_increment {
        profile.total_reviews = profile.total_reviews.saturating_add(increment);
    }
}
