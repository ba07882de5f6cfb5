use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use tutorme_core::models::{Booking, Schedule};
use tutorme_core::repository::{BookingQuery, BookingStore, ScheduleQuery, ScheduleStore, UserStore};
use tutorme_core::subscription::{Change, StreamEvent, Subscription};
use tutorme_core::Clock;
use tutorme_shared::UserId;

use crate::index::DiscoveryIndex;
use crate::projection::{DiscoverySchedule, TutorSummary};

/// Latest state of a live discovery view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum FeedState {
    /// Waiting for the first snapshot of both collections.
    Loading,
    Ready { schedules: Vec<DiscoverySchedule> },
    /// A listener failed; the view will not update again.
    Failed { message: String },
}

/// Live merged view of other tutors' schedules and all bookings.
/// Dropping the feed stops both listeners.
pub struct DiscoveryFeed {
    state: watch::Receiver<FeedState>,
    worker: JoinHandle<()>,
}

impl DiscoveryFeed {
    pub fn spawn(
        schedules: Arc<dyn ScheduleStore>,
        bookings: Arc<dyn BookingStore>,
        users: Arc<dyn UserStore>,
        clock: Arc<dyn Clock>,
        viewer: UserId,
        refresh: Duration,
    ) -> Self {
        let (tx, rx) = watch::channel(FeedState::Loading);
        let schedule_sub = schedules.watch_schedules(ScheduleQuery::ExcludingTutor(viewer.clone()));
        let booking_sub = bookings.watch_bookings(BookingQuery::All);

        let worker = tokio::spawn(run(FeedWorker {
            schedule_sub,
            booking_sub,
            users,
            clock,
            viewer,
            refresh,
            tx,
        }));
        Self { state: rx, worker }
    }

    pub fn subscribe(&self) -> watch::Receiver<FeedState> {
        self.state.clone()
    }

    pub fn current(&self) -> FeedState {
        self.state.borrow().clone()
    }

    pub fn dispose(&self) {
        self.worker.abort();
    }
}

impl Drop for DiscoveryFeed {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

struct FeedWorker {
    schedule_sub: Subscription<Schedule>,
    booking_sub: Subscription<Booking>,
    users: Arc<dyn UserStore>,
    clock: Arc<dyn Clock>,
    viewer: UserId,
    refresh: Duration,
    tx: watch::Sender<FeedState>,
}

enum Step {
    Changed,
    Idle,
    Stop(String),
}

fn apply<T>(
    index: &mut DiscoveryIndex,
    event: Option<StreamEvent<T>>,
    label: &str,
    reset: fn(&mut DiscoveryIndex, Vec<T>),
    apply_change: fn(&mut DiscoveryIndex, Change<T>),
) -> Step {
    match event {
        Some(StreamEvent::Snapshot { docs, revision }) => {
            debug!("Discovery {} snapshot at {} ({} docs)", label, revision, docs.len());
            reset(index, docs);
            Step::Changed
        }
        Some(StreamEvent::Changes { changes, .. }) => {
            if changes.is_empty() {
                return Step::Idle;
            }
            for change in changes {
                apply_change(index, change);
            }
            Step::Changed
        }
        Some(StreamEvent::Error(err)) => Step::Stop(format!("{} listener failed: {}", label, err)),
        None => Step::Stop(format!("{} listener closed", label)),
    }
}

async fn run(mut worker: FeedWorker) {
    let mut index = DiscoveryIndex::new();
    let mut tutors: HashMap<UserId, TutorSummary> = HashMap::new();
    let (mut have_schedules, mut have_bookings) = (false, false);

    let mut ticker = tokio::time::interval(worker.refresh);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately.
    ticker.tick().await;

    info!("Discovery feed started for {}", worker.viewer);
    loop {
        let step = tokio::select! {
            event = worker.schedule_sub.next() => {
                let step = apply(&mut index, event, "schedules", DiscoveryIndex::reset_schedules, DiscoveryIndex::apply_schedule);
                if matches!(step, Step::Changed) {
                    have_schedules = true;
                }
                step
            }
            event = worker.booking_sub.next() => {
                let step = apply(&mut index, event, "bookings", DiscoveryIndex::reset_bookings, DiscoveryIndex::apply_booking);
                if matches!(step, Step::Changed) {
                    have_bookings = true;
                }
                step
            }
            _ = ticker.tick() => {
                // Slots that have started drift out; profiles may have changed.
                tutors.clear();
                Step::Changed
            }
        };

        match step {
            Step::Idle => continue,
            Step::Stop(message) => {
                error!("Discovery feed for {} stopped: {}", worker.viewer, message);
                let _ = worker.tx.send(FeedState::Failed { message });
                return;
            }
            Step::Changed => {}
        }
        if !(have_schedules && have_bookings) {
            continue;
        }

        let mut schedules = index.project(worker.clock.now());
        populate(&worker.users, &mut tutors, &mut schedules).await;
        if worker.tx.send(FeedState::Ready { schedules }).is_err() {
            debug!("Discovery feed for {} has no readers left", worker.viewer);
            return;
        }
    }
}

/// Attaches tutor summaries, fetching only tutors not already cached. A
/// failed lookup leaves `tutor` empty rather than failing the view.
pub(crate) async fn populate(
    users: &Arc<dyn UserStore>,
    cache: &mut HashMap<UserId, TutorSummary>,
    schedules: &mut [DiscoverySchedule],
) {
    let mut missing: Vec<UserId> = schedules
        .iter()
        .map(|s| s.tutor_id.clone())
        .filter(|id| !cache.contains_key(id))
        .collect();
    missing.sort();
    missing.dedup();

    if !missing.is_empty() {
        match users.get_users(&missing).await {
            Ok(found) => {
                for user in &found {
                    cache.insert(user.id.clone(), TutorSummary::from(user));
                }
            }
            Err(err) => warn!("Could not load {} tutor profiles: {}", missing.len(), err),
        }
    }

    for schedule in schedules.iter_mut() {
        schedule.tutor = cache.get(&schedule.tutor_id).cloned();
    }
}
