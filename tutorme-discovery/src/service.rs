use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tutorme_core::repository::{BookingQuery, BookingStore, ScheduleQuery, ScheduleStore, UserStore};
use tutorme_core::{Clock, CoreResult};
use tutorme_shared::UserId;
use tutorme_store::BusinessRules;

use crate::feed::{populate, DiscoveryFeed};
use crate::projection::{project, DiscoverySchedule};

pub struct DiscoveryService {
    schedules: Arc<dyn ScheduleStore>,
    bookings: Arc<dyn BookingStore>,
    users: Arc<dyn UserStore>,
    clock: Arc<dyn Clock>,
    refresh: Duration,
}

impl DiscoveryService {
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
            refresh: Duration::from_secs(rules.discovery_refresh_seconds.max(1)),
        }
    }

    /// One-shot projection for `viewer` from a single read of each collection.
    pub async fn snapshot(&self, viewer: &UserId) -> CoreResult<Vec<DiscoverySchedule>> {
        let schedules = self.schedules.query_schedules(&ScheduleQuery::ExcludingTutor(viewer.clone())).await?;
        let bookings = self.bookings.query_bookings(&BookingQuery::All).await?;

        let mut projected = project(&schedules.docs, &bookings.docs, self.clock.now());
        populate(&self.users, &mut HashMap::new(), &mut projected).await;
        Ok(projected)
    }

    pub fn feed(&self, viewer: &UserId) -> DiscoveryFeed {
        DiscoveryFeed::spawn(
            self.schedules.clone(),
            self.bookings.clone(),
            self.users.clone(),
            self.clock.clone(),
            viewer.clone(),
            self.refresh,
        )
    }
}
