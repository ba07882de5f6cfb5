use std::sync::Arc;
use tutorme_availability::AvailabilityService;
use tutorme_booking::BookingService;
use tutorme_core::Clock;
use tutorme_discovery::{DiscoveryService, TutorDirectory};
use tutorme_store::{BusinessRules, MemoryStore};

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub availability: Arc<AvailabilityService>,
    pub bookings: Arc<BookingService>,
    pub discovery: Arc<DiscoveryService>,
    pub tutors: Arc<TutorDirectory>,
    pub clock: Arc<dyn Clock>,
    pub auth: AuthConfig,
    pub business_rules: BusinessRules,
}

impl AppState {
    /// Wires every service onto one store handle.
    pub fn new(store: MemoryStore, clock: Arc<dyn Clock>, auth: AuthConfig, business_rules: BusinessRules) -> Self {
        let store = Arc::new(store);
        Self {
            availability: Arc::new(AvailabilityService::new(
                store.clone(),
                store.clone(),
                store.clone(),
                clock.clone(),
                &business_rules,
            )),
            bookings: Arc::new(BookingService::new(
                store.clone(),
                store.clone(),
                store.clone(),
                clock.clone(),
                &business_rules,
            )),
            discovery: Arc::new(DiscoveryService::new(
                store.clone(),
                store.clone(),
                store.clone(),
                clock.clone(),
                &business_rules,
            )),
            tutors: Arc::new(TutorDirectory::new(store)),
            clock,
            auth,
            business_rules,
        }
    }
}
