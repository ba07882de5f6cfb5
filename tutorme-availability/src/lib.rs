pub mod pricing;
pub mod request;
pub mod service;
pub mod view;

pub use pricing::SlotPricer;
pub use request::SlotRequest;
pub use service::AvailabilityService;
pub use view::TutorSlot;
