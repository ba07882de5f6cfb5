pub mod feed;
pub mod index;
pub mod projection;
pub mod service;
pub mod tutors;

pub use feed::{DiscoveryFeed, FeedState};
pub use index::DiscoveryIndex;
pub use projection::{DiscoverySchedule, DiscoverySlot, TutorSummary};
pub use service::DiscoveryService;
pub use tutors::{TutorDirectory, TutorStats};
