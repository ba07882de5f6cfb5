use tokio::sync::broadcast;
use tracing::debug;
use tutorme_core::models::{Booking, Schedule, User};
use tutorme_core::repository::Revision;
use tutorme_core::subscription::Change;

/// One committed write. `before`/`after` are the document on either side
/// of the commit; `None` means it did not exist.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    Schedule {
        revision: Revision,
        before: Option<Schedule>,
        after: Option<Schedule>,
    },
    Booking {
        revision: Revision,
        before: Option<Booking>,
        after: Option<Booking>,
    },
    User {
        revision: Revision,
        before: Option<User>,
        after: Option<User>,
    },
    Disconnected(String),
}

impl StoreEvent {
    pub fn revision(&self) -> Option<Revision> {
        match self {
            StoreEvent::Schedule { revision, .. }
            | StoreEvent::Booking { revision, .. }
            | StoreEvent::User { revision, .. } => Some(*revision),
            StoreEvent::Disconnected(_) => None,
        }
    }
}

/// In-process change log every live query listens on. Events are published
/// while the writer still holds the state lock, so receivers see them in
/// commit order.
#[derive(Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<StoreEvent>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: StoreEvent) {
        let revision = event.revision();
        match self.sender.send(event) {
            Ok(listeners) => debug!("Published change {:?} to {} listeners", revision, listeners),
            Err(_) => debug!("Published change {:?} with no listeners", revision),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.sender.subscribe()
    }
}

/// Translates a before/after pair into the change a query filtered by
/// `matches` should observe. A document moving out of the query reads as a
/// removal, one moving in as an addition.
pub fn classify<T, F>(before: Option<&T>, after: Option<&T>, matches: F) -> Option<Change<T>>
where
    T: Clone,
    F: Fn(&T) -> bool,
{
    let before = before.filter(|doc| matches(doc));
    let after = after.filter(|doc| matches(doc));
    match (before, after) {
        (None, Some(doc)) => Some(Change::Added(doc.clone())),
        (Some(_), Some(doc)) => Some(Change::Modified(doc.clone())),
        (Some(doc), None) => Some(Change::Removed(doc.clone())),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_respects_query() {
        let even = |n: &i32| n % 2 == 0;
        assert_eq!(classify(None, Some(&2), even), Some(Change::Added(2)));
        assert_eq!(classify(Some(&2), Some(&4), even), Some(Change::Modified(4)));
        assert_eq!(classify(Some(&2), None, even), Some(Change::Removed(2)));
        assert_eq!(classify(Some(&2), Some(&3), even), Some(Change::Removed(2)));
        assert_eq!(classify(Some(&1), Some(&2), even), Some(Change::Added(2)));
        assert_eq!(classify(Some(&1), Some(&3), even), None);
    }

    #[tokio::test]
    async fn test_feed_delivers_in_publish_order() {
        let feed = ChangeFeed::new(8);
        let mut rx = feed.subscribe();
        feed.publish(StoreEvent::Disconnected("a".into()));
        feed.publish(StoreEvent::Disconnected("b".into()));

        assert!(matches!(rx.recv().await, Ok(StoreEvent::Disconnected(ref r)) if r == "a"));
        assert!(matches!(rx.recv().await, Ok(StoreEvent::Disconnected(ref r)) if r == "b"));
    }
}
