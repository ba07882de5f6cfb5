use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::repository::{Revision, StoreError};

#[derive(Debug, Clone, PartialEq)]
pub enum Change<T> {
    Added(T),
    Modified(T),
    Removed(T),
}

impl<T> Change<T> {
    pub fn doc(&self) -> &T {
        match self {
            Change::Added(doc) | Change::Modified(doc) | Change::Removed(doc) => doc,
        }
    }
}

/// What a live query delivers. The first event is always a `Snapshot`;
/// a later `Snapshot` means the listener fell behind and resynced, and
/// replaces everything seen so far.
#[derive(Debug, Clone)]
pub enum StreamEvent<T> {
    Snapshot { docs: Vec<T>, revision: Revision },
    Changes { changes: Vec<Change<T>>, revision: Revision },
    Error(StoreError),
}

/// Handle to a live query. Dropping it or calling [`Subscription::dispose`]
/// stops the listener task.
pub struct Subscription<T> {
    events: mpsc::Receiver<StreamEvent<T>>,
    listener: JoinHandle<()>,
}

impl<T> Subscription<T> {
    pub fn new(events: mpsc::Receiver<StreamEvent<T>>, listener: JoinHandle<()>) -> Self {
        Self { events, listener }
    }

    /// Waits for the next event. `None` once the listener has stopped.
    pub async fn next(&mut self) -> Option<StreamEvent<T>> {
        self.events.recv().await
    }

    pub fn dispose(&mut self) {
        self.listener.abort();
        self.events.close();
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}
