use std::sync::Arc;

use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};
use tracing::debug;

use crate::TodoSnapshot;

/// Push-updated view of the whole todo table.
///
/// Created by [`crate::TodoStore::live_query`]. Revisions only move forward.
/// Every snapshot is complete, so [`LiveQuery::changed`] hands back the
/// newest one already queued and drops the ones in between, including after
/// the subscriber lagged past the channel capacity.
pub struct LiveQuery {
    current: Arc<TodoSnapshot>,
    receiver: broadcast::Receiver<Arc<TodoSnapshot>>,
}

impl LiveQuery {
    pub(crate) fn new(
        current: Arc<TodoSnapshot>,
        receiver: broadcast::Receiver<Arc<TodoSnapshot>>,
    ) -> Self {
        Self { current, receiver }
    }

    pub fn current(&self) -> Arc<TodoSnapshot> {
        Arc::clone(&self.current)
    }

    pub fn revision(&self) -> u64 {
        self.current.revision
    }

    /// Waits for the next committed change and returns the newest snapshot
    /// queued at that point. Returns `None` once every handle to the store has
    /// been dropped.
    pub async fn changed(&mut self) -> Option<Arc<TodoSnapshot>> {
        let mut newest = loop {
            match self.receiver.recv().await {
                Ok(snapshot) if snapshot.revision <= self.current.revision => continue,
                Ok(snapshot) => break snapshot,
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "live query lagged behind; waiting for newer snapshot");
                }
                Err(RecvError::Closed) => return None,
            }
        };

        loop {
            match self.receiver.try_recv() {
                Ok(snapshot) if snapshot.revision > newest.revision => newest = snapshot,
                Ok(_) => {}
                Err(TryRecvError::Lagged(skipped)) => {
                    debug!(skipped, "live query lagged behind while draining");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }

        self.current = Arc::clone(&newest);
        Some(newest)
    }
}
