//! Job update broadcaster for real-time job status streaming.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::tracker::JobRecord;

/// Broadcasts every persisted job record change.
///
/// Delivery is best-effort: a lagging receiver loses the oldest updates and
/// should fall back to polling the tracker.
#[derive(Clone)]
pub struct JobUpdateBroadcaster {
    sender: Arc<broadcast::Sender<JobRecord>>,
}

impl JobUpdateBroadcaster {
    /// Creates a new broadcaster with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Sends a record snapshot to all subscribers.
    pub fn send(&self, record: JobRecord) {
        // No active receivers is fine
        let _ = self.sender.send(record);
    }

    /// Creates a new subscriber for record updates.
    pub fn subscribe(&self) -> broadcast::Receiver<JobRecord> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for JobUpdateBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}
