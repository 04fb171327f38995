//! Cooperative cancellation for worker loops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::pipeline::PipelineError;
use crate::store::{keys, JobStore};

/// Polls a job's cancellation flag.
///
/// Once the flag has been observed the probe latches, so every clone (one
/// per chunk task) stops without going back to the store.
#[derive(Clone)]
pub struct CancellationProbe {
    store: Arc<dyn JobStore>,
    job_id: Arc<str>,
    tripped: Arc<AtomicBool>,
}

impl CancellationProbe {
    pub fn new(store: Arc<dyn JobStore>, job_id: &str) -> Self {
        Self {
            store,
            job_id: Arc::from(job_id),
            tripped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Returns true once the job has been cancelled. Store errors count as
    /// not cancelled.
    pub async fn is_cancelled(&self) -> bool {
        if self.tripped.load(Ordering::Acquire) {
            return true;
        }

        match self.store.get(&keys::cancel_flag(&self.job_id)).await {
            Ok(Some(_)) => {
                log::info!("Job {} observed cancellation", self.job_id);
                self.tripped.store(true, Ordering::Release);
                true
            }
            Ok(None) => false,
            Err(e) => {
                log::warn!(
                    "Failed to read cancellation flag for job {}: {}",
                    self.job_id,
                    e
                );
                false
            }
        }
    }

    /// Boundary check for worker loops.
    pub async fn check(&self) -> Result<(), PipelineError> {
        if self.is_cancelled().await {
            return Err(PipelineError::Cancelled {
                job_id: self.job_id.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::time::Duration;

    #[tokio::test]
    async fn test_probe_reads_flag() {
        let store: Arc<dyn JobStore> = Arc::new(MemoryStore::new());
        let probe = CancellationProbe::new(Arc::clone(&store), "7_100");

        assert!(!probe.is_cancelled().await);
        assert!(probe.check().await.is_ok());

        store
            .set(&keys::cancel_flag("7_100"), "1", Duration::from_secs(60))
            .await
            .unwrap();

        assert!(probe.is_cancelled().await);
        assert!(matches!(
            probe.check().await,
            Err(PipelineError::Cancelled { ref job_id }) if job_id == "7_100"
        ));
    }

    #[tokio::test]
    async fn test_probe_latches_across_clones() {
        let store: Arc<dyn JobStore> = Arc::new(MemoryStore::new());
        let probe = CancellationProbe::new(Arc::clone(&store), "job");
        let sibling = probe.clone();

        store
            .set(&keys::cancel_flag("job"), "1", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(probe.is_cancelled().await);

        // Gone from the store, but the latch holds.
        store.delete(&keys::cancel_flag("job")).await.unwrap();
        assert!(sibling.is_cancelled().await);
    }
}
