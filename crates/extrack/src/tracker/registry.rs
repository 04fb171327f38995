//! Single-active-job-per-owner registry.

use std::sync::Arc;
use std::time::Duration;

use crate::error::StoreError;
use crate::store::{keys, JobStore};

/// Claim attempts before giving up on a pointer that keeps vanishing.
const CLAIM_ATTEMPTS: usize = 3;

/// Maps an owner to the id of its one in-flight job.
///
/// The pointer is claimed atomically, so two concurrent creates for the same
/// owner cannot both succeed.
#[derive(Clone)]
pub struct ActiveJobRegistry {
    store: Arc<dyn JobStore>,
    ttl: Duration,
}

impl ActiveJobRegistry {
    pub fn new(store: Arc<dyn JobStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Records `job_id` as the owner's active job unless one already exists.
    ///
    /// Returns `Ok(None)` when the claim was won, or the id of the job that
    /// already holds it.
    pub async fn claim(&self, owner_id: u64, job_id: &str) -> Result<Option<String>, StoreError> {
        let key = keys::active_job(owner_id);
        for _ in 0..CLAIM_ATTEMPTS {
            if self.store.set_if_absent(&key, job_id, self.ttl).await? {
                return Ok(None);
            }
            // The holder can expire or be released between the two calls.
            if let Some(holder) = self.store.get(&key).await? {
                return Ok(Some(holder));
            }
            log::debug!(
                "Active job pointer for owner {} vanished, retrying claim",
                owner_id
            );
        }

        Err(StoreError::Backend(format!(
            "active job pointer for owner {} changed {} times during claim",
            owner_id, CLAIM_ATTEMPTS
        )))
    }

    pub async fn get(&self, owner_id: u64) -> Result<Option<String>, StoreError> {
        self.store.get(&keys::active_job(owner_id)).await
    }

    /// Removes the pointer only if it still names `job_id`.
    pub async fn release(&self, owner_id: u64, job_id: &str) -> Result<bool, StoreError> {
        let released = self
            .store
            .delete_if_eq(&keys::active_job(owner_id), job_id)
            .await?;
        if released {
            log::debug!("Released active job {} for owner {}", job_id, owner_id);
        }
        Ok(released)
    }

    /// Removes the pointer whatever it holds.
    pub async fn clear(&self, owner_id: u64) -> Result<(), StoreError> {
        self.store.delete(&keys::active_job(owner_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registry() -> ActiveJobRegistry {
        ActiveJobRegistry::new(Arc::new(MemoryStore::new()), Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_claim_then_conflict() {
        let registry = registry();
        assert_eq!(registry.claim(1, "a").await.unwrap(), None);
        assert_eq!(registry.claim(1, "b").await.unwrap().as_deref(), Some("a"));
        assert_eq!(registry.claim(2, "c").await.unwrap(), None);
        assert_eq!(registry.get(1).await.unwrap().as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_release_checks_holder() {
        let registry = registry();
        registry.claim(1, "a").await.unwrap();

        assert!(!registry.release(1, "other").await.unwrap());
        assert_eq!(registry.get(1).await.unwrap().as_deref(), Some("a"));

        assert!(registry.release(1, "a").await.unwrap());
        assert!(registry.get(1).await.unwrap().is_none());
        assert!(!registry.release(1, "a").await.unwrap());
    }

    #[tokio::test]
    async fn test_clear_is_unconditional() {
        let registry = registry();
        registry.claim(5, "x").await.unwrap();
        registry.clear(5).await.unwrap();
        assert!(registry.get(5).await.unwrap().is_none());
        registry.clear(5).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_pointer_expires() {
        let registry = registry();
        registry.claim(1, "a").await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(registry.get(1).await.unwrap().is_none());
        assert_eq!(registry.claim(1, "b").await.unwrap(), None);
    }

    /// Reports the pointer as held for the first `losses` claims, although
    /// nothing is stored; the holder has already gone when it is read.
    struct VanishingHolderStore {
        inner: MemoryStore,
        losses: AtomicUsize,
    }

    #[async_trait]
    impl JobStore for VanishingHolderStore {
        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
            self.inner.set(key, value, ttl).await
        }

        async fn set_if_absent(
            &self,
            key: &str,
            value: &str,
            ttl: Duration,
        ) -> Result<bool, StoreError> {
            let lost = self
                .losses
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if lost {
                return Ok(false);
            }
            self.inner.set_if_absent(key, value, ttl).await
        }

        async fn delete(&self, key: &str) -> Result<(), StoreError> {
            self.inner.delete(key).await
        }

        async fn delete_if_eq(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
            self.inner.delete_if_eq(key, expected).await
        }
    }

    fn vanishing(losses: usize) -> ActiveJobRegistry {
        let store = VanishingHolderStore {
            inner: MemoryStore::new(),
            losses: AtomicUsize::new(losses),
        };
        ActiveJobRegistry::new(Arc::new(store), Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_claim_retries_when_holder_vanishes() {
        let registry = vanishing(1);
        assert_eq!(registry.claim(1, "b").await.unwrap(), None);
        assert_eq!(registry.get(1).await.unwrap().as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_claim_never_reports_empty_holder() {
        let registry = vanishing(CLAIM_ATTEMPTS);
        let result = registry.claim(1, "b").await;
        assert!(matches!(result, Err(StoreError::Backend(_))));
        assert!(registry.get(1).await.unwrap().is_none());
    }
}
