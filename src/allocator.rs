//! Provider pool allocator.
//!
//! Picks a provider and device for each role a request needs, honoring the
//! per-device concurrency limits declared in the [`ProviderRegistry`].
//!
//! # Algorithm
//!
//! Under the lock `"{role}_model_index"`:
//!
//! 1. Walk candidate providers in configured order, and each provider's
//!    devices in order.
//! 2. For a limited device, count the holders of its lease key (under the
//!    key's own lock). Skip the device if the count has reached the limit.
//!    Unlimited devices are never counted.
//! 3. Add this requester to the first acceptable key (again under the key
//!    lock) and return the handle.
//!
//! Holding the role lock across the count and the increment makes the
//! check-then-act atomic with respect to other allocators. If nothing has
//! capacity the call fails with [`SummaryError::NoProviderAvailable`];
//! retrying is left to the caller.
//!
//! Leases are keyed per requester identity, so releasing is idempotent and
//! [`ProviderAllocator::shutdown`] drops everything a requester holds.

use std::sync::Arc;

use summary_harness_core::models::{lease_key, ProviderSpec, Role};
use summary_harness_core::registry::ProviderRegistry;
use summary_harness_core::store::LeaseStore;
use tracing::{debug, info, warn};

use crate::error::SummaryError;
use crate::lock::{run_exclusive, NamedMutex};

/// A provider/device slot held by this requester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderHandle {
    pub role: Role,
    pub name: String,
    pub device: String,
}

impl ProviderHandle {
    pub fn key(&self) -> String {
        lease_key(self.role, &self.name, &self.device)
    }
}

pub struct ProviderAllocator {
    registry: Arc<ProviderRegistry>,
    leases: Arc<dyn LeaseStore>,
    mutex: Arc<dyn NamedMutex>,
    requester: String,
    held: tokio::sync::Mutex<Vec<ProviderHandle>>,
}

impl ProviderAllocator {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        leases: Arc<dyn LeaseStore>,
        mutex: Arc<dyn NamedMutex>,
        requester: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            leases,
            mutex,
            requester: requester.into(),
            held: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn requester(&self) -> &str {
        &self.requester
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Lease a provider for `role`.
    ///
    /// `provider` restricts the search to one name. A name missing from the
    /// registry is treated as a single unlimited device.
    pub async fn acquire(
        &self,
        role: Role,
        provider: Option<&str>,
    ) -> Result<ProviderHandle, SummaryError> {
        let candidates: Vec<ProviderSpec> = match provider {
            Some(name) => vec![self
                .registry
                .find(role, name)
                .cloned()
                .unwrap_or_else(|| ProviderSpec::unlimited(name))],
            None => self.registry.candidates(role).to_vec(),
        };

        let index_lock = format!("{}_model_index", role);
        let selected = run_exclusive(self.mutex.as_ref(), &index_lock, || async move {
            for spec in &candidates {
                for limit in &spec.device_limits {
                    let device = self.registry.device_name(limit.index);
                    let key = lease_key(role, &spec.name, &device);

                    if limit.is_limited() {
                        let count = self.holder_count(&key).await?;
                        if count >= limit.max_concurrent as usize {
                            debug!(
                                role = %role,
                                provider = %spec.name,
                                device = %device,
                                count,
                                limit = limit.max_concurrent,
                                "device at capacity"
                            );
                            continue;
                        }
                    }

                    self.add_holder(&key).await?;
                    return Ok(Some(ProviderHandle {
                        role,
                        name: spec.name.clone(),
                        device,
                    }));
                }
            }
            Ok::<_, SummaryError>(None)
        })
        .await?;

        match selected {
            Some(handle) => {
                info!(
                    role = %role,
                    provider = %handle.name,
                    device = %handle.device,
                    requester = %self.requester,
                    "provider leased"
                );
                self.held.lock().await.push(handle.clone());
                Ok(handle)
            }
            None => {
                warn!(role = %role, "no provider has free capacity");
                Err(SummaryError::NoProviderAvailable { role })
            }
        }
    }

    /// Release one lease. Releasing a handle twice is a no-op.
    pub async fn release(&self, handle: &ProviderHandle) -> Result<(), SummaryError> {
        let mut held = self.held.lock().await;
        if let Some(position) = held.iter().position(|h| h == handle) {
            held.remove(position);
        }
        if held.iter().any(|h| h == handle) {
            return Ok(());
        }
        drop(held);

        let key = handle.key();
        remove_holder(self.leases.as_ref(), self.mutex.as_ref(), &key, &self.requester).await?;
        debug!(key = %key, requester = %self.requester, "lease released");
        Ok(())
    }

    /// Release every lease this requester holds.
    ///
    /// After the tracked handles, the store is swept for this requester's
    /// identity, which catches a lease written by an `acquire` that was
    /// cancelled before it could record the handle. Keeps going past
    /// individual failures and returns the first one.
    pub async fn shutdown(&self) -> Result<(), SummaryError> {
        let handles: Vec<ProviderHandle> = self.held.lock().await.drain(..).collect();
        let mut keys: Vec<String> = handles.iter().map(ProviderHandle::key).collect();
        keys.sort();
        keys.dedup();

        let mut first_error = None;
        for key in keys {
            if let Err(e) =
                remove_holder(self.leases.as_ref(), self.mutex.as_ref(), &key, &self.requester)
                    .await
            {
                warn!(key = %key, error = %e, "failed to release lease");
                first_error.get_or_insert(e);
            }
        }

        match release_requester(self.leases.as_ref(), self.mutex.as_ref(), &self.requester).await
        {
            Ok(orphaned) if !orphaned.is_empty() => {
                warn!(requester = %self.requester, keys = ?orphaned, "released untracked leases");
            }
            Ok(_) => {}
            Err(e) => {
                warn!(requester = %self.requester, error = %e, "failed to sweep leases");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Handles currently held, in acquisition order.
    pub async fn held(&self) -> Vec<ProviderHandle> {
        self.held.lock().await.clone()
    }

    async fn holder_count(&self, key: &str) -> Result<usize, SummaryError> {
        run_exclusive(self.mutex.as_ref(), key, || async move {
            Ok::<_, SummaryError>(self.leases.holders(key).await?.len())
        })
        .await
    }

    async fn add_holder(&self, key: &str) -> Result<(), SummaryError> {
        run_exclusive(self.mutex.as_ref(), key, || async move {
            let mut holders = self.leases.holders(key).await?;
            if holders.insert(self.requester.clone()) {
                self.leases.set_holders(key, &holders).await?;
            }
            Ok::<_, SummaryError>(())
        })
        .await
    }
}

async fn remove_holder(
    leases: &dyn LeaseStore,
    mutex: &dyn NamedMutex,
    key: &str,
    requester: &str,
) -> Result<bool, SummaryError> {
    run_exclusive(mutex, key, || async move {
        let mut holders = leases.holders(key).await?;
        let removed = holders.remove(requester);
        if removed {
            leases.set_holders(key, &holders).await?;
        }
        Ok::<_, SummaryError>(removed)
    })
    .await
}

/// Remove `requester` from every lease key, e.g. after it crashed.
///
/// Returns the keys it was removed from.
pub async fn release_requester(
    leases: &dyn LeaseStore,
    mutex: &dyn NamedMutex,
    requester: &str,
) -> Result<Vec<String>, SummaryError> {
    let mut released = Vec::new();
    for (key, holders) in leases.entries().await? {
        if holders.contains(requester) && remove_holder(leases, mutex, &key, requester).await? {
            released.push(key);
        }
    }
    Ok(released)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::error::LockError;
    use crate::lock::{LocalMutex, LockToken};
    use summary_harness_core::models::DeviceLimit;
    use summary_harness_core::store::memory::InMemoryLeaseStore;

    fn registry() -> Arc<ProviderRegistry> {
        let mut registry = ProviderRegistry::new("cuda");
        registry
            .push(
                Role::Summarizer,
                ProviderSpec {
                    name: "a".into(),
                    device_limits: vec![
                        DeviceLimit {
                            index: 0,
                            max_concurrent: 1,
                        },
                        DeviceLimit {
                            index: 1,
                            max_concurrent: 1,
                        },
                    ],
                },
            )
            .push(Role::Summarizer, ProviderSpec::unlimited("b"));
        Arc::new(registry)
    }

    /// Local mutex whose release takes a while, like a database round trip.
    struct SlowRelease {
        inner: LocalMutex,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl NamedMutex for SlowRelease {
        async fn acquire(&self, name: &str) -> Result<LockToken, LockError> {
            self.inner.acquire(name).await
        }

        async fn release(&self, token: LockToken) -> Result<(), LockError> {
            tokio::time::sleep(self.delay).await;
            self.inner.release(token).await
        }
    }

    fn allocator(
        requester: &str,
        leases: &Arc<InMemoryLeaseStore>,
        mutex: &Arc<LocalMutex>,
    ) -> ProviderAllocator {
        ProviderAllocator::new(registry(), leases.clone(), mutex.clone(), requester)
    }

    #[tokio::test]
    async fn test_fills_devices_in_order_then_falls_back() {
        let leases = Arc::new(InMemoryLeaseStore::new());
        let mutex = Arc::new(LocalMutex::default());

        let r1 = allocator("r1", &leases, &mutex);
        let r2 = allocator("r2", &leases, &mutex);
        let r3 = allocator("r3", &leases, &mutex);

        let h1 = r1.acquire(Role::Summarizer, None).await.unwrap();
        let h2 = r2.acquire(Role::Summarizer, None).await.unwrap();
        let h3 = r3.acquire(Role::Summarizer, None).await.unwrap();

        assert_eq!(h1.key(), "summarizer.a.cuda:0");
        assert_eq!(h2.key(), "summarizer.a.cuda:1");
        assert_eq!(h3.key(), "summarizer.b.cuda:0");
    }

    #[tokio::test]
    async fn test_release_frees_capacity_and_is_idempotent() {
        let leases = Arc::new(InMemoryLeaseStore::new());
        let mutex = Arc::new(LocalMutex::default());
        let r1 = allocator("r1", &leases, &mutex);
        let r2 = allocator("r2", &leases, &mutex);

        let handle = r1.acquire(Role::Summarizer, Some("a")).await.unwrap();
        r2.acquire(Role::Summarizer, Some("a")).await.unwrap();
        let err = allocator("r3", &leases, &mutex)
            .acquire(Role::Summarizer, Some("a"))
            .await
            .unwrap_err();
        assert!(matches!(err, SummaryError::NoProviderAvailable { .. }));

        r1.release(&handle).await.unwrap();
        r1.release(&handle).await.unwrap();
        assert!(leases.holders(&handle.key()).await.unwrap().is_empty());

        let again = allocator("r3", &leases, &mutex)
            .acquire(Role::Summarizer, Some("a"))
            .await
            .unwrap();
        assert_eq!(again.key(), handle.key());
    }

    #[tokio::test]
    async fn test_shutdown_releases_every_role() {
        let leases = Arc::new(InMemoryLeaseStore::new());
        let mutex = Arc::new(LocalMutex::default());
        let r1 = allocator("r1", &leases, &mutex);

        r1.acquire(Role::Summarizer, None).await.unwrap();
        r1.acquire(Role::Encoder, Some("minilm")).await.unwrap();
        assert_eq!(leases.entries().await.unwrap().len(), 2);
        assert_eq!(r1.held().await.len(), 2);

        r1.shutdown().await.unwrap();
        assert!(leases.entries().await.unwrap().is_empty());
        assert!(r1.held().await.is_empty());
        r1.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_release_requester_clears_crashed_identity() {
        let leases = Arc::new(InMemoryLeaseStore::new());
        let mutex = Arc::new(LocalMutex::default());
        let crashed = allocator("crashed", &leases, &mutex);
        let alive = allocator("alive", &leases, &mutex);

        crashed.acquire(Role::Summarizer, Some("b")).await.unwrap();
        alive.acquire(Role::Summarizer, Some("b")).await.unwrap();

        let released = release_requester(leases.as_ref(), mutex.as_ref(), "crashed")
            .await
            .unwrap();
        assert_eq!(released, vec!["summarizer.b.cuda:0".to_string()]);
        let holders = leases.holders("summarizer.b.cuda:0").await.unwrap();
        assert_eq!(holders.into_iter().collect::<Vec<_>>(), vec!["alive"]);
    }

    #[tokio::test]
    async fn test_shutdown_releases_lease_of_cancelled_acquire() {
        let leases = Arc::new(InMemoryLeaseStore::new());
        let mutex = Arc::new(SlowRelease {
            inner: LocalMutex::default(),
            delay: Duration::from_millis(50),
        });
        let r1 = ProviderAllocator::new(registry(), leases.clone(), mutex, "r1");

        // The holder is written at ~50ms; the lock releases after it keep
        // the call busy until ~150ms.
        let cancelled = tokio::time::timeout(
            Duration::from_millis(75),
            r1.acquire(Role::Summarizer, None),
        )
        .await;
        assert!(cancelled.is_err());
        assert!(r1.held().await.is_empty());
        assert_eq!(leases.entries().await.unwrap().len(), 1);

        r1.shutdown().await.unwrap();
        assert!(leases.entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_candidates() {
        let leases = Arc::new(InMemoryLeaseStore::new());
        let mutex = Arc::new(LocalMutex::default());
        let err = allocator("r1", &leases, &mutex)
            .acquire(Role::SentenceParser, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SummaryError::NoProviderAvailable {
                role: Role::SentenceParser
            }
        ));
    }
}
