//! Named mutual exclusion.
//!
//! Lease read-modify-write sequences run under a lock scoped either to a
//! role (`"{role}_model_index"`) or to one lease key. Two implementations:
//!
//! | Type | Scope |
//! |------|-------|
//! | [`LocalMutex`] | One process; tokio mutex per name |
//! | [`SqliteMutex`] | Every process sharing the database file |
//!
//! SQLite locks carry an expiry. A row left behind by a crashed holder is
//! taken over once it expires.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::SqlitePool;
use tokio::sync::OwnedMutexGuard;

use crate::error::LockError;

/// Proof of holding a named lock. Pass it back to [`NamedMutex::release`].
#[derive(Debug)]
pub struct LockToken {
    name: String,
    owner: String,
    _guard: Option<OwnedMutexGuard<()>>,
}

impl LockToken {
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
pub trait NamedMutex: Send + Sync {
    /// Block until `name` is free, then hold it.
    async fn acquire(&self, name: &str) -> Result<LockToken, LockError>;

    async fn release(&self, token: LockToken) -> Result<(), LockError>;
}

/// Run `f` while holding `name`.
///
/// The lock is released whether or not `f` succeeds. An error from `f`
/// takes precedence over a release error.
pub async fn run_exclusive<M, F, Fut, T, E>(mutex: &M, name: &str, f: F) -> Result<T, E>
where
    M: NamedMutex + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<LockError>,
{
    let token = mutex.acquire(name).await?;
    let result = f().await;
    let released = mutex.release(token).await;
    let value = result?;
    released?;
    Ok(value)
}

/// In-process named mutex.
pub struct LocalMutex {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    timeout: Duration,
}

impl LocalMutex {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            timeout,
        }
    }
}

impl Default for LocalMutex {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl NamedMutex for LocalMutex {
    async fn acquire(&self, name: &str) -> Result<LockToken, LockError> {
        let lock = {
            let mut locks = self.locks.lock().expect("lock map poisoned");
            locks.entry(name.to_string()).or_default().clone()
        };
        let guard = tokio::time::timeout(self.timeout, lock.lock_owned())
            .await
            .map_err(|_| LockError::Timeout {
                name: name.to_string(),
                waited: self.timeout,
            })?;
        Ok(LockToken {
            name: name.to_string(),
            owner: String::new(),
            _guard: Some(guard),
        })
    }

    async fn release(&self, token: LockToken) -> Result<(), LockError> {
        drop(token);
        Ok(())
    }
}

/// Cross-process named mutex stored in the `locks` table.
pub struct SqliteMutex {
    pool: SqlitePool,
    ttl: Duration,
    timeout: Duration,
    poll_interval: Duration,
}

impl SqliteMutex {
    pub fn new(pool: SqlitePool, timeout: Duration) -> Self {
        Self {
            pool,
            ttl: Duration::from_secs(60),
            timeout,
            poll_interval: Duration::from_millis(25),
        }
    }

    /// How long a lock row stays valid if its holder never releases it.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    async fn try_acquire(&self, name: &str, owner: &str) -> anyhow::Result<bool> {
        let now = chrono::Utc::now().timestamp_millis();
        sqlx::query("DELETE FROM locks WHERE name = ? AND expires_at < ?")
            .bind(name)
            .bind(now)
            .execute(&self.pool)
            .await?;

        let inserted = sqlx::query(
            "INSERT INTO locks (name, owner, expires_at) VALUES (?, ?, ?) ON CONFLICT(name) DO NOTHING",
        )
        .bind(name)
        .bind(owner)
        .bind(now + self.ttl.as_millis() as i64)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(inserted == 1)
    }
}

#[async_trait]
impl NamedMutex for SqliteMutex {
    async fn acquire(&self, name: &str) -> Result<LockToken, LockError> {
        let owner = uuid::Uuid::new_v4().to_string();
        let deadline = tokio::time::Instant::now() + self.timeout;

        loop {
            if self.try_acquire(name, &owner).await? {
                return Ok(LockToken {
                    name: name.to_string(),
                    owner,
                    _guard: None,
                });
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(LockError::Timeout {
                    name: name.to_string(),
                    waited: self.timeout,
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn release(&self, token: LockToken) -> Result<(), LockError> {
        sqlx::query("DELETE FROM locks WHERE name = ? AND owner = ?")
            .bind(&token.name)
            .bind(&token.owner)
            .execute(&self.pool)
            .await
            .map_err(anyhow::Error::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, migrate};
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn guarded_increment<M: NamedMutex + ?Sized>(
        mutex: &M,
        counter: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    ) {
        run_exclusive(mutex, "shared", || async move {
            let inside = counter.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(inside, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            counter.fetch_sub(1, Ordering::SeqCst);
            Ok::<_, LockError>(())
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_local_mutex_serializes() {
        let mutex = Arc::new(LocalMutex::default());
        let counter = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let (mutex, counter, peak) = (mutex.clone(), counter.clone(), peak.clone());
                tokio::spawn(async move { guarded_increment(mutex.as_ref(), counter, peak).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_local_mutex_times_out() {
        let mutex = LocalMutex::new(Duration::from_millis(20));
        let held = mutex.acquire("busy").await.unwrap();
        let err = mutex.acquire("busy").await.unwrap_err();
        assert!(matches!(err, LockError::Timeout { .. }));
        mutex.release(held).await.unwrap();
        assert!(mutex.acquire("busy").await.is_ok());
    }

    #[tokio::test]
    async fn test_sqlite_mutex_serializes_and_steals_expired() {
        let dir = tempfile::TempDir::new().unwrap();
        let pool = db::connect_path(&dir.path().join("locks.sqlite"))
            .await
            .unwrap();
        migrate::migrate(&pool).await.unwrap();

        let mutex = SqliteMutex::new(pool.clone(), Duration::from_millis(100));
        let token = mutex.acquire("role_model_index").await.unwrap();
        assert_eq!(token.name(), "role_model_index");
        assert!(matches!(
            mutex.acquire("role_model_index").await,
            Err(LockError::Timeout { .. })
        ));
        mutex.release(token).await.unwrap();

        // A holder that never releases is overtaken after the ttl.
        let short = SqliteMutex::new(pool, Duration::from_secs(2)).with_ttl(Duration::from_millis(50));
        let _abandoned = short.acquire("crashed").await.unwrap();
        let taken = short.acquire("crashed").await.unwrap();
        short.release(taken).await.unwrap();
    }
}
