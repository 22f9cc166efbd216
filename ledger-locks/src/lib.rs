#![deny(clippy::print_stdout, clippy::print_stderr)]

//! Best-effort distributed locking with TTL and fencing tokens.
//!
//! The lock store is an optimization, not a correctness mechanism: the
//! database (row locks, unique constraints) is the ultimate arbiter. If a
//! key is contended past its acquire timeout, [`LockManager::with_locks`]
//! still runs the closure rather than failing the caller.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::sleep;
use uuid::Uuid;

pub type LockResult<T> = Result<T, LockError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LockError {
    #[error("lock store unavailable: {0}")]
    StoreUnavailable(String),
}

#[derive(Debug, Clone)]
struct LockEntry {
    token: String,
    expires_at: Instant,
}

/// In-memory best-effort lock store. A production deployment would back
/// this with a shared store (e.g. Redis `SET NX PX` + a Lua unlock script);
/// the fencing-token contract is identical either way.
#[derive(Default)]
pub struct LockStore {
    entries: Mutex<HashMap<String, LockEntry>>,
}

impl LockStore {
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Attempts to acquire `key` for `ttl`. Returns a fencing token on
    /// success. Polls briefly if the key is currently held by a live
    /// lease; gives up (without erroring) once `acquire_timeout` elapses,
    /// since acquisition here is best-effort.
    async fn try_acquire(
        &self,
        key: &str,
        ttl: Duration,
        acquire_timeout: Duration,
    ) -> Option<String> {
        let deadline = Instant::now() + acquire_timeout;
        loop {
            {
                let mut guard = self.entries.lock().await;
                let now = Instant::now();
                let held = guard.get(key).is_some_and(|entry| entry.expires_at > now);
                if !held {
                    let token = Uuid::new_v4().to_string();
                    guard.insert(
                        key.to_string(),
                        LockEntry {
                            token: token.clone(),
                            expires_at: now + ttl,
                        },
                    );
                    return Some(token);
                }
            }
            if Instant::now() >= deadline {
                return None;
            }
            sleep(Duration::from_millis(10)).await;
        }
    }

    /// Releases `key` only if `token` still matches the current holder, so
    /// a lease that already expired and was re-acquired by someone else is
    /// never torn down by a stale caller.
    async fn release(&self, key: &str, token: &str) {
        let mut guard = self.entries.lock().await;
        if let Some(entry) = guard.get(key)
            && entry.token == token
        {
            guard.remove(key);
        }
    }
}

/// `withLocks(keys, ttl, fn)` from the spec: acquires every key best-effort,
/// runs `f`, and releases unconditionally on every exit path including
/// error, regardless of whether every key was actually acquired.
pub struct LockManager {
    store: Arc<LockStore>,
    acquire_timeout: Duration,
}

impl LockManager {
    #[must_use]
    pub fn new(store: Arc<LockStore>, acquire_timeout: Duration) -> Self {
        Self {
            store,
            acquire_timeout,
        }
    }

    #[must_use]
    pub fn with_default_timeout(store: Arc<LockStore>) -> Self {
        Self::new(store, Duration::from_secs(5))
    }

    pub async fn with_locks<Keys, F, Fut, T, E>(&self, keys: Keys, ttl: Duration, f: F) -> Result<T, E>
    where
        Keys: IntoIterator<Item = String>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut held = Vec::new();
        for key in keys {
            match self.store.try_acquire(&key, ttl, self.acquire_timeout).await {
                Some(token) => held.push((key, Some(token))),
                None => {
                    tracing::warn!(lock_key = %key, "lock contended past acquire timeout, proceeding best-effort");
                    held.push((key, None));
                }
            }
        }

        let result = f().await;

        for (key, token) in held {
            if let Some(token) = token {
                self.store.release(&key, &token).await;
            }
        }

        result
    }
}

/// Canonical lock-key builders, matching the spec's naming convention.
pub mod keys {
    #[must_use]
    pub fn stock(company_id: &str, location_id: &str, item_id: &str) -> String {
        format!("lock:stock:{company_id}:{location_id}:{item_id}")
    }

    #[must_use]
    pub fn stock_default_alias(company_id: &str, location_id: &str) -> String {
        format!("lock:stock:{company_id}:{location_id}:default")
    }

    #[must_use]
    pub fn journal_entry(company_id: &str, entry_id: &str) -> String {
        format!("lock:journal-entry:{company_id}:{entry_id}")
    }

    #[must_use]
    pub fn period_close(company_id: &str) -> String {
        format!("lock:period-close:{company_id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn runs_closure_and_releases_lock_on_success() {
        let manager = LockManager::with_default_timeout(LockStore::shared());
        let result: Result<i32, ()> = manager
            .with_locks(vec!["lock:a".to_string()], Duration::from_secs(30), || async {
                Ok(42)
            })
            .await;
        assert_eq!(result, Ok(42));

        // The lock was released: a second acquire should succeed immediately.
        let second: Result<i32, ()> = manager
            .with_locks(vec!["lock:a".to_string()], Duration::from_secs(30), || async {
                Ok(7)
            })
            .await;
        assert_eq!(second, Ok(7));
    }

    #[tokio::test]
    async fn releases_lock_even_when_closure_errors() {
        let manager = LockManager::with_default_timeout(LockStore::shared());
        let result: Result<(), &str> = manager
            .with_locks(vec!["lock:b".to_string()], Duration::from_secs(30), || async {
                Err("boom")
            })
            .await;
        assert_eq!(result, Err("boom"));

        let second: Result<i32, ()> = manager
            .with_locks(vec!["lock:b".to_string()], Duration::from_secs(30), || async {
                Ok(1)
            })
            .await;
        assert_eq!(second, Ok(1));
    }

    #[tokio::test]
    async fn contended_lock_still_proceeds_best_effort() {
        let store = LockStore::shared();
        let manager = LockManager::new(store.clone(), Duration::from_millis(20));
        let token = store
            .try_acquire("lock:c", Duration::from_secs(30), Duration::from_millis(10))
            .await
            .expect("initial acquire");

        let result: Result<i32, ()> = manager
            .with_locks(vec!["lock:c".to_string()], Duration::from_secs(30), || async {
                Ok(99)
            })
            .await;
        assert_eq!(result, Ok(99));

        store.release("lock:c", &token).await;
    }

    #[test]
    fn key_builders_match_spec_format() {
        assert_eq!(keys::stock("co-1", "loc-1", "item-1"), "lock:stock:co-1:loc-1:item-1");
        assert_eq!(
            keys::stock_default_alias("co-1", "loc-1"),
            "lock:stock:co-1:loc-1:default"
        );
    }
}
