//! Per-user lock registry.
//!
//! Serializes all pipeline runs for one user so that two updates from the
//! same user (double tap on a pay button, two `/tip` in a row) never run
//! their handlers concurrently. Keys are process-local.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

/// Canonical lock key: the acting user's Telegram id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockKey(String);

impl LockKey {
    pub fn user(telegram_id: u64) -> Self {
        Self(format!("user:{}", telegram_id))
    }

    /// Guards wallet creation for a user. Separate from [`LockKey::user`]
    /// so a handler holding its own user lock can still take it.
    pub fn wallet(telegram_id: u64) -> Self {
        Self(format!("wallet:{}", telegram_id))
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Registry of named mutexes.
#[derive(Clone, Default)]
pub struct UserLocks {
    locks: Arc<DashMap<LockKey, Arc<Mutex<()>>>>,
}

/// Held lock. Dropping it releases the mutex.
pub struct UserLockGuard {
    key: LockKey,
    guard: Option<OwnedMutexGuard<()>>,
    locks: UserLocks,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for and take the lock for `key`.
    pub async fn acquire(&self, key: LockKey) -> UserLockGuard {
        let mutex = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        trace!("Waiting for lock {}", key);
        let guard = mutex.lock_owned().await;
        trace!("Acquired lock {}", key);

        UserLockGuard {
            key,
            guard: Some(guard),
            locks: self.clone(),
        }
    }

    /// Run `load` under the lock for `key` and fall back to `create` when it
    /// finds nothing. Concurrent callers for one key create at most once; the
    /// losers get what the winner stored.
    pub async fn get_or_create<T, E, L, LF, C, CF>(&self, key: LockKey, load: L, create: C) -> Result<T, E>
    where
        L: FnOnce() -> LF,
        LF: Future<Output = Result<Option<T>, E>>,
        C: FnOnce() -> CF,
        CF: Future<Output = Result<T, E>>,
    {
        let _guard = self.acquire(key).await;
        if let Some(existing) = load().await? {
            return Ok(existing);
        }
        create().await
    }

    /// Whether someone currently holds the lock for `key`.
    pub fn is_locked(&self, key: &LockKey) -> bool {
        self.locks
            .get(key)
            .map(|m| m.try_lock().is_err())
            .unwrap_or(false)
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// Drop the entry for `key` when nobody holds or waits for it.
    fn prune(&self, key: &LockKey) {
        self.locks
            .remove_if(key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

impl UserLockGuard {
    pub fn key(&self) -> &LockKey {
        &self.key
    }
}

impl Drop for UserLockGuard {
    fn drop(&mut self) {
        // Release before pruning so the strong count reflects waiters only.
        drop(self.guard.take());
        self.locks.prune(&self.key);
        trace!("Released lock {}", self.key);
    }
}

impl fmt::Debug for UserLockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserLockGuard").field("key", &self.key).finish()
    }
}
