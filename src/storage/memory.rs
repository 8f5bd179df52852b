use crate::error::{LockError, Result};
use crate::storage::registry::DriverFactory;
use crate::storage::{repair_ttl, LockStore, Ttl, TtlRepair};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, Default)]
struct Counter {
    value: i64,
    expires_at: Option<Instant>,
}

impl Counter {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// In-process key-value store with counter and expiry primitives.
pub struct MemoryStorage {
    counters: DashMap<String, Counter>, // store key -> counter
    closed: AtomicBool,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            counters: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(LockError::Closed);
        }
        Ok(())
    }

    /// Atomically increment the counter at `key`, starting from 0 when absent or expired.
    pub fn incr(&self, key: &str) -> Result<i64> {
        self.ensure_open()?;
        let now = Instant::now();
        let mut counter = self.counters.entry(key.to_string()).or_default();
        if counter.is_expired(now) {
            *counter = Counter::default();
        }
        counter.value += 1;
        Ok(counter.value)
    }

    pub fn ttl(&self, key: &str) -> Result<Ttl> {
        self.ensure_open()?;
        let now = Instant::now();
        let ttl = match self.counters.get(key) {
            None => Ttl::Missing,
            Some(counter) if counter.is_expired(now) => Ttl::Missing,
            Some(counter) => match counter.expires_at {
                None => Ttl::Persistent,
                // round up so a live key never reports zero seconds
                Some(at) => {
                    let left = at.saturating_duration_since(now);
                    let secs = left.as_secs() + u64::from(left.subsec_nanos() > 0);
                    Ttl::Remaining(secs)
                }
            },
        };
        Ok(ttl)
    }

    /// Set the expiry of a live key. Returns false when the key is absent.
    pub fn expire(&self, key: &str, secs: u64) -> Result<bool> {
        self.ensure_open()?;
        let now = Instant::now();
        let expires_at = now
            .checked_add(Duration::from_secs(secs))
            .ok_or_else(|| LockError::InvalidArgument(format!("expire out of range: {}", secs)))?;
        match self.counters.get_mut(key) {
            Some(mut counter) if !counter.is_expired(now) => {
                counter.expires_at = Some(expires_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Delete `key`. Returns whether a live key was removed.
    pub fn del(&self, key: &str) -> Result<bool> {
        self.ensure_open()?;
        let now = Instant::now();
        Ok(matches!(self.counters.remove(key), Some((_, counter)) if !counter.is_expired(now)))
    }

    /// Delete every key starting with `prefix`, returning how many were live.
    fn remove_prefix(&self, prefix: &str) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.counters.retain(|key, counter| {
            if !key.starts_with(prefix) {
                return true;
            }
            if !counter.is_expired(now) {
                removed += 1;
            }
            false
        });
        removed
    }

    /// Increment, then repair the expiry. `after_incr` runs between the
    /// increment and the TTL read.
    pub(crate) fn acquire_counter<F>(&self, key: &str, expire_secs: u64, after_incr: F) -> Result<i64>
    where
        F: FnOnce(&MemoryStorage, &str),
    {
        let number_of_locks = self.incr(key)?;
        after_incr(self, key);
        let ttl = self.ttl(key)?;

        if repair_ttl(key, number_of_locks, ttl)? == TtlRepair::Apply {
            self.expire(key, expire_secs)?;
        }
        Ok(number_of_locks)
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.counters
            .iter()
            .filter(|entry| !entry.value().is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl LockStore for MemoryStorage {
    fn name(&self) -> &str {
        "memory"
    }

    async fn try_acquire(&self, key: &str, expire_secs: u64) -> Result<i64> {
        self.acquire_counter(key, expire_secs, |_, _| {})
    }

    async fn release(&self, key: &str) -> Result<()> {
        self.del(key)?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.ensure_open()?;
        let now = Instant::now();
        // drop the entry once it has expired
        self.counters.remove_if(key, |_, counter| counter.is_expired(now));
        Ok(self.counters.contains_key(key))
    }

    async fn purge_all(&self, prefix: &str) -> Result<()> {
        self.ensure_open()?;
        let removed = self.remove_prefix(prefix);
        log::info!("[PURGE] Removed {} keys with prefix {}", removed, prefix);
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        self.counters.clear();
        log::info!("[SHUTDOWN] Memory store closed");
        Ok(())
    }
}

/// Builds a fresh [`MemoryStorage`]; the driver takes no configuration.
pub struct MemoryDriver;

#[async_trait]
impl DriverFactory for MemoryDriver {
    async fn create(&self, _config: &Value) -> Result<Arc<dyn LockStore>> {
        Ok(Arc::new(MemoryStorage::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_incr_is_monotonic() {
        let store = MemoryStorage::new();
        assert_eq!(store.incr("k").unwrap(), 1);
        assert_eq!(store.incr("k").unwrap(), 2);
        assert_eq!(store.incr("other").unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_states() {
        let store = MemoryStorage::new();
        assert_eq!(store.ttl("k").unwrap(), Ttl::Missing);
        store.incr("k").unwrap();
        assert_eq!(store.ttl("k").unwrap(), Ttl::Persistent);
        assert!(store.expire("k", 10).unwrap());
        assert_eq!(store.ttl("k").unwrap(), Ttl::Remaining(10));
        tokio::time::advance(Duration::from_millis(2500)).await;
        assert_eq!(store.ttl("k").unwrap(), Ttl::Remaining(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_absent_key() {
        let store = MemoryStorage::new();
        assert!(!store.expire("missing", 10).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_counter_restarts_from_zero() {
        let store = MemoryStorage::new();
        assert_eq!(store.try_acquire("k", 1).await.unwrap(), 1);
        assert_eq!(store.try_acquire("k", 1).await.unwrap(), 2);
        tokio::time::advance(Duration::from_millis(1100)).await;
        assert!(!store.exists("k").await.unwrap());
        assert_eq!(store.try_acquire("k", 1).await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_acquire_heals_counter_without_expiry() {
        let store = MemoryStorage::new();
        store.incr("k").unwrap();
        assert_eq!(store.ttl("k").unwrap(), Ttl::Persistent);

        assert_eq!(store.try_acquire("k", 30).await.unwrap(), 2);
        assert_eq!(store.ttl("k").unwrap(), Ttl::Remaining(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_contended_acquire_keeps_expiry() {
        let store = MemoryStorage::new();
        store.try_acquire("k", 30).await.unwrap();
        tokio::time::advance(Duration::from_secs(10)).await;
        store.try_acquire("k", 30).await.unwrap();
        assert_eq!(store.ttl("k").unwrap(), Ttl::Remaining(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_all_only_touches_prefix() {
        let store = MemoryStorage::new();
        store.try_acquire("lock:a", 60).await.unwrap();
        store.try_acquire("lock:b", 60).await.unwrap();
        store.try_acquire("other:a", 60).await.unwrap();

        store.purge_all("lock:").await.unwrap();
        assert!(!store.exists("lock:a").await.unwrap());
        assert!(!store.exists("lock:b").await.unwrap());
        assert!(store.exists("other:a").await.unwrap());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_count_skips_expired_keys() {
        let store = MemoryStorage::new();
        store.try_acquire("lock:short", 1).await.unwrap();
        store.try_acquire("lock:long", 60).await.unwrap();
        store.try_acquire("other:a", 60).await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(store.remove_prefix("lock:"), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_out_of_range_is_rejected() {
        let store = MemoryStorage::new();
        store.incr("k").unwrap();
        assert!(matches!(
            store.expire("k", u64::MAX),
            Err(LockError::InvalidArgument(_))
        ));
        assert!(matches!(
            store.try_acquire("fresh", u64::MAX).await,
            Err(LockError::InvalidArgument(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_contended_key_vanishing_after_incr_is_unexpected() {
        let store = MemoryStorage::new();
        store.try_acquire("k", 60).await.unwrap();

        let result = store.acquire_counter("k", 60, |s, key| {
            s.del(key).unwrap();
        });
        assert!(matches!(
            result,
            Err(LockError::UnexpectedStoreState { ref key, .. }) if key == "k"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_key_vanishing_after_incr_still_succeeds() {
        let store = MemoryStorage::new();
        let result = store.acquire_counter("k", 60, |s, key| {
            s.del(key).unwrap();
        });
        assert_eq!(result.unwrap(), 1);
        assert!(!store.exists("k").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_closes_store() {
        let store = MemoryStorage::new();
        store.try_acquire("k", 60).await.unwrap();
        store.shutdown().await.unwrap();
        assert!(matches!(store.exists("k").await, Err(LockError::Closed)));
        assert!(matches!(
            store.try_acquire("k", 60).await,
            Err(LockError::Closed)
        ));
    }
}
