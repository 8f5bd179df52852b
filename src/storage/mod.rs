pub mod memory;
pub mod redis;
pub mod registry;

use crate::error::{LockError, Result};
use async_trait::async_trait;

/// Remaining time-to-live of a key as reported by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Key does not exist.
    Missing,
    /// Key exists without an expiry.
    Persistent,
    /// Seconds left before the store drops the key.
    Remaining(u64),
}

impl Ttl {
    /// Decode a Redis style TTL reply (-2 absent, -1 no expiry).
    pub fn from_reply(reply: i64) -> Self {
        match reply {
            -2 => Ttl::Missing,
            r if r < 0 => Ttl::Persistent,
            r => Ttl::Remaining(r as u64),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlRepair {
    Apply,
    Keep,
}

/// Decide what to do with a counter's expiry right after incrementing it.
///
/// A fresh counter always gets the expiry. A contended counter with no
/// expiry was left behind by a holder that never set one and is healed.
/// A contended counter that is already gone again is reported.
pub fn repair_ttl(key: &str, number_of_locks: i64, ttl: Ttl) -> Result<TtlRepair> {
    if number_of_locks == 1 {
        return Ok(TtlRepair::Apply);
    }
    match ttl {
        Ttl::Persistent => {
            log::warn!(
                "[TTL REPAIR] Counter without expiry healed - key: {}, number_of_locks: {}",
                key, number_of_locks
            );
            Ok(TtlRepair::Apply)
        }
        Ttl::Missing => Err(LockError::UnexpectedStoreState {
            key: key.to_string(),
            detail: format!(
                "key absent right after increment (number_of_locks: {})",
                number_of_locks
            ),
        }),
        Ttl::Remaining(_) => Ok(TtlRepair::Keep),
    }
}

#[async_trait]
pub trait LockStore: Send + Sync {
    /// Driver name this store was registered under
    fn name(&self) -> &str;

    /// Increment the counter at `key` and return the new value, repairing its expiry
    async fn try_acquire(&self, key: &str, expire_secs: u64) -> Result<i64>;

    /// Delete `key` unconditionally
    async fn release(&self, key: &str) -> Result<()>;

    /// Whether `key` is currently present
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Delete every key starting with `prefix`
    async fn purge_all(&self, prefix: &str) -> Result<()>;

    /// Release connection resources; later calls fail with `Closed`
    async fn shutdown(&self) -> Result<()>;
}
