use crate::error::{LockError, Result};
use crate::storage::LockStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Longest lease a caller may request: one year.
pub const MAX_EXPIRE_SECS: u64 = 60 * 60 * 24 * 365;

fn default_expire() -> u64 {
    60
}

fn default_max_retry_attempts() -> u32 {
    20
}

fn default_retry_interval() -> u64 {
    200
}

/// Acquisition options, resolved once per `acquire` call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcquireOptions {
    #[serde(default = "default_expire")]
    pub expire: u64, // seconds before the lease expires in the store
    #[serde(default)]
    pub retry: bool,
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    #[serde(default = "default_retry_interval", rename = "retryInterval")]
    pub retry_interval_ms: u64,
}

impl Default for AcquireOptions {
    fn default() -> Self {
        Self {
            expire: default_expire(),
            retry: false,
            max_retry_attempts: default_max_retry_attempts(),
            retry_interval_ms: default_retry_interval(),
        }
    }
}

impl AcquireOptions {
    pub fn with_expire(mut self, secs: u64) -> Self {
        self.expire = secs;
        self
    }

    /// Enable polling retries with the given budget and interval.
    pub fn with_retry(mut self, max_retry_attempts: u32, retry_interval: Duration) -> Self {
        self.retry = true;
        self.max_retry_attempts = max_retry_attempts;
        self.retry_interval_ms = u64::try_from(retry_interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.expire == 0 {
            return Err(LockError::InvalidArgument(
                "expire must be at least one second".to_string(),
            ));
        }
        if self.expire > MAX_EXPIRE_SECS {
            return Err(LockError::InvalidArgument(format!(
                "expire must not exceed {} seconds, got {}",
                MAX_EXPIRE_SECS, self.expire
            )));
        }
        Ok(())
    }
}

const HELD: u8 = 0;
const RELEASED: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Held,
    Released,
}

/// An acquired lease. Owned by the caller that acquired it.
pub struct LockHandle {
    resource_id: String,
    key: String,
    locked_at: DateTime<Utc>,
    store_key: String,
    state: AtomicU8,
    store: Arc<dyn LockStore>,
}

impl LockHandle {
    pub(crate) fn new(
        resource_id: impl Into<String>,
        key: impl Into<String>,
        store_key: impl Into<String>,
        store: Arc<dyn LockStore>,
    ) -> Self {
        Self {
            resource_id: resource_id.into(),
            key: key.into(),
            locked_at: Utc::now(),
            store_key: store_key.into(),
            state: AtomicU8::new(HELD),
            store,
        }
    }

    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    /// Fingerprint of the resource id, without the store prefix.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn locked_at(&self) -> DateTime<Utc> {
        self.locked_at
    }

    pub fn state(&self) -> HandleState {
        match self.state.load(Ordering::Acquire) {
            HELD => HandleState::Held,
            _ => HandleState::Released,
        }
    }

    pub fn is_held(&self) -> bool {
        self.state() == HandleState::Held
    }

    /// Release the lease. Only the first call reaches the store; every later
    /// call fails with [`LockError::NotLocked`].
    ///
    /// The check is local: a lease that already expired in the store is still
    /// deleted without complaint.
    pub async fn unlock(&self) -> Result<()> {
        if self
            .state
            .compare_exchange(HELD, RELEASED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(LockError::NotLocked {
                resource_id: self.resource_id.clone(),
            });
        }

        self.store.release(&self.store_key).await?;
        log::info!(
            "[RELEASE] Lock released - resource_id: {}, key: {}, held_for: {}ms",
            self.resource_id,
            self.key,
            Utc::now()
                .signed_duration_since(self.locked_at)
                .num_milliseconds()
        );
        Ok(())
    }
}

impl fmt::Debug for LockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockHandle")
            .field("resource_id", &self.resource_id)
            .field("key", &self.key)
            .field("locked_at", &self.locked_at)
            .field("state", &self.state())
            .field("driver", &self.store.name())
            .finish()
    }
}
