use crate::config::{LockerConfig, LockerSettings};
use crate::error::{LockError, Result};
use crate::fingerprint;
use crate::models::{AcquireOptions, LockHandle};
use crate::storage::registry::DriverRegistry;
use crate::storage::LockStore;
use log::{debug, info};
use std::sync::Arc;
use tokio::time::sleep;

/// Distributed lock engine over a shared [`LockStore`].
///
/// Cloning is cheap; clones share the same store connection.
#[derive(Clone)]
pub struct Locker {
    store: Arc<dyn LockStore>,
    prefix: String,
}

impl Locker {
    /// Build an engine with the bundled drivers.
    pub async fn new(config: LockerConfig) -> Result<Self> {
        Self::with_registry(&DriverRegistry::default(), config).await
    }

    /// Build an engine, resolving `config.driver` in `registry`.
    ///
    /// Unknown drivers and a missing prefix fail before any connection is made.
    pub async fn with_registry(registry: &DriverRegistry, config: LockerConfig) -> Result<Self> {
        let factory = registry.resolve(&config.driver)?;
        config.settings.validate()?;

        info!(
            "[INIT] Creating locker - driver: {}, prefix: {}",
            config.driver, config.settings.prefix
        );
        let store = factory.create(&config.config).await?;
        Ok(Self {
            store,
            prefix: config.settings.prefix,
        })
    }

    /// Wrap an already constructed store.
    pub fn with_store(store: Arc<dyn LockStore>, settings: LockerSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            store,
            prefix: settings.prefix,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn driver_name(&self) -> &str {
        self.store.name()
    }

    fn store_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Acquire an exclusive lease on `resource_id`.
    ///
    /// Without `retry` a held resource fails at once with
    /// [`LockError::ResourceLocked`]. With `retry` the store is polled every
    /// `retry_interval` up to `max_retry_attempts` more times. Store errors end
    /// the loop immediately.
    pub async fn acquire(&self, resource_id: &str, options: &AcquireOptions) -> Result<LockHandle> {
        let key = fingerprint::hash(resource_id)?;
        options.validate()?;
        let store_key = self.store_key(&key);

        info!(
            "[ACQUIRE] Attempting to acquire lock - resource_id: {}, expire: {}s, retry: {}",
            resource_id, options.expire, options.retry
        );

        let mut remaining = if options.retry {
            options.max_retry_attempts
        } else {
            0
        };

        loop {
            let number_of_locks = self.store.try_acquire(&store_key, options.expire).await?;

            if number_of_locks == 1 {
                info!(
                    "[ACQUIRE SUCCESS] Lock acquired - resource_id: {}, key: {}",
                    resource_id, key
                );
                return Ok(LockHandle::new(
                    resource_id,
                    key,
                    store_key,
                    self.store.clone(),
                ));
            }

            if remaining == 0 {
                info!(
                    "[ACQUIRE FAILED] Lock already held - resource_id: {}, number_of_locks: {}",
                    resource_id, number_of_locks
                );
                return Err(LockError::ResourceLocked {
                    resource_id: resource_id.to_string(),
                    number_of_locks,
                });
            }

            remaining -= 1;
            debug!(
                "[RETRY] Resource busy - resource_id: {}, number_of_locks: {}, retries_left: {}",
                resource_id, number_of_locks, remaining
            );
            sleep(options.retry_interval()).await;
        }
    }

    /// Acquire with default options.
    pub async fn lock(&self, resource_id: &str) -> Result<LockHandle> {
        self.acquire(resource_id, &AcquireOptions::default()).await
    }

    pub async fn is_locked(&self, resource_id: &str) -> Result<bool> {
        let key = fingerprint::hash(resource_id)?;
        self.store.exists(&self.store_key(&key)).await
    }

    /// Delete every lock under this engine's prefix, held or not.
    pub async fn purge(&self) -> Result<()> {
        info!("[PURGE] Purging all locks - prefix: {}", self.prefix);
        self.store.purge_all(&self.prefix).await
    }

    /// Shut the store down. Handles still outstanding fail with
    /// [`LockError::Closed`] on unlock.
    pub async fn close(self) -> Result<()> {
        info!("[SHUTDOWN] Closing locker - driver: {}", self.store.name());
        self.store.shutdown().await
    }
}
