use crate::error::{LockError, Result};
use crate::storage::memory::MemoryDriver;
use crate::storage::redis::RedisDriver;
use crate::storage::LockStore;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Builds a [`LockStore`] from its driver-specific configuration.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn create(&self, config: &Value) -> Result<Arc<dyn LockStore>>;
}

/// Maps driver names to store factories.
#[derive(Clone)]
pub struct DriverRegistry {
    factories: HashMap<String, Arc<dyn DriverFactory>>,
}

impl Default for DriverRegistry {
    /// Registry with the bundled `redis` and `memory` drivers.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("redis", RedisDriver);
        registry.register("memory", MemoryDriver);
        registry
    }
}

impl DriverRegistry {
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register (or replace) the factory for `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: DriverFactory + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    /// Look up a factory without touching the network.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn DriverFactory>> {
        self.factories
            .get(name)
            .cloned()
            .ok_or_else(|| LockError::UnsupportedDriver(name.to_string()))
    }

    pub fn drivers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}
