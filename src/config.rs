use crate::error::{LockError, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use std::env;

fn default_driver() -> String {
    "redis".to_string()
}

/// Engine construction input: which driver, its connection config, and key settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LockerConfig {
    #[serde(default = "default_driver")]
    pub driver: String,
    #[serde(default)]
    pub config: Value,
    pub settings: LockerSettings,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LockerSettings {
    /// Namespace for every store key, e.g. `lock:`
    #[serde(default)]
    pub prefix: String,
}

impl LockerSettings {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.prefix.is_empty() {
            return Err(LockError::MissingPrefix);
        }
        Ok(())
    }
}

impl LockerConfig {
    pub fn new(driver: impl Into<String>, config: Value, prefix: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            config,
            settings: LockerSettings::new(prefix),
        }
    }

    /// In-process store, mostly for tests.
    pub fn memory(prefix: impl Into<String>) -> Self {
        Self::new("memory", Value::Null, prefix)
    }

    pub fn from_env() -> Self {
        let driver = env::var("LOCKER_DRIVER")
            .unwrap_or_else(|_| default_driver())
            .to_lowercase();

        let prefix = env::var("LOCKER_PREFIX").unwrap_or_else(|_| "lock:".to_string());

        let config = if driver == "redis" {
            json!({
                "url": env::var("REDIS_URL").unwrap_or_else(|_| default_redis_url()),
                "username": env::var("REDIS_USERNAME").ok(),
                "password": env::var("REDIS_PASSWORD").ok(),
                "db": env::var("REDIS_DB").ok().and_then(|s| s.parse::<i64>().ok()),
            })
        } else {
            Value::Null
        };

        Self::new(driver, config, prefix)
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_scan_count() -> usize {
    100
}

/// Connection settings for the `redis` driver.
///
/// Either `url` or the `host`/`port` pair is used; `database` is accepted as
/// an alias of `db`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RedisConfig {
    pub url: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(alias = "database")]
    pub db: Option<i64>,
    #[serde(default = "default_scan_count")]
    pub scan_count: usize, // keys per SCAN page during purge
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: None,
            port: None,
            username: None,
            password: None,
            db: None,
            scan_count: default_scan_count(),
        }
    }
}

impl RedisConfig {
    pub fn from_value(value: &Value) -> Result<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_value(value.clone())?)
    }

    pub fn url(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        match (&self.host, self.port) {
            (None, None) => default_redis_url(),
            (host, port) => format!(
                "redis://{}:{}",
                host.as_deref().unwrap_or("127.0.0.1"),
                port.unwrap_or(6379)
            ),
        }
    }
}
