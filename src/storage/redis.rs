use crate::config::RedisConfig;
use crate::error::{LockError, Result};
use crate::storage::registry::DriverFactory;
use crate::storage::{repair_ttl, LockStore, Ttl, TtlRepair};
use async_trait::async_trait;
use parking_lot::RwLock;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;

pub struct RedisStorage {
    client: RwLock<Option<ConnectionManager>>,
    scan_count: usize,
}

impl RedisStorage {
    pub async fn new(config: &RedisConfig) -> Result<Self> {
        let mut connection_info = redis::ConnectionInfo::from_str(&config.url())?;

        if let Some(pwd) = &config.password {
            connection_info.redis.password = Some(pwd.clone());
        }
        if let Some(user) = &config.username {
            connection_info.redis.username = Some(user.clone());
        }
        if let Some(database) = config.db {
            connection_info.redis.db = database;
        }

        let db = connection_info.redis.db;
        let client = redis::Client::open(connection_info)?;
        let connection = ConnectionManager::new(client).await?;
        log::info!("[CONNECT] Connected to Redis, db: {}", db);
        Ok(Self {
            client: RwLock::new(Some(connection)),
            scan_count: config.scan_count.max(1),
        })
    }

    /// Clone of the shared connection; fails once the store is shut down.
    fn connection(&self) -> Result<ConnectionManager> {
        self.client.read().clone().ok_or(LockError::Closed)
    }
}

/// SCAN MATCH pattern for every key beginning with `prefix`.
fn scan_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('*');
    pattern
}

#[async_trait]
impl LockStore for RedisStorage {
    fn name(&self) -> &str {
        "redis"
    }

    async fn try_acquire(&self, key: &str, expire_secs: u64) -> Result<i64> {
        // a negative EXPIRE would delete the key the caller is about to hold
        let expire_secs = i64::try_from(expire_secs).map_err(|_| {
            LockError::InvalidArgument(format!("expire out of range: {}", expire_secs))
        })?;
        let mut conn = self.connection()?;

        let number_of_locks: i64 = conn.incr(key, 1).await?;
        let ttl: i64 = conn.ttl(key).await?;

        if repair_ttl(key, number_of_locks, Ttl::from_reply(ttl))? == TtlRepair::Apply {
            let _: () = conn.expire(key, expire_secs).await?;
        }
        Ok(number_of_locks)
    }

    async fn release(&self, key: &str) -> Result<()> {
        let mut conn = self.connection()?;
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection()?;
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    async fn purge_all(&self, prefix: &str) -> Result<()> {
        let mut conn = self.connection()?;
        let pattern = scan_pattern(prefix);
        let mut cursor: u64 = 0;
        let mut removed = 0usize;

        // one page in memory at a time
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(self.scan_count)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                removed += keys.len();
                let _: () = conn.del(&keys).await?;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }

        log::info!("[PURGE] Removed {} keys with prefix {}", removed, prefix);
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        // dropping the last manager clone closes the multiplexed connection
        self.client.write().take();
        log::info!("[SHUTDOWN] Redis store closed");
        Ok(())
    }
}

/// Connects a [`RedisStorage`] from a [`RedisConfig`] value.
pub struct RedisDriver;

#[async_trait]
impl DriverFactory for RedisDriver {
    async fn create(&self, config: &Value) -> Result<Arc<dyn LockStore>> {
        let config = RedisConfig::from_value(config)?;
        Ok(Arc::new(RedisStorage::new(&config).await?))
    }
}
