//! Distributed mutual-exclusion locks on top of a shared key-value store.
//!
//! Every resource id is fingerprinted into a store key and guarded by an
//! atomic counter: the caller whose increment returns 1 holds the lease until
//! it unlocks or the key's expiry runs out.
//!
//! ```rust,no_run
//! use fe_locker::{AcquireOptions, Locker, LockerConfig, LockError};
//! use serde_json::json;
//!
//! # async fn run() -> fe_locker::Result<()> {
//! let locker = Locker::new(LockerConfig::new(
//!     "redis",
//!     json!({ "url": "redis://127.0.0.1:6379" }),
//!     "lock:",
//! ))
//! .await?;
//!
//! match locker.acquire("order_001", &AcquireOptions::default().with_expire(30)).await {
//!     Ok(lock) => {
//!         // critical section
//!         lock.unlock().await?;
//!     }
//!     Err(LockError::ResourceLocked { number_of_locks, .. }) => {
//!         log::info!("busy, {} attempts recorded", number_of_locks);
//!     }
//!     Err(e) => return Err(e),
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod locker;
pub mod models;
pub mod storage;

pub use config::{LockerConfig, LockerSettings, RedisConfig};
pub use error::{LockError, Result};
pub use fingerprint::hash;
pub use locker::Locker;
pub use models::{AcquireOptions, HandleState, LockHandle};
pub use storage::registry::{DriverFactory, DriverRegistry};
pub use storage::LockStore;
