use thiserror::Error;

pub type Result<T> = std::result::Result<T, LockError>;

#[derive(Error, Debug)]
pub enum LockError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Driver not supported: {0}")]
    UnsupportedDriver(String),

    #[error("Prefix required")]
    MissingPrefix,

    #[error("Invalid driver configuration: {0}")]
    InvalidConfig(String),

    /// The counter for `resource_id` was already past 1 on the last attempt.
    #[error("Resource locked: {resource_id} (number of locks: {number_of_locks})")]
    ResourceLocked {
        resource_id: String,
        number_of_locks: i64,
    },

    #[error("Not locked: {resource_id}")]
    NotLocked { resource_id: String },

    #[error("Unexpected store state for key {key}: {detail}")]
    UnexpectedStoreState { key: String, detail: String },

    #[error("Store has been shut down")]
    Closed,

    #[error(transparent)]
    Redis(#[from] redis::RedisError),
}

impl LockError {
    pub fn is_resource_locked(&self) -> bool {
        matches!(self, LockError::ResourceLocked { .. })
    }

    /// Observed counter value when this is a contention failure.
    pub fn number_of_locks(&self) -> Option<i64> {
        match self {
            LockError::ResourceLocked {
                number_of_locks, ..
            } => Some(*number_of_locks),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for LockError {
    fn from(err: serde_json::Error) -> Self {
        LockError::InvalidConfig(err.to_string())
    }
}
