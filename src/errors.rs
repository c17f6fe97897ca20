//! Error types for the resource pool

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

/// The provider call that failed or timed out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderOperation {
    Create,
    Reset,
    Close,
    HealthCheck,
}

impl fmt::Display for ProviderOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderOperation::Create => "create",
            ProviderOperation::Reset => "reset",
            ProviderOperation::Close => "close",
            ProviderOperation::HealthCheck => "health check",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone)]
pub enum PoolError {
    #[error("Invalid pool configuration: {0}")]
    InvalidConfig(String),

    #[error("Resource provider {operation} failed: {source}")]
    Provider {
        operation: ProviderOperation,
        #[source]
        source: Arc<dyn StdError + Send + Sync>,
    },

    #[error("Resource provider {operation} timed out after {after:?}")]
    Timeout {
        operation: ProviderOperation,
        after: Duration,
    },

    /// The wait deadline expired and the fallback creation failed as well
    #[error("No idle resource within {waited:?} and fallback creation failed: {source}")]
    AcquireFailed {
        waited: Duration,
        #[source]
        source: Box<PoolError>,
    },

    #[error("Resource {0} is not borrowed from this pool")]
    UnknownResource(Uuid),

    #[error("Release queue is full - resource was closed instead of recycled")]
    ReleaseQueueFull,

    #[error("Pool is closed")]
    Closed,
}

impl PoolError {
    pub(crate) fn provider<E>(operation: ProviderOperation, err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        PoolError::Provider {
            operation,
            source: Arc::new(err),
        }
    }

    /// Whether the error came from an expired deadline, at any depth
    pub fn is_timeout(&self) -> bool {
        match self {
            PoolError::Timeout { .. } => true,
            PoolError::AcquireFailed { source, .. } => source.is_timeout(),
            _ => false,
        }
    }
}

pub type PoolResult<T> = Result<T, PoolError>;
