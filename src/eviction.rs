//! Eviction policies for idle resources

use std::time::Duration;

use crate::resource::PooledResource;

/// Decides when an idle resource has outlived its usefulness
///
/// # Examples
///
/// ```
/// use elastic_pool::EvictionPolicy;
/// use std::time::Duration;
///
/// let policy =
///     EvictionPolicy::from_limits(Duration::from_secs(60), Some(Duration::from_secs(3600)));
/// assert!(matches!(policy, EvictionPolicy::Combined { .. }));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// Evict once the resource has sat idle this long
    IdleTimeout(Duration),

    /// Evict on idle timeout or once the resource is older than `max_lifetime`
    Combined {
        idle_timeout: Duration,
        max_lifetime: Duration,
    },
}

impl EvictionPolicy {
    pub fn from_limits(idle_timeout: Duration, max_lifetime: Option<Duration>) -> Self {
        match max_lifetime {
            Some(max_lifetime) => EvictionPolicy::Combined {
                idle_timeout,
                max_lifetime,
            },
            None => EvictionPolicy::IdleTimeout(idle_timeout),
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        match self {
            EvictionPolicy::IdleTimeout(timeout) => *timeout,
            EvictionPolicy::Combined { idle_timeout, .. } => *idle_timeout,
        }
    }

    pub(crate) fn is_expired<T>(&self, record: &PooledResource<T>) -> bool {
        let idle = record.last_returned_at().elapsed();
        match self {
            EvictionPolicy::IdleTimeout(timeout) => idle > *timeout,
            EvictionPolicy::Combined {
                idle_timeout,
                max_lifetime,
            } => idle > *idle_timeout || record.created_at().elapsed() > *max_lifetime,
        }
    }
}
