//! Pool configuration options

use std::time::Duration;

use crate::errors::{PoolError, PoolResult};

/// Default deadline for provider calls when the caller supplies none
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(5);

/// Default period of the background health sweep
pub const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Configuration for resource pool behavior
///
/// # Examples
///
/// ```
/// use elastic_pool::PoolConfiguration;
/// use std::time::Duration;
///
/// let config = PoolConfiguration::new()
///     .with_capacity(2, 8)
///     .with_steps(2, 1)
///     .with_survive_duration(Duration::from_secs(600));
///
/// assert_eq!(config.min_capacity, 2);
/// assert_eq!(config.max_capacity, 8);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct PoolConfiguration {
    /// Idle buffer capacity the pool starts with and never shrinks below
    pub min_capacity: usize,

    /// Upper bound for the idle buffer capacity
    pub max_capacity: usize,

    /// Capacity added (and resources created) per expand pass
    pub expand_step: usize,

    /// Capacity removed per shrink pass
    pub shrink_step: usize,

    /// Maximum idle time before a resource is evicted
    pub survive_duration: Duration,

    /// Maximum total age of a resource, regardless of use
    pub max_lifetime: Option<Duration>,

    /// Period of the background health sweep
    pub health_check_interval: Duration,

    /// Deadline applied to provider calls that have no explicit one
    pub provider_timeout: Duration,

    /// Wait deadline used by `ResourcePool::get`
    pub acquire_timeout: Duration,

    /// Releases that may queue up waiting for a reset slot
    pub release_queue_capacity: usize,

    /// Resets that may run concurrently
    pub max_concurrent_resets: usize,

    /// Bound on concurrent provider `create` calls
    pub max_concurrent_creates: Option<usize>,

    /// After a sweep, idle/capacity below this ratio requests a shrink
    pub shrink_idle_ratio: f64,
}

impl Default for PoolConfiguration {
    fn default() -> Self {
        Self {
            min_capacity: 1,
            max_capacity: 10,
            expand_step: 1,
            shrink_step: 1,
            survive_duration: Duration::from_secs(300),
            max_lifetime: None,
            health_check_interval: DEFAULT_HEALTH_CHECK_INTERVAL,
            provider_timeout: DEFAULT_PROVIDER_TIMEOUT,
            acquire_timeout: Duration::from_secs(30),
            release_queue_capacity: 1024,
            max_concurrent_resets: 16,
            max_concurrent_creates: None,
            shrink_idle_ratio: 0.25,
        }
    }
}

impl PoolConfiguration {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum and maximum idle buffer capacity
    pub fn with_capacity(mut self, min: usize, max: usize) -> Self {
        self.min_capacity = min;
        self.max_capacity = max;
        self
    }

    /// Set how far each expand and shrink pass moves the capacity
    pub fn with_steps(mut self, expand: usize, shrink: usize) -> Self {
        self.expand_step = expand;
        self.shrink_step = shrink;
        self
    }

    pub fn with_survive_duration(mut self, duration: Duration) -> Self {
        self.survive_duration = duration;
        self
    }

    pub fn with_max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = Some(lifetime);
        self
    }

    pub fn with_health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval = interval;
        self
    }

    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Bound the asynchronous release path
    ///
    /// # Examples
    ///
    /// ```
    /// use elastic_pool::PoolConfiguration;
    ///
    /// let config = PoolConfiguration::new().with_release_limits(64, 4);
    ///
    /// assert_eq!(config.release_queue_capacity, 64);
    /// assert_eq!(config.max_concurrent_resets, 4);
    /// ```
    pub fn with_release_limits(mut self, queue_capacity: usize, concurrent_resets: usize) -> Self {
        self.release_queue_capacity = queue_capacity;
        self.max_concurrent_resets = concurrent_resets;
        self
    }

    pub fn with_max_concurrent_creates(mut self, limit: usize) -> Self {
        self.max_concurrent_creates = Some(limit);
        self
    }

    pub fn with_shrink_idle_ratio(mut self, ratio: f64) -> Self {
        self.shrink_idle_ratio = ratio;
        self
    }

    /// Check the configuration before a pool is built from it
    pub fn validate(&self) -> PoolResult<()> {
        if self.min_capacity == 0 {
            return Err(invalid("min_capacity must be greater than zero"));
        }
        if self.max_capacity == 0 {
            return Err(invalid("max_capacity must be greater than zero"));
        }
        if self.min_capacity > self.max_capacity {
            return Err(invalid(format!(
                "min_capacity ({}) exceeds max_capacity ({})",
                self.min_capacity, self.max_capacity
            )));
        }
        if self.health_check_interval.is_zero() {
            return Err(invalid("health_check_interval must be non-zero"));
        }
        if self.provider_timeout.is_zero() {
            return Err(invalid("provider_timeout must be non-zero"));
        }
        if self.release_queue_capacity == 0 || self.max_concurrent_resets == 0 {
            return Err(invalid("release limits must be greater than zero"));
        }
        if self.max_concurrent_creates == Some(0) {
            return Err(invalid("max_concurrent_creates must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.shrink_idle_ratio) {
            return Err(invalid("shrink_idle_ratio must be within 0.0..=1.0"));
        }
        Ok(())
    }
}

fn invalid(reason: impl Into<String>) -> PoolError {
    PoolError::InvalidConfig(reason.into())
}
