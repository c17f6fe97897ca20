//! # elastic_pool
//!
//! Elastic async pool for expensive resources such as database connections
//! or RPC clients. The idle buffer grows and shrinks with load, and stale or
//! unhealthy resources are swept out in the background.
//!
//! ## Features
//!
//! - Bounded, lock-free idle buffer that is swapped out wholesale on resize
//! - Single-flight expand and shrink, triggered by coalescing signals
//! - Acquire with a wait deadline and a temporary-resource fallback
//! - Non-blocking release with bounded background reset
//! - Periodic health sweep with idle-time and lifetime eviction
//! - Health status and Prometheus-style metrics export
//!
//! ## Quick Start
//!
//! ```rust
//! use elastic_pool::{async_trait, ResourcePool, ResourceProvider};
//! use std::convert::Infallible;
//! use std::time::Duration;
//!
//! struct Sessions;
//!
//! #[async_trait]
//! impl ResourceProvider for Sessions {
//!     type Resource = String;
//!     type Error = Infallible;
//!
//!     async fn create(&self) -> Result<String, Infallible> {
//!         Ok("session".to_string())
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), elastic_pool::PoolError> {
//! let pool = ResourcePool::new(2, 8, 2, 1, Duration::from_secs(300), Sessions).await?;
//!
//! let session = pool.acquire(Duration::from_secs(1), None).await?;
//! println!("Got: {}", *session);
//! pool.release(session)?;
//!
//! pool.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod pool;
mod buffer;
mod config;
mod metrics;
mod health;
mod eviction;
mod errors;
mod provider;
mod release;
mod resize;
mod resource;

#[cfg(test)]
mod testing;

pub use pool::ResourcePool;
pub use config::{PoolConfiguration, DEFAULT_HEALTH_CHECK_INTERVAL, DEFAULT_PROVIDER_TIMEOUT};
pub use metrics::{PoolMetrics, MetricsExporter};
pub use health::{HealthStatus, SweepReport};
pub use eviction::EvictionPolicy;
pub use errors::{PoolError, PoolResult, ProviderOperation};
pub use provider::ResourceProvider;
pub use resource::PooledResource;

pub use async_trait::async_trait;
