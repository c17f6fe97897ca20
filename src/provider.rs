//! The contract a pooled resource type must fulfil

use async_trait::async_trait;
use std::error::Error;

/// Creates, recycles, checks and destroys the resources a pool manages.
///
/// The pool never assumes any of these calls is fast: each one runs under a
/// deadline, and a call that overruns it is treated as failed.
///
/// # Examples
///
/// ```
/// use elastic_pool::{async_trait, ResourceProvider};
/// use std::convert::Infallible;
///
/// struct Buffers;
///
/// #[async_trait]
/// impl ResourceProvider for Buffers {
///     type Resource = Vec<u8>;
///     type Error = Infallible;
///
///     async fn create(&self) -> Result<Vec<u8>, Infallible> {
///         Ok(Vec::with_capacity(4096))
///     }
///
///     async fn reset(&self, buf: &mut Vec<u8>) -> Result<(), Infallible> {
///         buf.clear();
///         Ok(())
///     }
/// }
/// ```
///
/// `Resource` must be `Sync` as well as `Send`: health checks borrow an idle
/// resource across an await inside the pool's background tasks.
#[async_trait]
pub trait ResourceProvider: Send + Sync + 'static {
    type Resource: Send + Sync + 'static;
    type Error: Error + Send + Sync + 'static;

    /// Allocate a new underlying resource
    async fn create(&self) -> Result<Self::Resource, Self::Error>;

    /// Restore a resource to a clean state before it is reused
    async fn reset(&self, _resource: &mut Self::Resource) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Release the underlying resource. Called at most once per resource.
    async fn close(&self, resource: Self::Resource) -> Result<(), Self::Error> {
        drop(resource);
        Ok(())
    }

    /// Cheap liveness check used by shrink and the health sweep
    async fn health_check(&self, _resource: &Self::Resource) -> Result<(), Self::Error> {
        Ok(())
    }
}
