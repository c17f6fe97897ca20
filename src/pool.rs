//! The pool handle, its shared state and the acquire path

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch, Notify, Semaphore};
use tokio::time::Instant;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::buffer::IdleBuffer;
use crate::config::PoolConfiguration;
use crate::errors::{PoolError, PoolResult, ProviderOperation};
use crate::eviction::EvictionPolicy;
use crate::health::{self, HealthStatus, SweepReport};
use crate::metrics::{MetricsExporter, MetricsTracker, PoolMetrics};
use crate::provider::ResourceProvider;
use crate::release::{self, ReleaseJob};
use crate::resize::{self, ResizeDirection, ResizeSignal};
use crate::resource::PooledResource;

pub(crate) type Record<P> = PooledResource<<P as ResourceProvider>::Resource>;

/// Stand-in deadline for durations too large to add to the clock
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `now + after`, saturating instead of panicking on overflow
pub(crate) fn deadline_after(after: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(after).unwrap_or_else(|| now + FAR_FUTURE)
}

/// An elastic pool of resources produced by a [`ResourceProvider`].
///
/// The pool keeps between `min_capacity` and `max_capacity` idle slots and
/// grows or shrinks that buffer in the background as load changes. Cloning
/// the pool is cheap and every clone shares the same resources.
///
/// # Examples
///
/// ```
/// use elastic_pool::{async_trait, ResourcePool, ResourceProvider};
/// use std::convert::Infallible;
/// use std::time::Duration;
///
/// struct Numbers;
///
/// #[async_trait]
/// impl ResourceProvider for Numbers {
///     type Resource = u64;
///     type Error = Infallible;
///
///     async fn create(&self) -> Result<u64, Infallible> {
///         Ok(7)
///     }
/// }
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), elastic_pool::PoolError> {
/// let pool = ResourcePool::new(2, 4, 1, 1, Duration::from_secs(60), Numbers).await?;
/// let number = pool.acquire(Duration::from_millis(100), None).await?;
/// assert_eq!(*number, 7);
/// pool.release(number)?;
/// pool.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct ResourcePool<P: ResourceProvider> {
    pub(crate) inner: Arc<Inner<P>>,
}

impl<P: ResourceProvider> Clone for ResourcePool<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// State shared by the pool handles and its background tasks
pub(crate) struct Inner<P: ResourceProvider> {
    pub provider: P,
    pub config: PoolConfiguration,
    pub eviction: EvictionPolicy,
    /// Current idle buffer; the write half doubles as the resize lock
    pub idle: RwLock<Arc<IdleBuffer<P::Resource>>>,
    pub capacity: AtomicUsize,
    /// Single-flight flag for expand and shrink
    pub resizing: AtomicBool,
    /// Single-flight flag for health sweeps
    pub sweeping: AtomicBool,
    pub total: AtomicUsize,
    /// Borrowed record ids
    pub borrowed: DashMap<Uuid, ()>,
    /// Woken on every push into the idle buffer and on every buffer swap
    pub available: Notify,
    pub expand_signal: ResizeSignal,
    pub shrink_signal: ResizeSignal,
    pub release_tx: mpsc::Sender<ReleaseJob<P::Resource>>,
    pub create_permits: Option<Semaphore>,
    pub metrics: MetricsTracker,
    pub closed: AtomicBool,
    pub shutdown: watch::Sender<bool>,
    pub runtime: Handle,
}

impl<P: ResourceProvider> ResourcePool<P> {
    /// Build a pool and fill it with `min_capacity` resources.
    ///
    /// Construction is all-or-nothing: if any initial resource cannot be
    /// created, the ones already created are closed and the error returned.
    pub async fn new(
        min_capacity: usize,
        max_capacity: usize,
        expand_step: usize,
        shrink_step: usize,
        survive_duration: Duration,
        provider: P,
    ) -> PoolResult<Self> {
        let config = PoolConfiguration::new()
            .with_capacity(min_capacity, max_capacity)
            .with_steps(expand_step, shrink_step)
            .with_survive_duration(survive_duration);
        Self::with_config(config, provider).await
    }

    /// Build a pool from a full configuration
    pub async fn with_config(config: PoolConfiguration, provider: P) -> PoolResult<Self> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| {
            PoolError::InvalidConfig("a pool must be built inside a Tokio runtime".to_string())
        })?;

        let (expand_signal, expand_rx) = ResizeSignal::channel();
        let (shrink_signal, shrink_rx) = ResizeSignal::channel();
        let (release_tx, release_rx) = mpsc::channel(config.release_queue_capacity);
        let (shutdown, _) = watch::channel(false);

        let inner = Arc::new(Inner {
            eviction: EvictionPolicy::from_limits(config.survive_duration, config.max_lifetime),
            idle: RwLock::new(Arc::new(IdleBuffer::new(config.min_capacity))),
            capacity: AtomicUsize::new(config.min_capacity),
            resizing: AtomicBool::new(false),
            sweeping: AtomicBool::new(false),
            total: AtomicUsize::new(0),
            borrowed: DashMap::new(),
            available: Notify::new(),
            expand_signal,
            shrink_signal,
            release_tx,
            create_permits: config.max_concurrent_creates.map(Semaphore::new),
            metrics: MetricsTracker::new(),
            closed: AtomicBool::new(false),
            shutdown,
            runtime,
            provider,
            config,
        });

        inner.populate().await?;

        let weak = Arc::downgrade(&inner);
        let runtime = &inner.runtime;
        runtime.spawn(resize::listen(
            Weak::clone(&weak),
            expand_rx,
            inner.shutdown.subscribe(),
            ResizeDirection::Expand,
        ));
        runtime.spawn(resize::listen(
            Weak::clone(&weak),
            shrink_rx,
            inner.shutdown.subscribe(),
            ResizeDirection::Shrink,
        ));
        runtime.spawn(release::dispatch(
            Weak::clone(&weak),
            release_rx,
            inner.shutdown.subscribe(),
            inner.config.max_concurrent_resets,
        ));
        runtime.spawn(health::monitor(
            weak,
            inner.config.health_check_interval,
            inner.shutdown.subscribe(),
        ));

        debug!(
            min = inner.config.min_capacity,
            max = inner.config.max_capacity,
            "resource pool started"
        );
        Ok(Self { inner })
    }

    /// Borrow a resource.
    ///
    /// Takes an idle resource if one is ready. Otherwise it requests an
    /// expand and waits up to `wait` for one to become idle. When that
    /// deadline passes, a temporary resource is created under
    /// `create_timeout` (the configured provider timeout when `None`).
    /// Temporary resources must be released like any other.
    pub async fn acquire(
        &self,
        wait: Duration,
        create_timeout: Option<Duration>,
    ) -> PoolResult<PooledResource<P::Resource>> {
        let inner = &self.inner;
        inner.ensure_open()?;

        if let Some(record) = inner.take_idle() {
            return Ok(inner.lend(record));
        }

        if inner.total_count() < inner.config.max_capacity {
            inner.expand_signal.raise();
        }

        if let Some(record) = inner.wait_for_idle(wait).await? {
            return Ok(inner.lend(record));
        }

        MetricsTracker::bump(&inner.metrics.acquire_timeouts);
        match inner.create_record(true, create_timeout).await {
            Ok(record) => {
                MetricsTracker::bump(&inner.metrics.temporary_created);
                debug!(
                    resource_id = %record.id(),
                    "created temporary resource after acquire timeout"
                );
                Ok(inner.lend(record))
            }
            Err(source) => Err(PoolError::AcquireFailed {
                waited: wait,
                source: Box::new(source),
            }),
        }
    }

    /// Borrow a resource using the configured acquire and provider timeouts
    pub async fn get(&self) -> PoolResult<PooledResource<P::Resource>> {
        self.acquire(self.inner.config.acquire_timeout, None).await
    }

    /// Return a borrowed resource.
    ///
    /// Never blocks: the reset runs on a background worker, after which the
    /// resource re-enters the idle buffer or, if the buffer is full, is
    /// closed and a shrink is requested.
    pub fn release(&self, resource: PooledResource<P::Resource>) -> PoolResult<()> {
        self.inner.enqueue_release(resource, None)
    }

    /// Like [`release`](Self::release) with an explicit deadline for the reset
    pub fn release_with_timeout(
        &self,
        resource: PooledResource<P::Resource>,
        reset_timeout: Duration,
    ) -> PoolResult<()> {
        self.inner.enqueue_release(resource, Some(reset_timeout))
    }

    /// Close a borrowed resource instead of returning it
    pub async fn discard(&self, resource: PooledResource<P::Resource>) -> PoolResult<()> {
        let id = resource.id();
        if self.inner.borrowed.remove(&id).is_none() {
            return Err(PoolError::UnknownResource(id));
        }
        self.inner.destroy(resource).await;
        Ok(())
    }

    /// Ask the background resizer to grow the idle buffer
    pub fn request_expand(&self) -> bool {
        self.inner.expand_signal.raise()
    }

    /// Ask the background resizer to shrink the idle buffer
    pub fn request_shrink(&self) -> bool {
        self.inner.shrink_signal.raise()
    }

    /// Run one health sweep now. Returns `None` if another sweep was already
    /// in flight.
    pub async fn run_health_check(&self) -> Option<SweepReport> {
        self.inner.sweep().await
    }

    /// Stop the background tasks and close every idle resource.
    ///
    /// Calls already in progress are not cancelled. Afterwards `acquire`
    /// fails with [`PoolError::Closed`] and released resources are closed.
    pub async fn shutdown(&self) {
        let inner = &self.inner;
        if inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        inner.shutdown.send_replace(true);
        inner.available.notify_waiters();

        let orphaned = {
            let mut idle = inner.idle.write();
            let capacity = idle.capacity();
            std::mem::replace(&mut *idle, Arc::new(IdleBuffer::new(capacity)))
        };
        let mut closed = 0usize;
        for record in orphaned.drain() {
            inner.destroy(record).await;
            closed += 1;
        }
        debug!(closed, "resource pool shut down");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Current idle buffer capacity
    pub fn capacity(&self) -> usize {
        self.inner.capacity.load(Ordering::Acquire)
    }

    pub fn idle_count(&self) -> usize {
        self.inner.idle_count()
    }

    /// Resources currently lent out, temporary ones included
    pub fn borrowed_count(&self) -> usize {
        self.inner.borrowed.len()
    }

    /// Every live resource: idle, borrowed and in transit
    pub fn total_count(&self) -> usize {
        self.inner.total_count()
    }

    pub fn min_capacity(&self) -> usize {
        self.inner.config.min_capacity
    }

    pub fn max_capacity(&self) -> usize {
        self.inner.config.max_capacity
    }

    pub fn config(&self) -> &PoolConfiguration {
        &self.inner.config
    }

    pub fn provider(&self) -> &P {
        &self.inner.provider
    }

    pub fn health_status(&self) -> HealthStatus {
        HealthStatus::new(
            self.idle_count(),
            self.borrowed_count(),
            self.total_count(),
            self.capacity(),
            self.max_capacity(),
        )
    }

    pub fn metrics(&self) -> PoolMetrics {
        PoolMetrics {
            capacity: self.capacity(),
            idle: self.idle_count(),
            borrowed: self.borrowed_count(),
            total: self.total_count(),
            min_capacity: self.min_capacity(),
            max_capacity: self.max_capacity(),
            ..self.inner.metrics.snapshot()
        }
    }

    pub fn export_metrics(&self) -> std::collections::HashMap<String, String> {
        self.metrics().export()
    }

    pub fn export_metrics_prometheus(
        &self,
        pool_name: &str,
        tags: Option<&std::collections::HashMap<String, String>>,
    ) -> String {
        MetricsExporter::export_prometheus(&self.metrics(), pool_name, tags)
    }
}

impl<P: ResourceProvider> Inner<P> {
    async fn populate(&self) -> PoolResult<()> {
        for _ in 0..self.config.min_capacity {
            let record = match self.create_record(false, None).await {
                Ok(record) => record,
                Err(err) => {
                    warn!(error = %err, "initial resource creation failed");
                    let buffer = Arc::clone(&*self.idle.read());
                    for record in buffer.drain() {
                        self.destroy(record).await;
                    }
                    return Err(err);
                }
            };
            if let Err(record) = self.push_idle(record) {
                self.destroy(record).await;
            }
        }
        Ok(())
    }

    pub fn ensure_open(&self) -> PoolResult<()> {
        if self.is_closed() {
            Err(PoolError::Closed)
        } else {
            Ok(())
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn total_count(&self) -> usize {
        self.total.load(Ordering::Acquire)
    }

    pub fn idle_count(&self) -> usize {
        self.idle.read().len()
    }

    pub fn take_idle(&self) -> Option<Record<P>> {
        self.idle.read().try_pop()
    }

    /// Push into the current buffer. The read guard is held across the push
    /// so the record cannot land in a buffer that a resize just retired.
    pub fn push_idle(&self, record: Record<P>) -> Result<(), Record<P>> {
        let idle = self.idle.read();
        if self.is_closed() {
            return Err(record);
        }
        idle.try_push(record)?;
        drop(idle);
        self.available.notify_one();
        Ok(())
    }

    fn lend(&self, mut record: Record<P>) -> Record<P> {
        record.touch();
        self.borrowed.insert(record.id(), ());
        MetricsTracker::bump(&self.metrics.acquired);
        trace!(resource_id = %record.id(), temporary = record.is_temporary(), "resource lent");
        record
    }

    /// Wait for an idle record until `wait` elapses. `Ok(None)` means the
    /// deadline passed.
    async fn wait_for_idle(&self, wait: Duration) -> PoolResult<Option<Record<P>>> {
        let sleep = tokio::time::sleep_until(deadline_after(wait));
        tokio::pin!(sleep);

        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            self.ensure_open()?;
            if let Some(record) = self.take_idle() {
                return Ok(Some(record));
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = &mut sleep => {
                    // A push may have raced the deadline.
                    return Ok(self.take_idle());
                }
            }
        }
    }

    /// Run a provider call under `timeout`, or the configured default
    pub async fn call<F, R>(
        &self,
        operation: ProviderOperation,
        timeout: Option<Duration>,
        fut: F,
    ) -> PoolResult<R>
    where
        F: Future<Output = Result<R, P::Error>>,
    {
        let after = timeout.unwrap_or(self.config.provider_timeout);
        match tokio::time::timeout(after, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(PoolError::provider(operation, err)),
            Err(_) => Err(PoolError::Timeout { operation, after }),
        }
    }

    /// Create and count a new record
    pub async fn create_record(
        &self,
        temporary: bool,
        timeout: Option<Duration>,
    ) -> PoolResult<Record<P>> {
        let after = timeout.unwrap_or(self.config.provider_timeout);
        let timed_out = PoolError::Timeout {
            operation: ProviderOperation::Create,
            after,
        };
        let deadline = deadline_after(after);

        let _permit = match &self.create_permits {
            Some(permits) => match tokio::time::timeout_at(deadline, permits.acquire()).await {
                Ok(Ok(permit)) => Some(permit),
                Ok(Err(_)) => return Err(PoolError::Closed),
                Err(_) => return Err(timed_out),
            },
            None => None,
        };
        let resource = match tokio::time::timeout_at(deadline, self.provider.create()).await {
            Ok(Ok(resource)) => resource,
            Ok(Err(err)) => return Err(PoolError::provider(ProviderOperation::Create, err)),
            Err(_) => return Err(timed_out),
        };
        self.total.fetch_add(1, Ordering::AcqRel);
        Ok(PooledResource::new(resource, temporary))
    }

    /// Close a counted record and drop it from the total
    pub async fn destroy(&self, record: Record<P>) {
        let id = record.id();
        let result = self
            .call(ProviderOperation::Close, None, self.provider.close(record.into_inner()))
            .await;
        self.total.fetch_sub(1, Ordering::AcqRel);
        MetricsTracker::bump(&self.metrics.closed);
        match result {
            Ok(()) => trace!(resource_id = %id, "resource closed"),
            Err(err) => warn!(resource_id = %id, error = %err, "closing resource failed"),
        }
    }

    /// Whether an idle record should be evicted rather than kept
    pub async fn is_stale_or_unhealthy(&self, record: &Record<P>) -> bool {
        if self.eviction.is_expired(record) {
            trace!(resource_id = %record.id(), "resource outlived its survival duration");
            return true;
        }
        match self
            .call(ProviderOperation::HealthCheck, None, self.provider.health_check(&**record))
            .await
        {
            Ok(()) => false,
            Err(err) => {
                debug!(resource_id = %record.id(), error = %err, "resource failed health check");
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Tally, TallyProvider, SURVIVAL};

    #[tokio::test]
    async fn test_construction_fills_min_capacity() {
        let tally = Tally::default();
        let pool = ResourcePool::new(3, 6, 1, 1, SURVIVAL, TallyProvider::new(&tally))
            .await
            .unwrap();

        assert_eq!(pool.capacity(), 3);
        assert_eq!(pool.idle_count(), 3);
        assert_eq!(pool.total_count(), 3);
        assert_eq!(tally.created(), 3);
    }

    #[tokio::test]
    async fn test_construction_is_all_or_nothing() {
        let tally = Tally::default();
        tally.fail_create_after(2);
        let result = ResourcePool::new(4, 6, 1, 1, SURVIVAL, TallyProvider::new(&tally)).await;

        assert!(matches!(
            result,
            Err(PoolError::Provider {
                operation: ProviderOperation::Create,
                ..
            })
        ));
        assert_eq!(tally.closed(), 2);
    }

    #[tokio::test]
    async fn test_acquire_pops_idle_resource() {
        let tally = Tally::default();
        let pool = ResourcePool::new(2, 4, 1, 1, SURVIVAL, TallyProvider::new(&tally))
            .await
            .unwrap();

        let resource = pool.acquire(Duration::from_millis(50), None).await.unwrap();
        assert!(!resource.is_temporary());
        assert_eq!(pool.idle_count(), 1);
        assert_eq!(pool.borrowed_count(), 1);
        assert_eq!(pool.metrics().total_acquired, 1);
    }

    #[tokio::test]
    async fn test_discard_closes_and_uncounts() {
        let tally = Tally::default();
        let pool = ResourcePool::new(1, 1, 1, 1, SURVIVAL, TallyProvider::new(&tally))
            .await
            .unwrap();

        let resource = pool.acquire(Duration::from_millis(50), None).await.unwrap();
        pool.discard(resource).await.unwrap();

        assert_eq!(pool.total_count(), 0);
        assert_eq!(pool.borrowed_count(), 0);
        assert_eq!(tally.closed(), 1);
    }

    #[tokio::test]
    async fn test_create_timeout_is_reported() {
        let tally = Tally::default();
        let pool = ResourcePool::new(1, 1, 1, 1, SURVIVAL, TallyProvider::new(&tally))
            .await
            .unwrap();
        tally.set_create_delay(Duration::from_millis(200));

        let err = pool
            .inner
            .create_record(true, Some(Duration::from_millis(10)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PoolError::Timeout {
                operation: ProviderOperation::Create,
                ..
            }
        ));
        assert_eq!(pool.total_count(), 1);
    }

    fn assert_send<T: Send>(_: &T) {}

    #[tokio::test]
    async fn test_background_work_can_move_across_threads() {
        let tally = Tally::default();
        let pool = ResourcePool::new(1, 2, 1, 1, SURVIVAL, TallyProvider::new(&tally))
            .await
            .unwrap();

        let sweep = pool.inner.sweep();
        let expand = pool.inner.expand();
        let shrink = pool.inner.shrink();
        assert_send(&sweep);
        assert_send(&expand);
        assert_send(&shrink);
        drop((sweep, expand, shrink));

        let inner = Arc::clone(&pool.inner);
        let report = tokio::spawn(async move { inner.sweep().await }).await.unwrap();
        assert_eq!(report.map(|r| r.kept), Some(1));
    }

    #[tokio::test]
    async fn test_saturating_deadline_for_huge_durations() {
        let tally = Tally::default();
        let pool = ResourcePool::new(1, 1, 1, 1, SURVIVAL, TallyProvider::new(&tally))
            .await
            .unwrap();

        assert!(deadline_after(Duration::MAX) > Instant::now() + Duration::from_secs(3600));
        let record = pool.inner.create_record(true, Some(Duration::MAX)).await.unwrap();
        assert!(record.is_temporary());
        assert_eq!(pool.total_count(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_closes_idle_and_rejects_acquire() {
        let tally = Tally::default();
        let pool = ResourcePool::new(2, 4, 1, 1, SURVIVAL, TallyProvider::new(&tally))
            .await
            .unwrap();

        pool.shutdown().await;
        assert!(pool.is_closed());
        assert_eq!(tally.closed(), 2);
        assert_eq!(pool.total_count(), 0);
        assert!(matches!(
            pool.acquire(Duration::from_millis(10), None).await,
            Err(PoolError::Closed)
        ));
    }
}
