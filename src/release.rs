//! Asynchronous reset-and-return of released resources

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Semaphore};
use tracing::{debug, trace, warn};

use crate::errors::{PoolError, PoolResult, ProviderOperation};
use crate::metrics::MetricsTracker;
use crate::pool::{Inner, Record};
use crate::provider::ResourceProvider;
use crate::resource::PooledResource;

/// A released record waiting for its reset
pub(crate) struct ReleaseJob<T> {
    record: PooledResource<T>,
    reset_timeout: Option<Duration>,
}

/// Feed queued releases to reset tasks, at most `max_concurrent` at a time
pub(crate) async fn dispatch<P: ResourceProvider>(
    pool: Weak<Inner<P>>,
    mut jobs: mpsc::Receiver<ReleaseJob<P::Resource>>,
    mut shutdown: watch::Receiver<bool>,
    max_concurrent: usize,
) {
    let permits = Arc::new(Semaphore::new(max_concurrent));

    loop {
        let job = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            job = jobs.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };
        let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
            break;
        };
        let Some(inner) = pool.upgrade() else { break };
        tokio::spawn(async move {
            inner.recycle(job).await;
            drop(permit);
        });
    }

    // Whatever is still queued is closed, not recycled.
    jobs.close();
    while let Ok(job) = jobs.try_recv() {
        match pool.upgrade() {
            Some(inner) => inner.destroy(job.record).await,
            None => break,
        }
    }
    trace!("release dispatcher stopped");
}

impl<P: ResourceProvider> Inner<P> {
    pub(crate) fn enqueue_release(
        self: &Arc<Self>,
        record: Record<P>,
        reset_timeout: Option<Duration>,
    ) -> PoolResult<()> {
        let id = record.id();
        if self.borrowed.remove(&id).is_none() {
            warn!(resource_id = %id, "release of a resource this pool did not lend");
            return Err(PoolError::UnknownResource(id));
        }

        if self.is_closed() {
            self.close_in_background(record);
            return Err(PoolError::Closed);
        }

        match self.release_tx.try_send(ReleaseJob {
            record,
            reset_timeout,
        }) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(job)) => {
                warn!(resource_id = %id, "release queue full, closing resource");
                self.close_in_background(job.record);
                Err(PoolError::ReleaseQueueFull)
            }
            Err(TrySendError::Closed(job)) => {
                self.close_in_background(job.record);
                Err(PoolError::Closed)
            }
        }
    }

    fn close_in_background(self: &Arc<Self>, record: Record<P>) {
        let inner = Arc::clone(self);
        self.runtime.spawn(async move {
            inner.destroy(record).await;
        });
    }

    /// Reset a released record and put it back, or close it
    pub(crate) async fn recycle(&self, job: ReleaseJob<P::Resource>) {
        let ReleaseJob {
            mut record,
            reset_timeout,
        } = job;

        if self.is_closed() {
            self.destroy(record).await;
            return;
        }

        let reset = self
            .call(ProviderOperation::Reset, reset_timeout, self.provider.reset(&mut *record))
            .await;
        if let Err(err) = reset {
            debug!(resource_id = %record.id(), error = %err, "reset failed, closing resource");
            MetricsTracker::bump(&self.metrics.reset_failures);
            self.destroy(record).await;
            return;
        }

        record.touch();
        record.settle();
        match self.push_idle(record) {
            Ok(()) => MetricsTracker::bump(&self.metrics.recycled),
            Err(record) => {
                if !self.is_closed() {
                    self.shrink_signal.raise();
                }
                trace!(resource_id = %record.id(), "idle buffer full, closing released resource");
                self.destroy(record).await;
            }
        }
    }
}
