//! Expand and shrink of the idle buffer

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tokio::sync::{mpsc, watch};
use tracing::{debug, trace, warn};

use crate::buffer::IdleBuffer;
use crate::health::SweepReport;
use crate::metrics::MetricsTracker;
use crate::pool::Inner;
use crate::provider::ResourceProvider;

/// Coalescing request for a resize pass.
///
/// Backed by a single-slot channel: while one request is pending, further
/// requests are dropped.
pub(crate) struct ResizeSignal {
    tx: mpsc::Sender<()>,
}

impl ResizeSignal {
    pub fn channel() -> (Self, mpsc::Receiver<()>) {
        let (tx, rx) = mpsc::channel(1);
        (Self { tx }, rx)
    }

    /// Returns `false` if a request was already pending
    pub fn raise(&self) -> bool {
        self.tx.try_send(()).is_ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResizeDirection {
    Expand,
    Shrink,
}

/// Single-flight guard over one of the pool's flags. Held for a whole
/// expand or shrink pass, or for a whole health sweep.
pub(crate) struct ResizeGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> ResizeGuard<'a> {
    pub fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for ResizeGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Consume resize signals until shutdown or until the pool is dropped
pub(crate) async fn listen<P: ResourceProvider>(
    pool: Weak<Inner<P>>,
    mut signals: mpsc::Receiver<()>,
    mut shutdown: watch::Receiver<bool>,
    direction: ResizeDirection,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            signal = signals.recv() => {
                if signal.is_none() {
                    break;
                }
                let Some(inner) = pool.upgrade() else { break };
                match direction {
                    ResizeDirection::Expand => inner.expand().await,
                    ResizeDirection::Shrink => inner.shrink().await,
                }
            }
        }
    }
    trace!(?direction, "resize listener stopped");
}

impl<P: ResourceProvider> Inner<P> {
    /// Grow the idle buffer by one step and fill the new slots
    pub(crate) async fn expand(&self) {
        let Some(_guard) = ResizeGuard::try_acquire(&self.resizing) else {
            trace!("expand skipped, resize already in flight");
            return;
        };
        let max = self.config.max_capacity;

        let (from, to, stranded) = {
            let mut idle = self.idle.write();
            let current = idle.capacity();
            if current >= max {
                return;
            }
            let target = (current + self.config.expand_step).min(max);
            let grown = Arc::new(IdleBuffer::new(target));
            let mut stranded = Vec::new();
            for record in idle.drain() {
                if let Err(record) = grown.try_push(record) {
                    stranded.push(record);
                }
            }
            *idle = grown;
            self.capacity.store(target, Ordering::Release);
            (current, target, stranded)
        };
        self.available.notify_waiters();
        MetricsTracker::bump(&self.metrics.expansions);
        debug!(from, to, "expanded idle buffer");

        for record in stranded {
            self.destroy(record).await;
        }

        for _ in 0..self.config.expand_step {
            if self.total_count() >= max || self.is_closed() {
                break;
            }
            let record = match self.create_record(false, None).await {
                Ok(record) => record,
                Err(err) => {
                    warn!(error = %err, "expand could not create resource");
                    break;
                }
            };
            if let Err(record) = self.push_idle(record) {
                self.destroy(record).await;
                break;
            }
        }
    }

    /// Shrink the idle buffer by one step, keeping the healthiest survivors
    pub(crate) async fn shrink(&self) {
        let Some(_guard) = ResizeGuard::try_acquire(&self.resizing) else {
            trace!("shrink skipped, resize already in flight");
            return;
        };

        let (orphaned, from, to) = {
            let mut idle = self.idle.write();
            let current = idle.capacity();
            if current <= self.config.min_capacity {
                return;
            }
            let target = current
                .saturating_sub(self.config.shrink_step)
                .max(self.config.min_capacity);
            let orphaned = std::mem::replace(&mut *idle, Arc::new(IdleBuffer::new(target)));
            self.capacity.store(target, Ordering::Release);
            (orphaned, current, target)
        };
        MetricsTracker::bump(&self.metrics.shrinks);

        let report = self.refill(&orphaned).await;
        debug!(from, to, kept = report.kept, evicted = report.evicted, "shrank idle buffer");
    }

    /// Move records from a retired buffer into the current one.
    ///
    /// Records that find the current buffer full are closed outright; the
    /// rest are closed if stale or unhealthy and pushed back otherwise.
    pub(crate) async fn refill(&self, retired: &IdleBuffer<P::Resource>) -> SweepReport {
        let mut report = SweepReport::default();

        for record in retired.drain() {
            if self.idle.read().is_full() {
                self.destroy(record).await;
                report.overflowed += 1;
                continue;
            }
            if self.is_stale_or_unhealthy(&record).await {
                self.destroy(record).await;
                MetricsTracker::bump(&self.metrics.evicted);
                report.evicted += 1;
                continue;
            }
            match self.push_idle(record) {
                Ok(()) => report.kept += 1,
                Err(record) => {
                    self.destroy(record).await;
                    report.overflowed += 1;
                }
            }
        }

        report
    }
}
