//! Health monitoring for resource pools

use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

use crate::buffer::IdleBuffer;
use crate::pool::{deadline_after, Inner};
use crate::provider::ResourceProvider;
use crate::resize::ResizeGuard;

/// Health status of a resource pool
///
/// # Examples
///
/// ```
/// use elastic_pool::HealthStatus;
///
/// let health = HealthStatus::new(3, 1, 4, 4, 8);
/// assert!(health.is_healthy());
/// assert_eq!(health.idle_resources, 3);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct HealthStatus {
    /// Whether the pool is healthy
    pub is_healthy: bool,

    /// Number of warnings detected
    pub warning_count: usize,

    /// Borrowed resources relative to the maximum capacity (0.0 and up)
    pub utilization: f64,

    pub idle_resources: usize,

    pub borrowed_resources: usize,

    pub total_resources: usize,

    /// Current idle buffer capacity
    pub capacity: usize,

    pub max_capacity: usize,

    /// Warning messages
    pub warnings: Vec<String>,
}

impl HealthStatus {
    pub fn new(
        idle: usize,
        borrowed: usize,
        total: usize,
        capacity: usize,
        max_capacity: usize,
    ) -> Self {
        let utilization = if max_capacity > 0 {
            borrowed as f64 / max_capacity as f64
        } else {
            0.0
        };

        let mut warnings = Vec::new();
        let mut is_healthy = true;

        if utilization > 0.9 {
            warnings.push(format!("High utilization: {:.1}%", utilization * 100.0));
            is_healthy = false;
        }

        // Temporary resources push the total past the ceiling.
        if total > max_capacity {
            warnings.push(format!(
                "Overflow: {} live resources exceed max capacity {}",
                total, max_capacity
            ));
        }

        if idle == 0 && capacity > 0 {
            warnings.push("Idle buffer is empty".to_string());
        }

        Self {
            is_healthy,
            warning_count: warnings.len(),
            utilization,
            idle_resources: idle,
            borrowed_resources: borrowed,
            total_resources: total,
            capacity,
            max_capacity,
            warnings,
        }
    }

    /// Check if the pool is healthy
    pub fn is_healthy(&self) -> bool {
        self.is_healthy
    }
}

/// Outcome of one pass over the idle buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Resources that passed and went back into the buffer
    pub kept: usize,

    /// Resources closed as stale or unhealthy
    pub evicted: usize,

    /// Healthy resources closed because the buffer had no room
    pub overflowed: usize,
}

/// Sweep the idle buffer every `period` until shutdown or until the pool is dropped
pub(crate) async fn monitor<P: ResourceProvider>(
    pool: Weak<Inner<P>>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval_at(deadline_after(period), period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                let Some(inner) = pool.upgrade() else { break };
                match inner.sweep().await {
                    Some(report) => trace!(?report, "health sweep finished"),
                    None => trace!("health sweep skipped, another sweep in flight"),
                }
            }
        }
    }
    trace!("health monitor stopped");
}

impl<P: ResourceProvider> Inner<P> {
    /// Replace the idle buffer with a filtered copy of itself. Borrowed
    /// resources are never touched.
    ///
    /// Only other sweeps are shut out. A resize in flight only contends for
    /// the swap itself, and survivors go back into whichever buffer is
    /// current by the time they are pushed.
    pub(crate) async fn sweep(&self) -> Option<SweepReport> {
        if self.is_closed() {
            return None;
        }
        let report = {
            let _guard = ResizeGuard::try_acquire(&self.sweeping)?;
            let retired = {
                let mut idle = self.idle.write();
                let capacity = idle.capacity();
                std::mem::replace(&mut *idle, Arc::new(IdleBuffer::new(capacity)))
            };
            self.refill(&retired).await
        };

        if report.evicted > 0 {
            debug!(kept = report.kept, evicted = report.evicted, "health sweep evicted resources");
        }

        let capacity = self.capacity.load(Ordering::Acquire);
        let idle = self.idle_count();
        let floor = capacity as f64 * self.config.shrink_idle_ratio;
        if report.overflowed > 0 || (capacity > self.config.min_capacity && (idle as f64) < floor) {
            self.shrink_signal.raise();
        }

        Some(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Tally, TallyProvider, SURVIVAL};
    use crate::ResourcePool;

    #[test]
    fn test_health_status_flags_high_utilization() {
        let health = HealthStatus::new(0, 10, 10, 10, 10);
        assert!(!health.is_healthy());
        assert_eq!(health.warning_count, 2);
    }

    #[test]
    fn test_health_status_reports_overflow() {
        let health = HealthStatus::new(2, 3, 6, 4, 5);
        assert!(health.is_healthy());
        assert!(health.warnings.iter().any(|w| w.starts_with("Overflow")));
    }

    #[tokio::test]
    async fn test_sweep_evicts_stale_and_keeps_fresh() {
        let tally = Tally::default();
        let pool = ResourcePool::new(3, 3, 1, 1, SURVIVAL, TallyProvider::new(&tally))
            .await
            .unwrap();

        let mut stale = pool.inner.take_idle().unwrap();
        let stale_id = stale.id();
        stale.backdate(Duration::from_secs(61));
        assert!(pool.inner.push_idle(stale).is_ok());

        let report = pool.run_health_check().await.unwrap();
        assert_eq!(
            report,
            SweepReport {
                kept: 2,
                evicted: 1,
                overflowed: 0
            }
        );
        assert_eq!(pool.idle_count(), 2);
        assert_eq!(pool.total_count(), 2);
        assert!(std::iter::from_fn(|| pool.inner.take_idle()).all(|r| r.id() != stale_id));
    }

    #[tokio::test]
    async fn test_sweep_evicts_unhealthy() {
        let tally = Tally::default();
        let pool = ResourcePool::new(2, 4, 1, 1, SURVIVAL, TallyProvider::new(&tally))
            .await
            .unwrap();
        tally.set_fail_health(true);

        let report = pool.run_health_check().await.unwrap();
        assert_eq!(report.evicted, 2);
        assert_eq!(pool.idle_count(), 0);
        assert_eq!(tally.closed(), 2);
        assert_eq!(pool.capacity(), 2);
    }

    #[tokio::test]
    async fn test_sweep_runs_while_resize_in_flight() {
        let tally = Tally::default();
        let pool = ResourcePool::new(2, 4, 1, 1, SURVIVAL, TallyProvider::new(&tally))
            .await
            .unwrap();
        let mut stale = pool.inner.take_idle().unwrap();
        stale.backdate(Duration::from_secs(61));
        assert!(pool.inner.push_idle(stale).is_ok());

        let resizing = ResizeGuard::try_acquire(&pool.inner.resizing);
        let report = pool.run_health_check().await.unwrap();
        assert_eq!(report.evicted, 1);
        assert_eq!(report.kept, 1);
        assert_eq!(tally.closed(), 1);
        drop(resizing);
    }

    #[tokio::test]
    async fn test_concurrent_sweep_is_skipped() {
        let tally = Tally::default();
        let pool = ResourcePool::new(2, 4, 1, 1, SURVIVAL, TallyProvider::new(&tally))
            .await
            .unwrap();

        let sweeping = ResizeGuard::try_acquire(&pool.inner.sweeping);
        assert!(pool.run_health_check().await.is_none());
        drop(sweeping);
        assert!(pool.run_health_check().await.is_some());
    }

    #[tokio::test]
    async fn test_sweep_survivors_follow_a_concurrent_expand() {
        let tally = Tally::default();
        let pool = ResourcePool::new(2, 6, 2, 1, SURVIVAL, TallyProvider::new(&tally))
            .await
            .unwrap();
        tally.set_create_delay(Duration::from_millis(30));

        let (report, ()) = tokio::join!(pool.run_health_check(), pool.inner.expand());
        let report = report.unwrap();
        assert_eq!(report.evicted, 0);
        assert_eq!(pool.capacity(), 4);
        assert_eq!(pool.idle_count(), 4);
        assert_eq!(pool.total_count(), 4);
    }

    #[tokio::test]
    async fn test_sweep_leaves_borrowed_alone() {
        let tally = Tally::default();
        let pool = ResourcePool::new(2, 4, 1, 1, SURVIVAL, TallyProvider::new(&tally))
            .await
            .unwrap();
        let borrowed = pool.acquire(Duration::from_millis(50), None).await.unwrap();
        tally.set_fail_health(true);

        let report = pool.run_health_check().await.unwrap();
        assert_eq!(report.evicted, 1);
        assert_eq!(pool.borrowed_count(), 1);
        assert_eq!(pool.total_count(), 1);
        assert_eq!(tally.health_checks(), 1);
        drop(borrowed);
    }
}
