//! Instrumented provider for unit tests

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::provider::ResourceProvider;

/// Survival duration long enough that nothing goes stale mid-test
pub(crate) const SURVIVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
#[error("injected failure: {0}")]
pub(crate) struct TallyError(&'static str);

struct TallyState {
    created: AtomicUsize,
    closed: AtomicUsize,
    resets: AtomicUsize,
    health_checks: AtomicUsize,
    create_budget: AtomicUsize,
    create_delay_ms: AtomicU64,
    fail_reset: AtomicBool,
    fail_health: AtomicBool,
}

/// Shared counters and failure switches behind a [`TallyProvider`]
#[derive(Clone)]
pub(crate) struct Tally {
    state: Arc<TallyState>,
}

impl Default for Tally {
    fn default() -> Self {
        Self {
            state: Arc::new(TallyState {
                created: AtomicUsize::new(0),
                closed: AtomicUsize::new(0),
                resets: AtomicUsize::new(0),
                health_checks: AtomicUsize::new(0),
                create_budget: AtomicUsize::new(usize::MAX),
                create_delay_ms: AtomicU64::new(0),
                fail_reset: AtomicBool::new(false),
                fail_health: AtomicBool::new(false),
            }),
        }
    }
}

impl Tally {
    pub fn created(&self) -> usize {
        self.state.created.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }

    pub fn resets(&self) -> usize {
        self.state.resets.load(Ordering::SeqCst)
    }

    pub fn health_checks(&self) -> usize {
        self.state.health_checks.load(Ordering::SeqCst)
    }

    /// Let `count` more creations succeed, then fail every one after
    pub fn fail_create_after(&self, count: usize) {
        self.state.create_budget.store(count, Ordering::SeqCst);
    }

    pub fn set_create_delay(&self, delay: Duration) {
        self.state.create_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_fail_reset(&self, fail: bool) {
        self.state.fail_reset.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_health(&self, fail: bool) {
        self.state.fail_health.store(fail, Ordering::SeqCst);
    }
}

pub(crate) struct TallyProvider {
    tally: Tally,
}

impl TallyProvider {
    pub fn new(tally: &Tally) -> Self {
        Self {
            tally: tally.clone(),
        }
    }
}

#[async_trait]
impl ResourceProvider for TallyProvider {
    type Resource = u64;
    type Error = TallyError;

    async fn create(&self) -> Result<u64, TallyError> {
        let state = &self.tally.state;
        let delay = state.create_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let allowed = state
            .create_budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if !allowed {
            return Err(TallyError("create"));
        }
        Ok(state.created.fetch_add(1, Ordering::SeqCst) as u64)
    }

    async fn reset(&self, _resource: &mut u64) -> Result<(), TallyError> {
        self.tally.state.resets.fetch_add(1, Ordering::SeqCst);
        if self.tally.state.fail_reset.load(Ordering::SeqCst) {
            return Err(TallyError("reset"));
        }
        Ok(())
    }

    async fn close(&self, _resource: u64) -> Result<(), TallyError> {
        self.tally.state.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn health_check(&self, _resource: &u64) -> Result<(), TallyError> {
        self.tally.state.health_checks.fetch_add(1, Ordering::SeqCst);
        if self.tally.state.fail_health.load(Ordering::SeqCst) {
            return Err(TallyError("health check"));
        }
        Ok(())
    }
}
