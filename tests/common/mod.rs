#![allow(dead_code)]

use elastic_pool::{async_trait, ResourceProvider};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};

#[derive(Debug, Error)]
#[error("connection {0} failed")]
pub struct ConnError(&'static str);

/// Fake connection handed out by [`FakeDb`]
#[derive(Debug)]
pub struct Conn {
    pub serial: usize,
    pub queries: usize,
}

#[derive(Default)]
pub struct Counters {
    pub created: AtomicUsize,
    pub closed: AtomicUsize,
    pub resets: AtomicUsize,
    pub creating: AtomicUsize,
    pub peak_creating: AtomicUsize,
    pub create_delay_ms: AtomicU64,
    pub reset_delay_ms: AtomicU64,
    pub fail_create: AtomicBool,
    pub fail_health: AtomicBool,
}

impl Counters {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn set_create_delay(&self, delay: Duration) {
        self.create_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_reset_delay(&self, delay: Duration) {
        self.reset_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

pub struct FakeDb {
    pub counters: Arc<Counters>,
}

impl FakeDb {
    pub fn new() -> (Self, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        (
            Self {
                counters: Arc::clone(&counters),
            },
            counters,
        )
    }
}

#[async_trait]
impl ResourceProvider for FakeDb {
    type Resource = Conn;
    type Error = ConnError;

    async fn create(&self) -> Result<Conn, ConnError> {
        let now = self.counters.creating.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak_creating.fetch_max(now, Ordering::SeqCst);
        let delay = self.counters.create_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            sleep(Duration::from_millis(delay)).await;
        }
        self.counters.creating.fetch_sub(1, Ordering::SeqCst);
        if self.counters.fail_create.load(Ordering::SeqCst) {
            return Err(ConnError("create"));
        }
        let serial = self.counters.created.fetch_add(1, Ordering::SeqCst);
        Ok(Conn { serial, queries: 0 })
    }

    async fn reset(&self, conn: &mut Conn) -> Result<(), ConnError> {
        let delay = self.counters.reset_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            sleep(Duration::from_millis(delay)).await;
        }
        self.counters.resets.fetch_add(1, Ordering::SeqCst);
        conn.queries = 0;
        Ok(())
    }

    async fn close(&self, _conn: Conn) -> Result<(), ConnError> {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn health_check(&self, _conn: &Conn) -> Result<(), ConnError> {
        if self.counters.fail_health.load(Ordering::SeqCst) {
            return Err(ConnError("ping"));
        }
        Ok(())
    }
}

/// Poll `check` until it holds or two seconds pass
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        sleep(Duration::from_millis(5)).await;
    }
    check()
}
