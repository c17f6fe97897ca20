//! Basic usage: borrow, use and return a resource

use elastic_pool::{async_trait, ResourcePool, ResourceProvider};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("socket error")]
struct SocketError;

#[derive(Debug)]
struct Socket {
    id: usize,
    sent: usize,
}

#[derive(Default)]
struct Sockets {
    next: AtomicUsize,
}

#[async_trait]
impl ResourceProvider for Sockets {
    type Resource = Socket;
    type Error = SocketError;

    async fn create(&self) -> Result<Socket, SocketError> {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        println!("   Opening socket {}", id);
        Ok(Socket { id, sent: 0 })
    }

    async fn reset(&self, socket: &mut Socket) -> Result<(), SocketError> {
        socket.sent = 0;
        Ok(())
    }

    async fn close(&self, socket: Socket) -> Result<(), SocketError> {
        println!("   Closing socket {}", socket.id);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== elastic_pool - Basic Example ===\n");

    println!("1. Building pool:");
    let pool = ResourcePool::new(2, 4, 1, 1, Duration::from_secs(60), Sockets::default()).await?;
    println!("   Idle: {}, capacity: {}\n", pool.idle_count(), pool.capacity());

    println!("2. Borrow and return:");
    let mut socket = pool.acquire(Duration::from_millis(100), None).await?;
    socket.sent += 1;
    println!("   Using socket {} (sent {})", socket.id, socket.sent);
    pool.release(socket)?;
    tokio::time::sleep(Duration::from_millis(20)).await;
    println!("   Idle after release: {}\n", pool.idle_count());

    println!("3. Health:");
    let health = pool.health_status();
    println!("   Healthy: {}, warnings: {:?}\n", health.is_healthy(), health.warnings);

    println!("4. Shutdown:");
    pool.shutdown().await;
    println!("   Closed: {}", pool.is_closed());

    Ok(())
}
