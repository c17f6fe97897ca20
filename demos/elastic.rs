//! Load burst: the pool expands, falls back to temporary resources, then
//! shrinks back once the burst is over

use elastic_pool::{async_trait, PoolConfiguration, ResourcePool, ResourceProvider};
use std::convert::Infallible;
use std::time::Duration;
use tokio::time::sleep;

struct SlowClient;

#[async_trait]
impl ResourceProvider for SlowClient {
    type Resource = &'static str;
    type Error = Infallible;

    async fn create(&self) -> Result<&'static str, Infallible> {
        sleep(Duration::from_millis(30)).await;
        Ok("rpc-client")
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== elastic_pool - Elastic Example ===\n");

    let config = PoolConfiguration::new()
        .with_capacity(2, 8)
        .with_steps(2, 2)
        .with_survive_duration(Duration::from_millis(500))
        .with_health_check_interval(Duration::from_millis(250));
    let pool = ResourcePool::with_config(config, SlowClient).await?;

    println!("1. Burst of 12 concurrent tasks:");
    let handles: Vec<_> = (0..12)
        .map(|task| {
            let pool = pool.clone();
            tokio::spawn(async move {
                let client = pool.acquire(Duration::from_millis(50), None).await?;
                let kind = if client.is_temporary() { "temporary" } else { "pooled" };
                println!("   Task {:2} got a {} {}", task, kind, *client);
                sleep(Duration::from_millis(100)).await;
                pool.release(client)
            })
        })
        .collect();
    for handle in handles {
        handle.await??;
    }
    sleep(Duration::from_millis(50)).await;
    println!("   Capacity: {}, total: {}\n", pool.capacity(), pool.total_count());

    println!("2. Idle period, health sweeps evict and shrink:");
    for _ in 0..6 {
        sleep(Duration::from_millis(250)).await;
        println!(
            "   Capacity: {}, idle: {}, total: {}",
            pool.capacity(),
            pool.idle_count(),
            pool.total_count()
        );
    }

    println!("\n3. Metrics:");
    print!("{}", pool.export_metrics_prometheus("rpc", None));

    pool.shutdown().await;
    Ok(())
}
