//! Async usage examples

use resource_pool::{CancellationToken, CheckoutOptions, Pool, ResourceDescriptor, ResourceFactory};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

struct Tokens;

impl ResourceFactory for Tokens {
    type Resource = u64;
    type Error = Infallible;

    fn create(&self, _descriptor: &ResourceDescriptor) -> Result<u64, Infallible> {
        Ok(42)
    }

    fn close(&self, _token: &u64) -> Result<(), Infallible> {
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().init();
    println!("=== resource_pool - Async Examples ===\n");

    let descriptor = ResourceDescriptor::new("tokens")
        .with_max_size(2)
        .with_wait_timeout(Duration::from_millis(100));
    let pool = Arc::new(Pool::new(descriptor, Arc::new(Tokens)).unwrap());

    // Example 1: Async checkout
    println!("1. Async checkout:");
    {
        let handle = pool.checkout_async("task-0").await.unwrap();
        println!("   Got token asynchronously: {}", handle.resource().unwrap());
    }
    println!();

    // Example 2: Timeout when the pool is exhausted
    println!("2. Async with timeout:");
    let _a = pool.checkout_async("a").await.unwrap();
    let _b = pool.checkout_async("b").await.unwrap();
    match pool.checkout_async("c").await {
        Ok(_) => println!("   Got token"),
        Err(e) => println!("   Error: {}", e),
    }
    drop((_a, _b));
    println!();

    // Example 3: Cancelling a waiting checkout
    println!("3. Cancellation:");
    let held = pool.checkout("holder").unwrap();
    let held2 = pool.checkout("holder-2").unwrap();
    let token = CancellationToken::new();
    let waiter = {
        let pool = Arc::clone(&pool);
        let options = CheckoutOptions::new()
            .with_timeout(Duration::from_secs(10))
            .with_cancellation(token.clone());
        tokio::task::spawn_blocking(move || pool.checkout_with("patient", &options).map(|_| ()))
    };
    sleep(Duration::from_millis(50)).await;
    token.cancel();
    println!("   Waiter finished with: {:?}", waiter.await.unwrap());
    drop((held, held2));
    println!();

    // Example 4: Concurrent tasks
    println!("4. Concurrent access:");
    let mut tasks = vec![];
    for i in 0..6 {
        let pool = Arc::clone(&pool);
        tasks.push(tokio::spawn(async move {
            match pool.checkout_async(&format!("task-{i}")).await {
                Ok(handle) => {
                    sleep(Duration::from_millis(20)).await;
                    println!("   Task {} used token {}", i, handle.resource().unwrap());
                }
                Err(e) => println!("   Task {} failed: {}", i, e),
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    println!("   Final idle: {}", pool.idle_count());
}
