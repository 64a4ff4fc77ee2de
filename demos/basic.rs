//! Basic usage: checkout, release, statistics

use resource_pool::{Pool, ResourceDescriptor, ResourceFactory};
use resource_pool::statistics::counters;
use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

#[derive(Debug)]
struct Connection {
    id: usize,
    target: String,
}

#[derive(Default)]
struct ConnectionFactory {
    next: AtomicUsize,
}

impl ResourceFactory for ConnectionFactory {
    type Resource = Connection;
    type Error = Infallible;

    fn create(&self, descriptor: &ResourceDescriptor) -> Result<Connection, Infallible> {
        Ok(Connection {
            id: self.next.fetch_add(1, Ordering::Relaxed),
            target: descriptor.name.clone(),
        })
    }

    fn close(&self, connection: &Connection) -> Result<(), Infallible> {
        println!("   Closing connection {}", connection.id);
        Ok(())
    }
}

fn main() {
    println!("=== resource_pool - Basic Examples ===\n");

    let descriptor = ResourceDescriptor::new("warehouse")
        .with_min_size(2)
        .with_max_size(4)
        .with_wait_timeout(Duration::from_millis(500));
    let pool = Arc::new(Pool::new(descriptor, Arc::new(ConnectionFactory::default())).unwrap());

    // Example 1: simple checkout
    println!("1. Simple checkout:");
    {
        let handle = pool.checkout("alice").unwrap();
        let conn = handle.resource().unwrap();
        println!("   Got connection {} to {}", conn.id, conn.target);
    }
    println!("   Idle after return: {}\n", pool.idle_count());

    // Example 2: explicit release
    println!("2. Explicit release:");
    let handle = pool.checkout("bob").unwrap();
    handle.release().unwrap();
    handle.release().unwrap();
    println!("   Released twice, second call was a no-op");
    println!("   Using the closed handle: {}\n", handle.resource().unwrap_err());

    // Example 3: many threads sharing a small pool
    println!("3. Concurrent checkouts:");
    let workers: Vec<_> = (0..8)
        .map(|i| {
            let pool = Arc::clone(&pool);
            thread::spawn(move || match pool.checkout(&format!("worker-{i}")) {
                Ok(handle) => {
                    thread::sleep(Duration::from_millis(50));
                    println!("   worker-{} used connection {}", i, handle.resource().unwrap().id);
                }
                Err(e) => println!("   worker-{i}: {e}"),
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }

    // Example 4: statistics
    println!("\n4. Statistics:");
    let stats = pool.statistics();
    println!("   Requests:  {}", stats.get(counters::REQUESTS));
    println!("   Creations: {}", stats.get(counters::CREATIONS));
    println!("   Peak size: {}", stats.get(counters::PEAK_SIZE));
    println!("   Mean wait: {} ms", stats.get(counters::WAIT_TIME_MS));

    pool.shutdown();
}
