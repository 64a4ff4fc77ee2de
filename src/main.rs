// resource_pool demo binary
// The library lives in lib.rs; run demos with: cargo run --example basic

use resource_pool::{PoolRegistry, ResourceDescriptor, ResourceFactory};
use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Default)]
struct Links {
    opened: AtomicUsize,
}

impl ResourceFactory for Links {
    type Resource = String;
    type Error = Infallible;

    fn create(&self, descriptor: &ResourceDescriptor) -> Result<String, Infallible> {
        let n = self.opened.fetch_add(1, Ordering::Relaxed);
        Ok(format!("{}#{}", descriptor.name, n))
    }

    fn close(&self, _resource: &String) -> Result<(), Infallible> {
        Ok(())
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== resource_pool ===");
    println!("See demos/ for usage; run: cargo run --example basic");
    println!();

    let registry = PoolRegistry::new(Links::default());
    let descriptor = ResourceDescriptor::new("inventory")
        .with_min_size(1)
        .with_max_size(2)
        .with_wait_timeout(Duration::from_millis(200));

    let pool = match registry.get_or_create(&descriptor) {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("  Could not start pool: {e}");
            return;
        }
    };

    match pool.checkout("demo") {
        Ok(handle) => {
            if let Ok(link) = handle.resource() {
                println!("  Checked out: {link}");
            }
        }
        Err(e) => println!("  Checkout failed: {e}"),
    }

    println!("  Idle after return: {}", pool.idle_count());
    registry.shutdown_all();
}
