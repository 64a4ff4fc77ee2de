//! Advanced features: extend mode, reaper, live updates, registry, Prometheus

use parking_lot::Mutex;
use resource_pool::{DescriptorUpdate, PoolRegistry, ResourceDescriptor, ResourceFactory};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
#[error("backend {0} refused the connection")]
struct Refused(String);

#[derive(Default)]
struct Backend {
    next: AtomicUsize,
    broken: Mutex<HashSet<usize>>,
}

impl ResourceFactory for Backend {
    type Resource = usize;
    type Error = Refused;

    fn create(&self, descriptor: &ResourceDescriptor) -> Result<usize, Refused> {
        if descriptor.name == "offline" {
            return Err(Refused(descriptor.name.clone()));
        }
        Ok(self.next.fetch_add(1, Ordering::Relaxed))
    }

    fn close(&self, _id: &usize) -> Result<(), Refused> {
        Ok(())
    }

    fn is_healthy(&self, id: &usize) -> bool {
        !self.broken.lock().contains(id)
    }
}

fn main() {
    println!("=== resource_pool - Advanced Features ===\n");
    let registry = PoolRegistry::new(Backend::default());

    extend_mode(&registry);
    reaper(&registry);
    live_update(&registry);
    creation_failures(&registry);
    prometheus_export(&registry);

    registry.shutdown_all();
}

fn extend_mode(registry: &PoolRegistry<Backend>) {
    println!("1. Extend mode:");
    let descriptor = ResourceDescriptor::new("burst")
        .with_max_size(2)
        .with_wait_timeout(Duration::from_millis(50))
        .with_extend_mode(0.5);
    let pool = registry.get_or_create(&descriptor).unwrap();

    let mut held = Vec::new();
    for i in 0..4 {
        match pool.checkout(&format!("user-{i}")) {
            Ok(h) => held.push(h),
            Err(e) => println!("   user-{i}: {e}"),
        }
    }
    println!("   Pool size with extension: {}", pool.size());
    println!("   Health: {:?}\n", pool.health_status().warnings);
}

fn reaper(registry: &PoolRegistry<Backend>) {
    println!("2. Reaper:");
    let descriptor = ResourceDescriptor::new("idle")
        .with_min_size(1)
        .with_max_size(5)
        .with_live_and_unused(Duration::from_millis(50))
        .with_shrink(Duration::from_millis(100), 2);
    let pool = registry.get_or_create(&descriptor).unwrap();

    let handles: Vec<_> = (0..5).map(|i| pool.checkout(&format!("u{i}")).unwrap()).collect();
    drop(handles);
    println!("   Size after burst: {}", pool.size());
    thread::sleep(Duration::from_millis(500));
    println!("   Size after reaping: {}\n", pool.size());
}

fn live_update(registry: &PoolRegistry<Backend>) {
    println!("3. Live configuration update:");
    let pool = registry.get_or_create(&ResourceDescriptor::new("tunable")).unwrap();

    let update = DescriptorUpdate::from_properties([("max_size", "20"), ("wait_timeout", "250")]).unwrap();
    pool.update(&update).unwrap();
    println!("   max_size is now {}", pool.descriptor().max_size);

    match DescriptorUpdate::from_properties([("max_size", "many")]) {
        Ok(_) => println!("   Unexpectedly parsed"),
        Err(e) => println!("   Rejected: {e}"),
    }
    println!();
}

fn creation_failures(registry: &PoolRegistry<Backend>) {
    println!("4. Creation failures:");
    let descriptor = ResourceDescriptor::new("offline").with_wait_timeout(Duration::from_millis(120));
    let pool = registry.get_or_create(&descriptor).unwrap();
    match pool.checkout("hopeful") {
        Ok(_) => println!("   Unexpected success"),
        Err(e) => println!("   {e}"),
    }
    println!();
}

fn prometheus_export(registry: &PoolRegistry<Backend>) {
    println!("5. Prometheus Metrics Export:");
    let mut tags = std::collections::HashMap::new();
    tags.insert("service".to_string(), "example".to_string());
    match registry.export_prometheus(Some(&tags)) {
        Ok(text) => println!("{}", text),
        Err(e) => println!("   Export failed: {e}"),
    }
}
