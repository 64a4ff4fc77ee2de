//! Behavioural properties of the pool, driven through the public API

use parking_lot::Mutex;
use resource_pool::statistics::counters;
use resource_pool::{
    CancellationToken, CheckoutOptions, ContainerState, Pool, PoolError, ResourceDescriptor,
    ResourceFactory,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, thiserror::Error)]
#[error("backend unavailable")]
struct Unavailable;

#[derive(Default)]
struct TrackingFactory {
    next: AtomicUsize,
    close_counts: Mutex<HashMap<usize, usize>>,
    broken: Mutex<HashSet<usize>>,
    slow_close: AtomicBool,
}

impl TrackingFactory {
    fn created(&self) -> usize {
        self.next.load(Ordering::SeqCst)
    }

    fn close_counts(&self) -> HashMap<usize, usize> {
        self.close_counts.lock().clone()
    }

    fn break_resource(&self, id: usize) {
        self.broken.lock().insert(id);
    }
}

impl ResourceFactory for TrackingFactory {
    type Resource = usize;
    type Error = Unavailable;

    fn create(&self, _descriptor: &ResourceDescriptor) -> Result<usize, Unavailable> {
        Ok(self.next.fetch_add(1, Ordering::SeqCst))
    }

    fn close(&self, resource: &usize) -> Result<(), Unavailable> {
        if self.slow_close.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(20));
        }
        *self.close_counts.lock().entry(*resource).or_default() += 1;
        Ok(())
    }

    fn is_healthy(&self, resource: &usize) -> bool {
        !self.broken.lock().contains(resource)
    }
}

fn pool_with(descriptor: ResourceDescriptor) -> (Arc<Pool<TrackingFactory>>, Arc<TrackingFactory>) {
    let factory = Arc::new(TrackingFactory::default());
    let pool = Pool::new(descriptor, Arc::clone(&factory)).unwrap();
    (Arc::new(pool), factory)
}

#[test]
fn test_concurrent_checkouts_never_share_a_container() {
    let (pool, _) = pool_with(
        ResourceDescriptor::new("stress")
            .with_max_size(4)
            .with_wait_timeout(Duration::from_secs(10))
            .with_extend_mode(0.5),
    );
    let in_use = Arc::new(Mutex::new(HashSet::new()));
    let extend_max = pool.descriptor().extend_max_size();

    let workers: Vec<_> = (0..12)
        .map(|w| {
            let pool = Arc::clone(&pool);
            let in_use = Arc::clone(&in_use);
            thread::spawn(move || {
                for i in 0..25 {
                    let handle = pool.checkout(&format!("w{w}-{i}")).unwrap();
                    let id = handle.container_id();
                    assert!(in_use.lock().insert(id), "container {id} handed out twice");
                    assert!(pool.size() <= extend_max);
                    thread::sleep(Duration::from_micros(200));
                    assert!(in_use.lock().remove(&id));
                    handle.release().unwrap();
                }
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }

    let stats = pool.resource_statistics();
    let ids: HashSet<_> = stats.iter().map(|s| s.id).collect();
    assert_eq!(ids.len(), stats.len());
    assert!(stats.iter().all(|s| s.state == ContainerState::Idle));
    assert!(pool.size() <= extend_max);
    assert_eq!(pool.statistics().get(counters::SUCCESSES), 12 * 25);
}

#[test]
fn test_exhausted_pool_times_out_on_schedule() {
    let wait = Duration::from_millis(200);
    let (pool, _) = pool_with(
        ResourceDescriptor::new("bounded")
            .with_max_size(3)
            .with_wait_timeout(wait),
    );
    let _held: Vec<_> = (0..3).map(|i| pool.checkout(&format!("u{i}")).unwrap()).collect();

    let start = Instant::now();
    let err = pool.checkout("overflow").unwrap_err();
    let elapsed = start.elapsed();

    assert!(err.is_timeout());
    assert!(elapsed >= wait, "failed early after {elapsed:?}");
    assert!(elapsed < wait + Duration::from_millis(150), "failed late after {elapsed:?}");
    assert_eq!(pool.size(), 3);
}

#[test]
fn test_extend_mode_allows_fifty_percent_overflow() {
    let (pool, factory) = pool_with(
        ResourceDescriptor::new("elastic")
            .with_max_size(10)
            .with_wait_timeout(Duration::from_millis(20))
            .with_extend_mode(0.5),
    );
    let mut held: Vec<_> = (0..10).map(|i| pool.checkout(&format!("base-{i}")).unwrap()).collect();

    for i in 0..5 {
        held.push(pool.checkout(&format!("extra-{i}")).unwrap());
    }
    assert_eq!(pool.size(), 15);
    assert_eq!(pool.statistics().get(counters::EXTENDED_CREATIONS), 5);

    let err = pool.checkout("sixteenth").unwrap_err();
    assert!(matches!(err, PoolError::AdmissionTimeout { .. }));
    assert_eq!(factory.created(), 15);
}

#[test]
fn test_shrink_cycles_stop_at_min_size() {
    let (pool, _) = pool_with(
        ResourceDescriptor::new("shrinking")
            .with_min_size(2)
            .with_max_size(10)
            .with_live_and_unused(Duration::from_millis(30))
            .with_shrink(Duration::from_secs(3600), 3),
    );
    let held: Vec<_> = (0..10).map(|i| pool.checkout(&format!("u{i}")).unwrap()).collect();
    drop(held);
    thread::sleep(Duration::from_millis(60));

    let mut sizes = Vec::new();
    for _ in 0..5 {
        let report = pool.run_maintenance();
        assert!(report.shrink_evicted <= 3);
        sizes.push(pool.size());
    }
    assert_eq!(sizes, vec![7, 4, 2, 2, 2]);
}

#[test]
fn test_recently_used_containers_survive_shrink() {
    let (pool, _) = pool_with(
        ResourceDescriptor::new("warm")
            .with_max_size(4)
            .with_live_and_unused(Duration::from_secs(60))
            .with_shrink(Duration::from_secs(3600), 0),
    );
    let held: Vec<_> = (0..4).map(|i| pool.checkout(&format!("u{i}")).unwrap()).collect();
    drop(held);
    assert_eq!(pool.run_maintenance().shrink_evicted, 0);
    assert_eq!(pool.size(), 4);
}

#[test]
fn test_unhealthy_container_evicted_below_min_and_recreated() {
    let (pool, factory) = pool_with(
        ResourceDescriptor::new("healing")
            .with_min_size(1)
            .with_max_size(2),
    );
    factory.break_resource(0);

    let report = pool.run_maintenance();
    assert_eq!(report.health_evicted, 1);
    assert_eq!(pool.size(), 0);
    assert_eq!(factory.close_counts().get(&0), Some(&1));

    let handle = pool.checkout("next").unwrap();
    assert_eq!(*handle.resource().unwrap(), 1);
    assert_eq!(pool.statistics().get(counters::HEALTH_EVICTIONS), 1);
}

#[test]
fn test_single_slot_end_to_end() {
    let (pool, _) = pool_with(
        ResourceDescriptor::new("single")
            .with_min_size(1)
            .with_max_size(1)
            .with_wait_timeout(Duration::from_millis(2000)),
    );

    let start = Instant::now();
    let a = pool.checkout("a").unwrap();
    assert!(start.elapsed() < Duration::from_millis(100));

    let start = Instant::now();
    let err = pool.checkout("b").unwrap_err();
    let waited = start.elapsed();
    assert_eq!(
        err,
        PoolError::AdmissionTimeout {
            pool: "single".to_string(),
            user: "b".to_string(),
            timeout: Duration::from_millis(2000),
        }
    );
    assert!(waited >= Duration::from_millis(2000));
    assert!(waited < Duration::from_millis(2500));

    a.release().unwrap();
    a.release().unwrap();

    let start = Instant::now();
    let c = pool.checkout("c").unwrap();
    assert!(start.elapsed() < Duration::from_millis(100));
    assert_eq!(c.owner().unwrap(), "c");
    assert_eq!(pool.size(), 1);
}

#[test]
fn test_shutdown_fails_waiters_and_closes_each_container_once() {
    let (pool, factory) = pool_with(
        ResourceDescriptor::new("closing")
            .with_min_size(2)
            .with_max_size(3)
            .with_wait_timeout(Duration::from_secs(30)),
    );
    let held: Vec<_> = (0..3).map(|i| pool.checkout(&format!("u{i}")).unwrap()).collect();
    held[2].release().unwrap();
    let held: Vec<_> = held.into_iter().take(2).collect();
    let _third = pool.checkout("u2-again").unwrap();

    let waiter = {
        let pool = Arc::clone(&pool);
        thread::spawn(move || {
            let start = Instant::now();
            (pool.checkout("late"), start.elapsed())
        })
    };
    thread::sleep(Duration::from_millis(50));

    factory.slow_close.store(true, Ordering::SeqCst);
    let shutdown_started = Instant::now();
    pool.shutdown();
    let (result, _) = waiter.join().unwrap();
    assert!(matches!(result, Err(PoolError::ShuttingDown { .. })));
    assert!(shutdown_started.elapsed() < Duration::from_secs(5));

    let start = Instant::now();
    assert!(matches!(pool.checkout("after"), Err(PoolError::ShuttingDown { .. })));
    assert!(start.elapsed() < Duration::from_millis(50));

    drop(held);
    pool.shutdown();
    let counts = factory.close_counts();
    assert_eq!(counts.len(), factory.created());
    assert!(counts.values().all(|&n| n == 1));
}

#[test]
fn test_explicit_deadline_overrides_wait_timeout() {
    let (pool, _) = pool_with(
        ResourceDescriptor::new("deadline")
            .with_max_size(1)
            .with_wait_timeout(Duration::from_secs(30)),
    );
    let _held = pool.checkout("a").unwrap();

    let start = Instant::now();
    let options = CheckoutOptions::new().with_timeout(Duration::from_millis(80));
    assert!(pool.checkout_with("b", &options).unwrap_err().is_timeout());
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[test]
fn test_cancelled_token_fails_before_waiting() {
    let (pool, _) = pool_with(ResourceDescriptor::new("cancel").with_max_size(1));
    let _held = pool.checkout("a").unwrap();
    let token = CancellationToken::new();
    token.cancel();

    let options = CheckoutOptions::new().with_cancellation(token);
    let err = pool.checkout_with("b", &options).unwrap_err();
    assert_eq!(
        err,
        PoolError::Cancelled {
            pool: "cancel".to_string(),
            user: "b".to_string(),
        }
    );
}
