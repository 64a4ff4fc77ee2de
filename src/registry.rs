//! Registry of pools keyed by descriptor name

use crate::config::ResourceDescriptor;
use crate::container::ContainerStatistics;
use crate::errors::{PoolError, PoolResult};
use crate::factory::ResourceFactory;
use crate::pool::Pool;
use crate::statistics::PoolStatistics;

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Owns one lazily created pool per descriptor name
///
/// Registries are ordinary values: construct one, pass it where it is
/// needed, and drop it (or call [`shutdown_all`](Self::shutdown_all)) to
/// close every pool it manages.
///
/// # Examples
///
/// ```
/// use resource_pool::{PoolRegistry, ResourceDescriptor, ResourceFactory};
/// use std::convert::Infallible;
///
/// struct Numbers;
///
/// impl ResourceFactory for Numbers {
///     type Resource = u32;
///     type Error = Infallible;
///     fn create(&self, _: &ResourceDescriptor) -> Result<u32, Infallible> { Ok(1) }
///     fn close(&self, _: &u32) -> Result<(), Infallible> { Ok(()) }
/// }
///
/// let registry = PoolRegistry::new(Numbers);
/// let pool = registry.get_or_create(&ResourceDescriptor::new("orders")).unwrap();
/// let again = registry.get_or_create(&ResourceDescriptor::new("orders")).unwrap();
/// assert!(std::sync::Arc::ptr_eq(&pool, &again));
/// assert_eq!(registry.list_pools(), vec!["orders".to_string()]);
/// ```
pub struct PoolRegistry<F: ResourceFactory> {
    factory: Arc<F>,
    pools: RwLock<HashMap<String, Arc<Pool<F>>>>,
}

impl<F: ResourceFactory> PoolRegistry<F> {
    pub fn new(factory: F) -> Self {
        Self::with_factory(Arc::new(factory))
    }

    pub fn with_factory(factory: Arc<F>) -> Self {
        Self {
            factory,
            pools: RwLock::new(HashMap::new()),
        }
    }

    /// Pool for `descriptor.name`, created from a copy of `descriptor` on first use
    ///
    /// The name alone identifies a pool. Once it exists, later descriptors
    /// with the same name and different tuning are ignored; use
    /// [`Pool::update`] to retune a running pool.
    pub fn get_or_create(&self, descriptor: &ResourceDescriptor) -> PoolResult<Arc<Pool<F>>> {
        if let Some(pool) = self.pools.read().get(&descriptor.name) {
            return Ok(existing(pool, descriptor));
        }

        let mut pools = self.pools.write();
        if let Some(pool) = pools.get(&descriptor.name) {
            return Ok(existing(pool, descriptor));
        }
        let pool = Arc::new(Pool::new(descriptor.clone(), Arc::clone(&self.factory))?);
        pools.insert(descriptor.name.clone(), Arc::clone(&pool));
        info!(pool = %descriptor.name, "registered pool");
        Ok(pool)
    }

    pub fn get(&self, name: &str) -> PoolResult<Arc<Pool<F>>> {
        self.pools
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| PoolError::UnknownPool(name.to_string()))
    }

    /// Names of every managed pool, sorted
    pub fn list_pools(&self) -> Vec<String> {
        let mut names: Vec<String> = self.pools.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn get_pool_statistics(&self, name: &str) -> PoolResult<PoolStatistics> {
        Ok(self.get(name)?.statistics())
    }

    pub fn get_resource_statistics(&self, name: &str) -> PoolResult<Vec<ContainerStatistics>> {
        Ok(self.get(name)?.resource_statistics())
    }

    /// Statistics of every pool, sorted by name
    pub fn all_statistics(&self) -> Vec<PoolStatistics> {
        let pools: Vec<Arc<Pool<F>>> = self.pools.read().values().cloned().collect();
        let mut stats: Vec<PoolStatistics> = pools.iter().map(|p| p.statistics()).collect();
        stats.sort_by(|a, b| a.pool.cmp(&b.pool));
        stats
    }

    /// Every pool's counters folded together by aggregation kind
    pub fn aggregate_statistics(&self) -> PoolStatistics {
        let mut total = PoolStatistics {
            pool: "*".to_string(),
            ..PoolStatistics::default()
        };
        for stats in self.all_statistics() {
            total.merge(&stats);
        }
        total
    }

    /// Render every pool's statistics in Prometheus text format
    #[cfg(feature = "metrics")]
    pub fn export_prometheus(
        &self,
        tags: Option<&HashMap<String, String>>,
    ) -> Result<String, prometheus::Error> {
        crate::metrics::MetricsExporter::export_prometheus(&self.all_statistics(), tags)
    }

    /// Remove and shut down one pool
    pub fn shutdown(&self, name: &str) -> PoolResult<()> {
        let pool = self
            .pools
            .write()
            .remove(name)
            .ok_or_else(|| PoolError::UnknownPool(name.to_string()))?;
        pool.shutdown();
        Ok(())
    }

    /// Remove and shut down every pool
    pub fn shutdown_all(&self) {
        let pools: Vec<Arc<Pool<F>>> = self.pools.write().drain().map(|(_, p)| p).collect();
        if pools.is_empty() {
            return;
        }
        info!(count = pools.len(), "shutting down all pools");
        for pool in pools {
            pool.shutdown();
        }
    }
}

impl<F: ResourceFactory> Drop for PoolRegistry<F> {
    fn drop(&mut self) {
        self.shutdown_all();
    }
}

fn existing<F: ResourceFactory>(pool: &Arc<Pool<F>>, requested: &ResourceDescriptor) -> Arc<Pool<F>> {
    if pool.descriptor() != *requested {
        debug!(
            pool = %requested.name,
            "pool already registered; ignoring differing descriptor"
        );
    }
    Arc::clone(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statistics::counters;
    use crate::testing::CountingFactory;
    use std::thread;

    #[test]
    fn test_descriptor_is_copied() {
        let registry = PoolRegistry::new(CountingFactory::new());
        let mut descriptor = ResourceDescriptor::new("a").with_max_size(3);
        let pool = registry.get_or_create(&descriptor).unwrap();
        descriptor.max_size = 99;
        assert_eq!(pool.descriptor().max_size, 3);
    }

    #[test]
    fn test_name_identifies_pool() {
        let registry = PoolRegistry::new(CountingFactory::new());
        let first = registry
            .get_or_create(&ResourceDescriptor::new("a").with_max_size(3))
            .unwrap();
        let second = registry
            .get_or_create(&ResourceDescriptor::new("a").with_max_size(8))
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.descriptor().max_size, 3);
        assert_eq!(registry.list_pools(), vec!["a".to_string()]);
    }

    #[test]
    fn test_concurrent_get_or_create_builds_one_pool() {
        let registry = Arc::new(PoolRegistry::new(CountingFactory::new()));
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    registry
                        .get_or_create(&ResourceDescriptor::new("shared").with_min_size(1))
                        .unwrap()
                })
            })
            .collect();
        let pools: Vec<_> = workers.into_iter().map(|w| w.join().unwrap()).collect();
        assert!(pools.iter().all(|p| Arc::ptr_eq(p, &pools[0])));
        assert_eq!(registry.factory.created(), 1);
    }

    #[test]
    fn test_invalid_descriptor_is_not_registered() {
        let registry = PoolRegistry::new(CountingFactory::new());
        let err = registry
            .get_or_create(&ResourceDescriptor::new("bad").with_max_size(0))
            .unwrap_err();
        assert!(matches!(err, PoolError::Configuration(_)));
        assert!(registry.list_pools().is_empty());
    }

    #[test]
    fn test_shutdown_one() {
        let registry = PoolRegistry::new(CountingFactory::new());
        let a = registry.get_or_create(&ResourceDescriptor::new("a")).unwrap();
        registry.get_or_create(&ResourceDescriptor::new("b")).unwrap();

        registry.shutdown("a").unwrap();
        assert!(a.is_shutting_down());
        assert_eq!(registry.list_pools(), vec!["b".to_string()]);
        assert_eq!(
            registry.shutdown("a").unwrap_err(),
            PoolError::UnknownPool("a".to_string())
        );
    }

    #[test]
    fn test_shutdown_all() {
        let registry = PoolRegistry::new(CountingFactory::new());
        let a = registry.get_or_create(&ResourceDescriptor::new("a").with_min_size(1)).unwrap();
        let b = registry.get_or_create(&ResourceDescriptor::new("b").with_min_size(1)).unwrap();
        registry.shutdown_all();
        assert!(a.is_shutting_down() && b.is_shutting_down());
        assert!(registry.list_pools().is_empty());
        assert_eq!(registry.factory.closed(), 2);
    }

    #[test]
    fn test_statistics_lookup_and_aggregation() {
        let registry = PoolRegistry::new(CountingFactory::new());
        let a = registry.get_or_create(&ResourceDescriptor::new("a")).unwrap();
        let b = registry.get_or_create(&ResourceDescriptor::new("b")).unwrap();
        let _a1 = a.checkout("x").unwrap();
        let _a2 = a.checkout("y").unwrap();
        let _b1 = b.checkout("z").unwrap();

        assert_eq!(registry.get_pool_statistics("a").unwrap().busy, 2);
        assert_eq!(registry.get_resource_statistics("b").unwrap().len(), 1);
        assert!(matches!(
            registry.get_pool_statistics("nope"),
            Err(PoolError::UnknownPool(_))
        ));

        let total = registry.aggregate_statistics();
        assert_eq!(total.busy, 3);
        assert_eq!(total.get(counters::SUCCESSES), 3);
        assert_eq!(total.get(counters::PEAK_BUSY), 2);
    }
}
