//! Named per-pool counters with an aggregation kind

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Names of the counters every pool maintains
pub mod counters {
    pub const REQUESTS: &str = "requests";
    pub const SUCCESSES: &str = "successes";
    pub const TIMEOUTS: &str = "timeouts";
    pub const CANCELLATIONS: &str = "cancellations";
    pub const CREATIONS: &str = "creations";
    pub const CREATION_FAILURES: &str = "creation_failures";
    pub const EXTENDED_CREATIONS: &str = "extended_creations";
    pub const DESTRUCTIONS: &str = "destructions";
    pub const DESTROY_FAILURES: &str = "destroy_failures";
    pub const CHECKINS: &str = "checkins";
    pub const HEALTH_EVICTIONS: &str = "health_evictions";
    pub const SHRINK_EVICTIONS: &str = "shrink_evictions";
    pub const PEAK_SIZE: &str = "peak_size";
    pub const PEAK_BUSY: &str = "peak_busy";
    pub const WAIT_TIME_MS: &str = "wait_time_ms";
}

/// How recorded values fold into a counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "metrics", derive(serde::Serialize, serde::Deserialize))]
pub enum Aggregation {
    /// Running total
    Sum,
    /// Running maximum
    HighWater,
    /// Running minimum
    LowWater,
    /// Running mean of recorded samples
    Average,
}

/// A single counter; independently synchronized from pool membership
#[derive(Debug)]
pub struct Counter {
    kind: Aggregation,
    value: AtomicI64,
    samples: AtomicU64,
}

impl Counter {
    pub fn new(kind: Aggregation) -> Self {
        let initial = match kind {
            Aggregation::LowWater => i64::MAX,
            _ => 0,
        };
        Self {
            kind,
            value: AtomicI64::new(initial),
            samples: AtomicU64::new(0),
        }
    }

    pub fn kind(&self) -> Aggregation {
        self.kind
    }

    pub fn increment(&self) {
        self.record(1);
    }

    /// Sum counters go down by one; other kinds record -1
    pub fn decrement(&self) {
        self.record(-1);
    }

    /// Fold `value` into the counter according to its kind
    pub fn record(&self, value: i64) {
        match self.kind {
            Aggregation::Sum | Aggregation::Average => {
                self.value.fetch_add(value, Ordering::Relaxed);
            }
            Aggregation::HighWater => {
                self.value.fetch_max(value, Ordering::Relaxed);
            }
            Aggregation::LowWater => {
                self.value.fetch_min(value, Ordering::Relaxed);
            }
        }
        self.samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn samples(&self) -> u64 {
        self.samples.load(Ordering::Relaxed)
    }

    /// Current aggregate; 0 for min/mean counters that saw no samples
    pub fn value(&self) -> i64 {
        let raw = self.value.load(Ordering::Relaxed);
        let samples = self.samples();
        match self.kind {
            Aggregation::Sum | Aggregation::HighWater => raw,
            Aggregation::LowWater if samples == 0 => 0,
            Aggregation::LowWater => raw,
            Aggregation::Average if samples == 0 => 0,
            Aggregation::Average => raw / samples as i64,
        }
    }

    pub fn snapshot(&self) -> Statistic {
        Statistic {
            kind: self.kind,
            value: self.value(),
            samples: self.samples(),
        }
    }
}

/// Point-in-time value of one counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "metrics", derive(serde::Serialize, serde::Deserialize))]
pub struct Statistic {
    pub kind: Aggregation,
    pub value: i64,
    pub samples: u64,
}

impl Statistic {
    /// Combine two readings of the same counter from different pools
    pub fn merge(self, other: Statistic) -> Statistic {
        let samples = self.samples + other.samples;
        let value = match self.kind {
            Aggregation::Sum => self.value + other.value,
            Aggregation::HighWater => self.value.max(other.value),
            Aggregation::LowWater => match (self.samples, other.samples) {
                (0, _) => other.value,
                (_, 0) => self.value,
                _ => self.value.min(other.value),
            },
            Aggregation::Average if samples == 0 => 0,
            Aggregation::Average => {
                let total = self.value as i128 * self.samples as i128
                    + other.value as i128 * other.samples as i128;
                (total / samples as i128) as i64
            }
        };
        Statistic {
            kind: self.kind,
            value,
            samples,
        }
    }
}

/// Snapshot of one pool's statistics
///
/// # Examples
///
/// ```
/// use resource_pool::StatisticsRegistry;
/// use resource_pool::statistics::counters;
///
/// let registry = StatisticsRegistry::for_pool();
/// registry.increment(counters::REQUESTS);
/// registry.record(counters::PEAK_SIZE, 4);
/// registry.record(counters::PEAK_SIZE, 2);
///
/// let stats = registry.snapshot("warehouse");
/// assert_eq!(stats.get(counters::REQUESTS), 1);
/// assert_eq!(stats.get(counters::PEAK_SIZE), 4);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "metrics", derive(serde::Serialize, serde::Deserialize))]
pub struct PoolStatistics {
    pub pool: String,
    pub idle: usize,
    pub busy: usize,
    pub counters: BTreeMap<String, Statistic>,
}

impl PoolStatistics {
    /// Counter value, 0 when the counter does not exist
    pub fn get(&self, name: &str) -> i64 {
        self.counters.get(name).map(|s| s.value).unwrap_or(0)
    }

    /// Fold another pool's snapshot into this one
    pub fn merge(&mut self, other: &PoolStatistics) {
        self.idle += other.idle;
        self.busy += other.busy;
        for (name, stat) in &other.counters {
            self.counters
                .entry(name.clone())
                .and_modify(|mine| *mine = mine.merge(*stat))
                .or_insert(*stat);
        }
    }
}

/// Per-pool mapping from counter name to counter
#[derive(Debug, Default)]
pub struct StatisticsRegistry {
    counters: DashMap<String, Arc<Counter>>,
}

impl StatisticsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the standard pool counters
    pub fn for_pool() -> Self {
        let registry = Self::new();
        for name in [
            counters::REQUESTS,
            counters::SUCCESSES,
            counters::TIMEOUTS,
            counters::CANCELLATIONS,
            counters::CREATIONS,
            counters::CREATION_FAILURES,
            counters::EXTENDED_CREATIONS,
            counters::DESTRUCTIONS,
            counters::DESTROY_FAILURES,
            counters::CHECKINS,
            counters::HEALTH_EVICTIONS,
            counters::SHRINK_EVICTIONS,
        ] {
            registry.register(name, Aggregation::Sum);
        }
        registry.register(counters::PEAK_SIZE, Aggregation::HighWater);
        registry.register(counters::PEAK_BUSY, Aggregation::HighWater);
        registry.register(counters::WAIT_TIME_MS, Aggregation::Average);
        registry
    }

    /// Register a counter, returning the existing one if the name is taken
    pub fn register(&self, name: &str, kind: Aggregation) -> Arc<Counter> {
        let entry = self
            .counters
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Counter::new(kind)));
        Arc::clone(entry.value())
    }

    pub fn counter(&self, name: &str) -> Option<Arc<Counter>> {
        self.counters.get(name).map(|c| Arc::clone(c.value()))
    }

    pub fn increment(&self, name: &str) {
        if let Some(counter) = self.counters.get(name) {
            counter.increment();
        }
    }

    pub fn decrement(&self, name: &str) {
        if let Some(counter) = self.counters.get(name) {
            counter.decrement();
        }
    }

    pub fn record(&self, name: &str, value: i64) {
        if let Some(counter) = self.counters.get(name) {
            counter.record(value);
        }
    }

    pub fn value(&self, name: &str) -> Option<i64> {
        self.counters.get(name).map(|c| c.value().value())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.counters.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Snapshot every counter; membership gauges are left at zero
    pub fn snapshot(&self, pool: &str) -> PoolStatistics {
        PoolStatistics {
            pool: pool.to_string(),
            idle: 0,
            busy: 0,
            counters: self
                .counters
                .iter()
                .map(|e| (e.key().clone(), e.value().snapshot()))
                .collect(),
        }
    }
}
