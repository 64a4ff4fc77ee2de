//! Pool-internal wrapper around one physical resource

use crate::errors::{PoolError, PoolResult};
use crate::health::{HealthCell, HealthState};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

pub type ContainerId = u64;

/// Which set a container sits in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "metrics", derive(serde::Serialize, serde::Deserialize))]
pub enum ContainerState {
    Idle,
    Busy,
}

/// Read-only view of a container's bookkeeping
#[derive(Debug, Clone)]
#[cfg_attr(feature = "metrics", derive(serde::Serialize, serde::Deserialize))]
pub struct ContainerStatistics {
    pub id: ContainerId,
    pub state: ContainerState,
    pub owner: Option<String>,
    pub health: HealthState,
    pub age: Duration,
    pub idle_for: Duration,
    pub checkouts: u64,
}

/// Owns one physical resource and tracks who holds it
pub(crate) struct Container<R> {
    id: ContainerId,
    pool: String,
    resource: R,
    health: HealthCell,
    owner: Mutex<Option<String>>,
    created_at: Instant,
    last_used: Mutex<Instant>,
    checkouts: AtomicU64,
    destroyed: AtomicBool,
}

impl<R> Container<R> {
    pub fn new(id: ContainerId, pool: &str, resource: R) -> Self {
        let now = Instant::now();
        Self {
            id,
            pool: pool.to_string(),
            resource,
            health: HealthCell::new(),
            owner: Mutex::new(None),
            created_at: now,
            last_used: Mutex::new(now),
            checkouts: AtomicU64::new(0),
            destroyed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> ContainerId {
        self.id
    }

    pub fn pool(&self) -> &str {
        &self.pool
    }

    pub fn resource(&self) -> &R {
        &self.resource
    }

    pub fn health(&self) -> &HealthCell {
        &self.health
    }

    /// Hand the container to `owner`; refuses a second owner
    pub fn assign(&self, owner: &str) -> PoolResult<()> {
        let mut current = self.owner.lock();
        if let Some(existing) = current.as_ref() {
            return Err(PoolError::AlreadyInitialized(existing.clone()));
        }
        *current = Some(owner.to_string());
        self.checkouts.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Clear the owner and stamp the last-used time
    pub fn unassign(&self) -> Option<String> {
        let previous = self.owner.lock().take();
        self.touch();
        previous
    }

    pub fn owner(&self) -> Option<String> {
        self.owner.lock().clone()
    }

    pub fn touch(&self) {
        *self.last_used.lock() = Instant::now();
    }

    pub fn last_used(&self) -> Instant {
        *self.last_used.lock()
    }

    /// Unused since before `cutoff`
    pub fn unused_since(&self, cutoff: Instant) -> bool {
        self.last_used() < cutoff
    }

    /// Probe through `check` unless the container is already dead
    pub fn check_health(&self, check: impl FnOnce(&R) -> bool) -> bool {
        self.health.probe(|| check(&self.resource))
    }

    /// Flip the destroyed flag; true only for the first caller
    pub fn mark_destroyed(&self) -> bool {
        !self.destroyed.swap(true, Ordering::AcqRel)
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    pub fn statistics(&self, state: ContainerState) -> ContainerStatistics {
        ContainerStatistics {
            id: self.id,
            state,
            owner: self.owner(),
            health: self.health.state(),
            age: self.created_at.elapsed(),
            idle_for: self.last_used().elapsed(),
            checkouts: self.checkouts.load(Ordering::Relaxed),
        }
    }
}

impl<R> std::fmt::Debug for Container<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("id", &self.id)
            .field("pool", &self.pool)
            .field("owner", &self.owner())
            .field("health", &self.health.state())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}
