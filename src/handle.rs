//! Caller-facing checkout token

use crate::container::{Container, ContainerId};
use crate::errors::{PoolError, PoolResult};
use crate::factory::ResourceFactory;
use crate::health::HealthState;
use crate::pool::PoolShared;

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

/// A checked-out container
///
/// Releasing returns the container to its pool. The first `release` closes
/// the handle; later calls are no-ops and every other accessor fails with
/// [`PoolError::HandleClosed`]. Dropping an open handle releases it.
pub struct Handle<F: ResourceFactory> {
    pool: Arc<PoolShared<F>>,
    container: Arc<Container<F::Resource>>,
    owner: Mutex<Option<String>>,
    closed: AtomicBool,
}

impl<F: ResourceFactory> Handle<F> {
    pub(crate) fn new(pool: Arc<PoolShared<F>>, container: Arc<Container<F::Resource>>) -> Self {
        Self {
            pool,
            container,
            owner: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Bind the handle to `owner` and run the factory's checkout hook
    pub(crate) fn init(&self, owner: &str) -> PoolResult<()> {
        let mut slot = self.owner.lock();
        if let Some(existing) = slot.as_ref() {
            return Err(PoolError::AlreadyInitialized(existing.clone()));
        }
        self.container.assign(owner)?;
        self.pool.factory.on_checkout(self.container.resource(), owner);
        *slot = Some(owner.to_string());
        Ok(())
    }

    fn ensure_open(&self) -> PoolResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(PoolError::HandleClosed)
        } else {
            Ok(())
        }
    }

    /// The pooled resource
    pub fn resource(&self) -> PoolResult<&F::Resource> {
        self.ensure_open()?;
        Ok(self.container.resource())
    }

    /// Run `f` against the pooled resource
    pub fn with<T>(&self, f: impl FnOnce(&F::Resource) -> T) -> PoolResult<T> {
        self.resource().map(f)
    }

    pub fn owner(&self) -> PoolResult<String> {
        self.ensure_open()?;
        self.owner.lock().clone().ok_or(PoolError::HandleClosed)
    }

    pub fn container_id(&self) -> ContainerId {
        self.container.id()
    }

    pub fn pool_name(&self) -> &str {
        self.container.pool()
    }

    /// Probe the container; a failed probe is sticky for its lifetime
    pub fn is_alive(&self) -> PoolResult<bool> {
        self.ensure_open()?;
        if self.container.is_destroyed() {
            return Ok(false);
        }
        let factory = &self.pool.factory;
        Ok(self.container.check_health(|r| factory.is_healthy(r)))
    }

    pub fn health(&self) -> PoolResult<HealthState> {
        self.ensure_open()?;
        Ok(self.container.health().state())
    }

    /// Flag the container as suspect; the next probe settles it
    pub fn report_failure(&self) -> PoolResult<()> {
        self.ensure_open()?;
        self.container.health().mark_suspect();
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Return the container to the pool; idempotent
    pub fn release(&self) -> PoolResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let owner = self.owner.lock().clone().unwrap_or_default();
        self.pool.checkin(self.container.id(), &owner)
    }
}

impl<F: ResourceFactory> Drop for Handle<F> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(
                pool = %self.container.pool(),
                container = self.container.id(),
                error = %e,
                "release on drop failed"
            );
        }
    }
}

impl<F: ResourceFactory> std::fmt::Debug for Handle<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("pool", &self.container.pool())
            .field("container", &self.container.id())
            .field("owner", &*self.owner.lock())
            .field("closed", &self.is_closed())
            .finish()
    }
}
