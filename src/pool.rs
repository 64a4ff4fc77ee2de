//! Pool: admission control, checkin and shutdown

use crate::cancel::{CancellationToken, Signal};
use crate::config::{DescriptorUpdate, ResourceDescriptor};
use crate::container::{Container, ContainerId, ContainerState, ContainerStatistics};
use crate::errors::{PoolError, PoolResult};
use crate::factory::ResourceFactory;
use crate::handle::Handle;
use crate::health::HealthStatus;
use crate::reaper::{Reaper, SweepReport};
use crate::statistics::{PoolStatistics, StatisticsRegistry, counters};

use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Back-off before retrying after the factory failed to create a resource
pub(crate) const CREATION_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Per-checkout overrides
///
/// # Examples
///
/// ```
/// use resource_pool::{CancellationToken, CheckoutOptions};
/// use std::time::Duration;
///
/// let token = CancellationToken::new();
/// let options = CheckoutOptions::new()
///     .with_timeout(Duration::from_millis(250))
///     .with_cancellation(token.clone());
///
/// assert!(options.deadline.is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CheckoutOptions {
    /// Replaces `now + wait_timeout` as the admission deadline
    pub deadline: Option<Instant>,

    /// Wakes the wait and fails the checkout with `Cancelled`
    pub cancel: Option<CancellationToken>,
}

impl CheckoutOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Idle and busy sets; `pending` counts creations running outside the lock
pub(crate) struct Membership<R> {
    pub idle: VecDeque<Arc<Container<R>>>,
    pub busy: HashMap<ContainerId, Arc<Container<R>>>,
    pub pending: usize,
}

impl<R> Membership<R> {
    fn new() -> Self {
        Self {
            idle: VecDeque::new(),
            busy: HashMap::new(),
            pending: 0,
        }
    }

    pub fn size(&self) -> usize {
        self.idle.len() + self.busy.len()
    }

    fn reserved(&self) -> usize {
        self.size() + self.pending
    }

    /// Pop idle containers, oldest first, until the pool holds at most `cap`
    pub fn take_surplus(&mut self, cap: usize) -> Vec<Arc<Container<R>>> {
        let mut surplus = Vec::new();
        while self.size() > cap {
            match self.idle.pop_front() {
                Some(container) => surplus.push(container),
                None => break,
            }
        }
        surplus
    }

    /// Empty both sets, returning every container that was tracked
    pub fn drain(&mut self) -> Vec<Arc<Container<R>>> {
        let mut all: Vec<_> = self.idle.drain(..).collect();
        all.extend(self.busy.drain().map(|(_, c)| c));
        all
    }
}

enum Attempt<F: ResourceFactory> {
    Acquired(Handle<F>),
    /// Full; `pending` when another thread's creation may still free a slot
    Exhausted { pending: bool },
    CreationFailed(PoolError),
}

/// State shared between the pool, its handles and its reaper
pub(crate) struct PoolShared<F: ResourceFactory> {
    pub name: String,
    pub descriptor: RwLock<ResourceDescriptor>,
    pub factory: Arc<F>,
    pub members: RwLock<Membership<F::Resource>>,
    pub statistics: StatisticsRegistry,
    pub signal: Arc<Signal>,
    pub shutting_down: AtomicBool,
    next_id: AtomicU64,
}

impl<F: ResourceFactory> PoolShared<F> {
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    fn shutting_down_error(&self) -> PoolError {
        PoolError::ShuttingDown {
            pool: self.name.clone(),
        }
    }

    fn new_container(&self, descriptor: &ResourceDescriptor) -> PoolResult<Container<F::Resource>> {
        match self.factory.create(descriptor) {
            Ok(resource) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                self.statistics.increment(counters::CREATIONS);
                debug!(pool = %self.name, container = id, "created container");
                Ok(Container::new(id, &self.name, resource))
            }
            Err(e) => {
                self.statistics.increment(counters::CREATION_FAILURES);
                warn!(pool = %self.name, error = %e, "failed to create resource");
                Err(PoolError::Creation {
                    pool: self.name.clone(),
                    message: e.to_string(),
                })
            }
        }
    }

    /// Close a container's resource; a second call for the same container is a no-op
    pub fn destroy(&self, container: &Container<F::Resource>) {
        if !container.mark_destroyed() {
            return;
        }
        container.health().kill();
        match self.factory.close(container.resource()) {
            Ok(()) => {
                self.statistics.increment(counters::DESTRUCTIONS);
                debug!(pool = %self.name, container = container.id(), "destroyed container");
            }
            Err(e) => {
                self.statistics.increment(counters::DESTROY_FAILURES);
                warn!(
                    pool = %self.name,
                    container = container.id(),
                    error = %e,
                    "failed to close resource"
                );
            }
        }
    }

    /// Empty both sets and close every container outside the lock
    pub fn drain_and_close(&self) -> usize {
        let drained = self.members.write().drain();
        self.signal.notify();
        for container in &drained {
            self.destroy(container);
        }
        drained.len()
    }

    fn record_size(&self, members: &Membership<F::Resource>) {
        self.statistics
            .record(counters::PEAK_SIZE, members.size() as i64);
        self.statistics
            .record(counters::PEAK_BUSY, members.busy.len() as i64);
    }

    /// One admission attempt: reuse an idle container or create one while
    /// the pool holds fewer than `limit` containers
    fn attempt(self: &Arc<Self>, user: &str, limit: usize, started: Instant) -> Attempt<F> {
        let (max_size, cap) = {
            let descriptor = self.descriptor.read();
            (descriptor.max_size, descriptor.extend_max_size())
        };
        self.trim_surplus(cap);

        let mut dead = Vec::new();
        let mut members = self.members.write();
        if self.is_shutting_down() {
            return Attempt::CreationFailed(self.shutting_down_error());
        }

        while let Some(container) = members.idle.pop_back() {
            if container.health().is_dead() {
                dead.push(container);
                continue;
            }
            members.busy.insert(container.id(), Arc::clone(&container));
            self.record_size(&members);
            drop(members);
            self.evict_dead(dead);
            return self.hand_out(container, user, started);
        }

        if members.reserved() >= limit {
            let pending = members.pending > 0;
            drop(members);
            self.evict_dead(dead);
            return Attempt::Exhausted { pending };
        }

        let extended = members.reserved() >= max_size;
        members.pending += 1;
        drop(members);
        self.evict_dead(dead);

        let descriptor = self.descriptor.read().clone();
        let created = self.new_container(&descriptor);

        let mut members = self.members.write();
        members.pending -= 1;
        let container = match created {
            Ok(container) => Arc::new(container),
            Err(e) => return Attempt::CreationFailed(e),
        };
        if self.is_shutting_down() {
            drop(members);
            self.destroy(&container);
            return Attempt::CreationFailed(self.shutting_down_error());
        }
        members.busy.insert(container.id(), Arc::clone(&container));
        self.record_size(&members);
        drop(members);

        if extended {
            self.statistics.increment(counters::EXTENDED_CREATIONS);
            info!(
                pool = %self.name,
                user = %user,
                container = container.id(),
                "extended pool beyond max_size"
            );
        }
        self.hand_out(container, user, started)
    }

    /// Close the oldest idle containers while the pool holds more than `cap`,
    /// which happens after an update lowers `max_size`
    pub fn trim_surplus(&self, cap: usize) -> usize {
        let surplus = {
            let mut members = self.members.write();
            if members.size() <= cap {
                return 0;
            }
            members.take_surplus(cap)
        };
        for container in &surplus {
            self.statistics.increment(counters::SHRINK_EVICTIONS);
            self.destroy(container);
        }
        if !surplus.is_empty() {
            debug!(
                pool = %self.name,
                trimmed = surplus.len(),
                cap,
                "trimmed containers above capacity"
            );
        }
        surplus.len()
    }

    fn evict_dead(&self, dead: Vec<Arc<Container<F::Resource>>>) {
        if dead.is_empty() {
            return;
        }
        for container in dead {
            self.statistics.increment(counters::HEALTH_EVICTIONS);
            debug!(pool = %self.name, container = container.id(), "dropping dead idle container");
            self.destroy(&container);
        }
        self.signal.notify();
    }

    fn hand_out(
        self: &Arc<Self>,
        container: Arc<Container<F::Resource>>,
        user: &str,
        started: Instant,
    ) -> Attempt<F> {
        let handle = Handle::new(Arc::clone(self), container);
        if let Err(e) = handle.init(user) {
            // dropping the handle puts the container back
            return Attempt::CreationFailed(PoolError::InvariantViolation(e.to_string()));
        }
        if self.is_shutting_down() {
            // drained while the checkout hook ran; dropping the handle is a no-op checkin
            debug!(pool = %self.name, user = %user, "checkout abandoned by shutdown");
            return Attempt::CreationFailed(self.shutting_down_error());
        }
        self.statistics.increment(counters::SUCCESSES);
        self.statistics
            .record(counters::WAIT_TIME_MS, started.elapsed().as_millis() as i64);
        debug!(
            pool = %self.name,
            user = %user,
            container = handle.container_id(),
            "checked out"
        );
        Attempt::Acquired(handle)
    }

    fn check_admissible(&self, user: &str, cancel: Option<&CancellationToken>) -> PoolResult<()> {
        if self.is_shutting_down() {
            return Err(self.shutting_down_error());
        }
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            self.statistics.increment(counters::CANCELLATIONS);
            debug!(pool = %self.name, user = %user, "checkout cancelled");
            return Err(PoolError::Cancelled {
                pool: self.name.clone(),
                user: user.to_string(),
            });
        }
        Ok(())
    }

    pub fn checkout(self: &Arc<Self>, user: &str, options: &CheckoutOptions) -> PoolResult<Handle<F>> {
        self.admit(user, options, true)
    }

    /// Admission loop; with `allow_extend` unset the pool never grows past `max_size`
    fn admit(
        self: &Arc<Self>,
        user: &str,
        options: &CheckoutOptions,
        allow_extend: bool,
    ) -> PoolResult<Handle<F>> {
        if self.is_shutting_down() {
            return Err(self.shutting_down_error());
        }
        self.statistics.increment(counters::REQUESTS);

        let started = Instant::now();
        let deadline = options
            .deadline
            .unwrap_or_else(|| started + self.descriptor.read().wait_timeout);
        let cancel = options.cancel.as_ref();
        if let Some(token) = cancel {
            token.register(&self.signal);
        }

        let mut last_failure;
        loop {
            let seen = self.signal.epoch();
            self.check_admissible(user, cancel)?;

            let max_size = self.descriptor.read().max_size;
            let wake_at = match self.attempt(user, max_size, started) {
                Attempt::Acquired(handle) => return Ok(handle),
                Attempt::Exhausted { pending } => {
                    last_failure = None;
                    if pending {
                        deadline.min(Instant::now() + CREATION_RETRY_INTERVAL)
                    } else {
                        deadline
                    }
                }
                Attempt::CreationFailed(e @ PoolError::ShuttingDown { .. }) => return Err(e),
                Attempt::CreationFailed(e) => {
                    last_failure = Some(e);
                    deadline.min(Instant::now() + CREATION_RETRY_INTERVAL)
                }
            };

            if Instant::now() >= deadline {
                break;
            }
            self.signal.wait_until(seen, wake_at);
        }

        self.check_admissible(user, cancel)?;

        let (extend_mode, extend_max_size) = {
            let descriptor = self.descriptor.read();
            (descriptor.extend_mode, descriptor.extend_max_size())
        };
        if extend_mode && allow_extend {
            match self.attempt(user, extend_max_size, started) {
                Attempt::Acquired(handle) => return Ok(handle),
                Attempt::CreationFailed(e @ PoolError::ShuttingDown { .. }) => return Err(e),
                Attempt::CreationFailed(e) => last_failure = Some(e),
                Attempt::Exhausted { .. } => {}
            }
        }

        if let Some(e) = last_failure {
            return Err(e);
        }

        let timeout = deadline.saturating_duration_since(started);
        self.statistics.increment(counters::TIMEOUTS);
        warn!(
            pool = %self.name,
            user = %user,
            timeout_ms = timeout.as_millis() as u64,
            "checkout timed out"
        );
        Err(PoolError::AdmissionTimeout {
            pool: self.name.clone(),
            user: user.to_string(),
            timeout,
        })
    }

    /// Move a container from busy back to idle
    pub fn checkin(&self, id: ContainerId, user: &str) -> PoolResult<()> {
        let cap = self.descriptor.read().extend_max_size();
        let mut members = self.members.write();
        let Some(container) = members.busy.remove(&id) else {
            drop(members);
            if self.is_shutting_down() {
                debug!(pool = %self.name, container = id, "checkin after shutdown ignored");
                return Ok(());
            }
            return Err(PoolError::InvariantViolation(format!(
                "container {id} of pool '{}' checked in by '{user}' is not busy",
                self.name
            )));
        };
        container.unassign();
        members.idle.push_back(container);
        let surplus = members.take_surplus(cap);
        drop(members);

        for container in &surplus {
            self.statistics.increment(counters::SHRINK_EVICTIONS);
            self.destroy(container);
        }

        self.statistics.increment(counters::CHECKINS);
        debug!(pool = %self.name, user = %user, container = id, "checked in");
        self.signal.notify();
        Ok(())
    }
}

/// Bounded pool of containers around resources produced by `F`
///
/// # Examples
///
/// ```
/// use resource_pool::{Pool, ResourceDescriptor, ResourceFactory};
/// use std::convert::Infallible;
/// use std::sync::Arc;
///
/// struct Numbers;
///
/// impl ResourceFactory for Numbers {
///     type Resource = u32;
///     type Error = Infallible;
///     fn create(&self, _: &ResourceDescriptor) -> Result<u32, Infallible> { Ok(7) }
///     fn close(&self, _: &u32) -> Result<(), Infallible> { Ok(()) }
/// }
///
/// let pool = Pool::new(ResourceDescriptor::new("numbers"), Arc::new(Numbers)).unwrap();
/// let handle = pool.checkout("alice").unwrap();
/// assert_eq!(*handle.resource().unwrap(), 7);
/// handle.release().unwrap();
/// assert_eq!(pool.idle_count(), 1);
/// ```
pub struct Pool<F: ResourceFactory> {
    shared: Arc<PoolShared<F>>,
    reaper: Mutex<Option<Reaper>>,
}

impl<F: ResourceFactory> Pool<F> {
    /// Validate the descriptor, pre-create `min_size` containers and start the reaper
    pub fn new(descriptor: ResourceDescriptor, factory: Arc<F>) -> PoolResult<Self> {
        let descriptor = descriptor.validate()?;
        warn_ignored_concurrency(&descriptor);

        let shared = Arc::new(PoolShared {
            name: descriptor.name.clone(),
            descriptor: RwLock::new(descriptor.clone()),
            factory,
            members: RwLock::new(Membership::new()),
            statistics: StatisticsRegistry::for_pool(),
            signal: Arc::new(Signal::new()),
            shutting_down: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
        });

        let mut warm = Vec::with_capacity(descriptor.min_size);
        for _ in 0..descriptor.min_size {
            match shared.new_container(&descriptor) {
                Ok(container) => warm.push(Arc::new(container)),
                Err(e) => {
                    for container in &warm {
                        shared.destroy(container);
                    }
                    return Err(e);
                }
            }
        }
        {
            let mut members = shared.members.write();
            members.idle.extend(warm);
            shared.record_size(&members);
        }

        let reaper = Reaper::spawn(Arc::downgrade(&shared), &shared.name).map_err(|e| {
            shared.drain_and_close();
            PoolError::Creation {
                pool: shared.name.clone(),
                message: format!("cannot start reaper: {e}"),
            }
        })?;

        info!(
            pool = %shared.name,
            min_size = descriptor.min_size,
            max_size = descriptor.max_size,
            "pool started"
        );
        Ok(Self {
            shared,
            reaper: Mutex::new(Some(reaper)),
        })
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Copy of the current descriptor
    pub fn descriptor(&self) -> ResourceDescriptor {
        self.shared.descriptor.read().clone()
    }

    /// Check out a container for `user`, waiting up to `wait_timeout`
    pub fn checkout(&self, user: &str) -> PoolResult<Handle<F>> {
        self.shared.checkout(user, &CheckoutOptions::default())
    }

    /// Check out with an explicit deadline and/or cancellation token
    pub fn checkout_with(&self, user: &str, options: &CheckoutOptions) -> PoolResult<Handle<F>> {
        self.shared.checkout(user, options)
    }

    /// Single admission attempt within `max_size`, never waiting
    pub fn try_checkout(&self, user: &str) -> PoolResult<Handle<F>> {
        let options = CheckoutOptions::new().with_deadline(Instant::now());
        self.shared.admit(user, &options, false)
    }

    /// Run the blocking checkout on tokio's blocking pool
    pub async fn checkout_async(&self, user: &str) -> PoolResult<Handle<F>> {
        let shared = Arc::clone(&self.shared);
        let owner = user.to_string();
        match tokio::task::spawn_blocking(move || shared.checkout(&owner, &CheckoutOptions::default()))
            .await
        {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Err(PoolError::Cancelled {
                pool: self.shared.name.clone(),
                user: user.to_string(),
            }),
        }
    }

    /// Apply the fields present in `update`; on error nothing changes
    pub fn update(&self, update: &DescriptorUpdate) -> PoolResult<()> {
        let cap = {
            let mut descriptor = self.shared.descriptor.write();
            let next = descriptor.merged(update)?;
            warn_ignored_concurrency(&next);
            info!(
                pool = %self.shared.name,
                max_size = next.max_size,
                extend_max_size = next.extend_max_size(),
                "pool configuration updated"
            );
            let cap = next.extend_max_size();
            *descriptor = next;
            cap
        };
        self.shared.trim_surplus(cap);
        self.shared.signal.notify();
        Ok(())
    }

    /// Run one reaper sweep on the calling thread
    pub fn run_maintenance(&self) -> SweepReport {
        self.shared.sweep()
    }

    /// Stop the reaper and close every container, idle or busy
    ///
    /// Busy containers are closed while their users may still hold handles;
    /// those handles report the container dead and their release is a no-op.
    pub fn shutdown(&self) {
        let first = !self.shared.shutting_down.swap(true, Ordering::AcqRel);
        if let Some(reaper) = self.reaper.lock().take() {
            reaper.stop();
        }
        let closed = self.shared.drain_and_close();
        if first {
            info!(pool = %self.shared.name, closed, "pool shut down");
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shared.is_shutting_down()
    }

    pub fn idle_count(&self) -> usize {
        self.shared.members.read().idle.len()
    }

    pub fn busy_count(&self) -> usize {
        self.shared.members.read().busy.len()
    }

    /// Idle plus busy containers
    pub fn size(&self) -> usize {
        self.shared.members.read().size()
    }

    pub fn statistics(&self) -> PoolStatistics {
        let mut stats = self.shared.statistics.snapshot(&self.shared.name);
        let members = self.shared.members.read();
        stats.idle = members.idle.len();
        stats.busy = members.busy.len();
        stats
    }

    /// Render this pool's statistics in Prometheus text format
    #[cfg(feature = "metrics")]
    pub fn export_metrics_prometheus(
        &self,
        tags: Option<&HashMap<String, String>>,
    ) -> Result<String, prometheus::Error> {
        crate::metrics::MetricsExporter::export_prometheus(&[self.statistics()], tags)
    }

    /// Per-container bookkeeping, idle containers first in eviction order
    pub fn resource_statistics(&self) -> Vec<ContainerStatistics> {
        let members = self.shared.members.read();
        let mut busy: Vec<_> = members
            .busy
            .values()
            .map(|c| c.statistics(ContainerState::Busy))
            .collect();
        busy.sort_by_key(|s| s.id);
        members
            .idle
            .iter()
            .map(|c| c.statistics(ContainerState::Idle))
            .chain(busy)
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn shared_for_tests(&self) -> &Arc<PoolShared<F>> {
        &self.shared
    }

    pub fn health_status(&self) -> HealthStatus {
        let (max_size, extend_max_size) = {
            let descriptor = self.shared.descriptor.read();
            (descriptor.max_size, descriptor.extend_max_size())
        };
        let members = self.shared.members.read();
        HealthStatus::new(
            members.idle.len(),
            members.busy.len(),
            max_size,
            extend_max_size,
            self.shared.is_shutting_down(),
        )
    }
}

impl<F: ResourceFactory> Drop for Pool<F> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<F: ResourceFactory> std::fmt::Debug for Pool<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.shared.name)
            .field("idle", &self.idle_count())
            .field("busy", &self.busy_count())
            .field("shutting_down", &self.is_shutting_down())
            .finish()
    }
}

fn warn_ignored_concurrency(descriptor: &ResourceDescriptor) {
    if descriptor.concurrent_users_per_container > 1 {
        warn!(
            pool = %descriptor.name,
            concurrent_users = descriptor.concurrent_users_per_container,
            "containers are single-owner; concurrent_users_per_container is ignored"
        );
    }
}
