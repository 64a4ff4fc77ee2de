//! Background maintenance: health sweeps and shrinking toward `min_size`

use crate::eviction::{ShrinkPolicy, take_shrinkable, take_unhealthy};
use crate::factory::ResourceFactory;
use crate::pool::PoolShared;
use crate::statistics::counters;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Weak;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, info};

/// Containers removed by one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub health_evicted: usize,
    pub shrink_evicted: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.health_evicted + self.shrink_evicted
    }
}

impl<F: ResourceFactory> PoolShared<F> {
    /// Health pass then shrink pass under the membership lock; the
    /// evicted containers are closed after the lock is released
    pub(crate) fn sweep(&self) -> SweepReport {
        if self.is_shutting_down() {
            self.drain_and_close();
            return SweepReport::default();
        }

        let (policy, cap) = {
            let descriptor = self.descriptor.read();
            (ShrinkPolicy::from_descriptor(&descriptor), descriptor.extend_max_size())
        };
        let (unhealthy, shrunk) = {
            let mut members = self.members.write();
            let factory = &self.factory;
            let unhealthy = take_unhealthy(&mut members.idle, |r| factory.is_healthy(r));
            let busy = members.busy.len();
            let shrunk = match policy {
                Some(policy) => take_shrinkable(&mut members.idle, busy, &policy, Instant::now()),
                None => Vec::new(),
            };
            (unhealthy, shrunk)
        };

        let trimmed = self.trim_surplus(cap);
        let report = SweepReport {
            health_evicted: unhealthy.len(),
            shrink_evicted: shrunk.len() + trimmed,
        };
        if report.total() == 0 {
            return report;
        }

        for container in &unhealthy {
            self.statistics.increment(counters::HEALTH_EVICTIONS);
            self.destroy(container);
        }
        for container in &shrunk {
            self.statistics.increment(counters::SHRINK_EVICTIONS);
            self.destroy(container);
        }
        self.signal.notify();

        info!(
            pool = %self.name,
            health_evicted = report.health_evicted,
            shrink_evicted = report.shrink_evicted,
            "reaper sweep"
        );
        report
    }
}

/// Handle to the reaper thread of one pool
pub(crate) struct Reaper {
    stop: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl Reaper {
    pub fn spawn<F: ResourceFactory>(pool: Weak<PoolShared<F>>, name: &str) -> std::io::Result<Self> {
        let (stop, stopped) = channel::bounded(1);
        let thread = thread::Builder::new()
            .name(format!("reaper-{name}"))
            .spawn(move || run(pool, stopped))?;
        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }

    /// Signal the thread and wait for it to exit
    pub fn stop(mut self) {
        let _ = self.stop.try_send(());
        if let Some(thread) = self.thread.take()
            && thread.thread().id() != thread::current().id()
        {
            let _ = thread.join();
        }
    }
}

fn run<F: ResourceFactory>(pool: Weak<PoolShared<F>>, stopped: Receiver<()>) {
    loop {
        let Some(period) = pool.upgrade().map(|p| p.descriptor.read().shrink_period) else {
            return;
        };
        match stopped.recv_timeout(period) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
        }

        let Some(pool) = pool.upgrade() else {
            return;
        };
        pool.sweep();
        if pool.is_shutting_down() {
            debug!(pool = %pool.name, "reaper exiting");
            return;
        }
    }
}
