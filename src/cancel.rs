//! Wake-up signalling and cancellation for waiting checkouts

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

/// Epoch counter plus condition variable
///
/// Waiters read the epoch before trying to make progress and then sleep
/// only while it is unchanged, so a notify landing between the attempt and
/// the wait is never lost.
#[derive(Debug, Default)]
pub(crate) struct Signal {
    epoch: Mutex<u64>,
    cond: Condvar,
}

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn epoch(&self) -> u64 {
        *self.epoch.lock()
    }

    pub fn notify(&self) {
        let mut epoch = self.epoch.lock();
        *epoch = epoch.wrapping_add(1);
        self.cond.notify_all();
    }

    /// Block until the epoch moves past `seen` or `deadline` passes.
    /// Returns whether the epoch moved.
    pub fn wait_until(&self, seen: u64, deadline: Instant) -> bool {
        let mut epoch = self.epoch.lock();
        while *epoch == seen {
            if self.cond.wait_until(&mut epoch, deadline).timed_out() {
                return *epoch != seen;
            }
        }
        true
    }
}

/// Cooperative cancellation for checkouts waiting on a pool
///
/// # Examples
///
/// ```
/// use resource_pool::CancellationToken;
///
/// let token = CancellationToken::new();
/// let observer = token.clone();
/// token.cancel();
/// assert!(observer.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

#[derive(Debug, Default)]
struct TokenInner {
    cancelled: AtomicBool,
    listeners: Mutex<Vec<Weak<Signal>>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel and wake every pool that has a checkout waiting on this token
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        let listeners = std::mem::take(&mut *self.inner.listeners.lock());
        for signal in listeners.iter().filter_map(Weak::upgrade) {
            signal.notify();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    pub(crate) fn register(&self, signal: &Arc<Signal>) {
        let mut listeners = self.inner.listeners.lock();
        listeners.retain(|w| w.strong_count() > 0);
        if !listeners.iter().any(|w| w.as_ptr() == Arc::as_ptr(signal)) {
            listeners.push(Arc::downgrade(signal));
        }
    }
}
