//! Test factory with counters and failure switches

use crate::config::ResourceDescriptor;
use crate::factory::ResourceFactory;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

#[derive(Debug, thiserror::Error)]
pub(crate) enum FakeError {
    #[error("connection refused")]
    Refused,
    #[error("close failed")]
    Close,
}

#[derive(Default)]
pub(crate) struct CountingFactory {
    created: AtomicUsize,
    closed: AtomicUsize,
    fail_all: AtomicBool,
    fail_next: AtomicUsize,
    fail_close: AtomicBool,
    unhealthy_all: AtomicBool,
    unhealthy: Mutex<HashSet<usize>>,
    checkout_users: Mutex<Vec<String>>,
    panic_on_create: AtomicBool,
    checkout_gate: Mutex<Option<Arc<Barrier>>>,
}

impl CountingFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn fail_creations(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    pub fn fail_closes(&self, fail: bool) {
        self.fail_close.store(fail, Ordering::SeqCst);
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.unhealthy_all.store(!healthy, Ordering::SeqCst);
    }

    /// Mark one resource (by creation sequence number) unhealthy
    pub fn poison(&self, resource: usize) {
        self.unhealthy.lock().insert(resource);
    }

    pub fn checkout_users(&self) -> Vec<String> {
        self.checkout_users.lock().clone()
    }

    pub fn panic_on_create(&self, panic: bool) {
        self.panic_on_create.store(panic, Ordering::SeqCst);
    }

    /// Park every checkout hook on `gate` twice: once on entry, once to resume
    pub fn gate_checkouts(&self, gate: Arc<Barrier>) {
        *self.checkout_gate.lock() = Some(gate);
    }
}

impl ResourceFactory for CountingFactory {
    type Resource = usize;
    type Error = FakeError;

    fn create(&self, _descriptor: &ResourceDescriptor) -> Result<usize, FakeError> {
        if self.panic_on_create.load(Ordering::SeqCst) {
            panic!("factory exploded");
        }
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(FakeError::Refused);
        }
        if self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(FakeError::Refused);
        }
        Ok(self.created.fetch_add(1, Ordering::SeqCst))
    }

    fn close(&self, _resource: &usize) -> Result<(), FakeError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(FakeError::Close);
        }
        Ok(())
    }

    fn is_healthy(&self, resource: &usize) -> bool {
        !self.unhealthy_all.load(Ordering::SeqCst) && !self.unhealthy.lock().contains(resource)
    }

    fn on_checkout(&self, _resource: &usize, user: &str) {
        self.checkout_users.lock().push(user.to_string());
        let gate = self.checkout_gate.lock().clone();
        if let Some(gate) = gate {
            gate.wait();
            gate.wait();
        }
    }
}
