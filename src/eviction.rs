//! Selection of idle containers for removal
//!
//! The idle set is a deque ordered by last checkin, oldest at the front, so
//! both passes pick candidates front to back and are deterministic.

use crate::config::ResourceDescriptor;
use crate::container::Container;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shrink tuning taken from a descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ShrinkPolicy {
    pub min_size: usize,
    /// Removals per cycle, 0 for unlimited
    pub increment: usize,
    pub live_and_unused: Duration,
}

impl ShrinkPolicy {
    /// `None` when the descriptor disables shrinking
    pub fn from_descriptor(descriptor: &ResourceDescriptor) -> Option<Self> {
        descriptor.allow_shrink.then_some(Self {
            min_size: descriptor.min_size,
            increment: descriptor.shrink_increment,
            live_and_unused: descriptor.live_and_unused_duration,
        })
    }
}

/// Remove every idle container whose health probe fails
pub(crate) fn take_unhealthy<R>(
    idle: &mut VecDeque<Arc<Container<R>>>,
    check: impl Fn(&R) -> bool,
) -> Vec<Arc<Container<R>>> {
    let mut evicted = Vec::new();
    idle.retain(|container| {
        if container.check_health(&check) {
            true
        } else {
            evicted.push(Arc::clone(container));
            false
        }
    });
    evicted
}

/// Remove idle containers unused for longer than the policy allows,
/// never taking the pool below `min_size` and at most `increment` per call
pub(crate) fn take_shrinkable<R>(
    idle: &mut VecDeque<Arc<Container<R>>>,
    busy: usize,
    policy: &ShrinkPolicy,
    now: Instant,
) -> Vec<Arc<Container<R>>> {
    let Some(cutoff) = now.checked_sub(policy.live_and_unused) else {
        return Vec::new();
    };

    let mut evicted = Vec::new();
    let mut index = 0;
    while index < idle.len() {
        let total = idle.len() + busy;
        if total <= policy.min_size {
            break;
        }
        if policy.increment != 0 && evicted.len() >= policy.increment {
            break;
        }
        if idle[index].unused_since(cutoff) {
            if let Some(container) = idle.remove(index) {
                evicted.push(container);
            }
        } else {
            index += 1;
        }
    }
    evicted
}
