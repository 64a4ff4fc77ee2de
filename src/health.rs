//! Container health state and pool health summaries

use std::sync::atomic::{AtomicU8, Ordering};

/// Health of a single container
///
/// `Dead` is terminal: once a probe fails the container is never handed out
/// again and is only waiting for the reaper or shutdown to destroy it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "metrics", derive(serde::Serialize, serde::Deserialize))]
pub enum HealthState {
    /// Last probe passed, or never probed
    Alive,

    /// A user reported trouble; the next probe decides
    Suspect,

    /// A probe failed
    Dead,
}

impl HealthState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => HealthState::Alive,
            1 => HealthState::Suspect,
            _ => HealthState::Dead,
        }
    }
}

/// Lock-free cell holding a [`HealthState`]
#[derive(Debug)]
pub(crate) struct HealthCell {
    state: AtomicU8,
}

impl HealthCell {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(HealthState::Alive as u8),
        }
    }

    pub fn state(&self) -> HealthState {
        HealthState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_dead(&self) -> bool {
        self.state() == HealthState::Dead
    }

    /// Alive -> Suspect; no effect on a dead container
    pub fn mark_suspect(&self) {
        let _ = self.state.compare_exchange(
            HealthState::Alive as u8,
            HealthState::Suspect as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    pub fn kill(&self) {
        self.state.store(HealthState::Dead as u8, Ordering::Release);
    }

    /// Run `check` unless already dead and fold its answer into the state
    pub fn probe(&self, check: impl FnOnce() -> bool) -> bool {
        if self.is_dead() {
            return false;
        }
        if check() {
            let _ = self.state.compare_exchange(
                HealthState::Suspect as u8,
                HealthState::Alive as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
            !self.is_dead()
        } else {
            self.kill();
            false
        }
    }
}

impl Default for HealthCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Health summary of a pool
///
/// # Examples
///
/// ```
/// use resource_pool::HealthStatus;
///
/// let health = HealthStatus::new(3, 1, 10, 10, false);
/// assert!(health.is_healthy());
/// assert_eq!(health.idle_containers, 3);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "metrics", derive(serde::Serialize, serde::Deserialize))]
pub struct HealthStatus {
    /// Whether the pool is healthy
    pub is_healthy: bool,

    /// Number of warnings detected
    pub warning_count: usize,

    /// Busy containers relative to `max_size` (may exceed 1.0 when extended)
    pub utilization: f64,

    pub idle_containers: usize,

    pub busy_containers: usize,

    /// Configured `max_size`
    pub max_size: usize,

    /// Ceiling including the extend allowance
    pub extend_max_size: usize,

    /// Warning messages
    pub warnings: Vec<String>,
}

impl HealthStatus {
    pub fn new(
        idle: usize,
        busy: usize,
        max_size: usize,
        extend_max_size: usize,
        shutting_down: bool,
    ) -> Self {
        let utilization = if max_size > 0 {
            busy as f64 / max_size as f64
        } else {
            0.0
        };

        let mut warnings = Vec::new();
        let mut is_healthy = true;

        if shutting_down {
            warnings.push("Pool is shutting down".to_string());
            is_healthy = false;
        }

        if utilization > 0.9 {
            warnings.push(format!("High utilization: {:.1}%", utilization * 100.0));
            is_healthy = false;
        }

        if idle + busy > max_size {
            warnings.push(format!(
                "Extended beyond max_size: {} of {} containers",
                idle + busy,
                extend_max_size
            ));
        }

        if idle == 0 && !shutting_down {
            warnings.push("No idle containers".to_string());
        }

        Self {
            is_healthy,
            warning_count: warnings.len(),
            utilization,
            idle_containers: idle,
            busy_containers: busy,
            max_size,
            extend_max_size,
            warnings,
        }
    }

    /// Check if the pool is healthy
    pub fn is_healthy(&self) -> bool {
        self.is_healthy
    }
}
