//! Pool descriptor: identity plus tuning

use crate::errors::{PoolError, PoolResult};
use std::time::Duration;

/// Identity and tuning of a single pool
///
/// # Examples
///
/// ```
/// use resource_pool::ResourceDescriptor;
/// use std::time::Duration;
///
/// let descriptor = ResourceDescriptor::new("warehouse")
///     .with_min_size(2)
///     .with_max_size(10)
///     .with_wait_timeout(Duration::from_secs(5))
///     .with_extend_mode(0.5);
///
/// assert_eq!(descriptor.max_size, 10);
/// assert_eq!(descriptor.extend_max_size(), 15);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "metrics", derive(serde::Serialize, serde::Deserialize))]
pub struct ResourceDescriptor {
    /// Pool identity, unique within a registry
    pub name: String,

    /// Containers created eagerly and kept through shrinking
    pub min_size: usize,

    /// Containers allowed before admission has to wait
    pub max_size: usize,

    /// Owners per container; only single ownership is enforced
    pub concurrent_users_per_container: usize,

    /// Idle time after which a container becomes a shrink candidate
    pub live_and_unused_duration: Duration,

    /// Reaper wake interval
    pub shrink_period: Duration,

    /// Containers removed per shrink cycle, 0 for unlimited
    pub shrink_increment: usize,

    /// Whether the reaper shrinks the idle set at all
    pub allow_shrink: bool,

    /// How long a checkout may wait for a container
    pub wait_timeout: Duration,

    /// Allow growing past `max_size` once the wait timeout is exhausted
    pub extend_mode: bool,

    /// Fraction of `max_size` the pool may grow by under extend mode
    pub extend_percent: f64,
}

impl Default for ResourceDescriptor {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            min_size: 0,
            max_size: 10,
            concurrent_users_per_container: 1,
            live_and_unused_duration: Duration::from_secs(60),
            shrink_period: Duration::from_secs(60),
            shrink_increment: 0,
            allow_shrink: true,
            wait_timeout: Duration::from_secs(30),
            extend_mode: false,
            extend_percent: 0.2,
        }
    }
}

impl ResourceDescriptor {
    /// Create a descriptor with default tuning for the named pool
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_min_size(mut self, size: usize) -> Self {
        self.min_size = size;
        self
    }

    pub fn with_max_size(mut self, size: usize) -> Self {
        self.max_size = size;
        self
    }

    pub fn with_concurrent_users(mut self, users: usize) -> Self {
        self.concurrent_users_per_container = users;
        self
    }

    pub fn with_live_and_unused(mut self, duration: Duration) -> Self {
        self.live_and_unused_duration = duration;
        self
    }

    /// Configure the reaper: wake interval and removals per cycle
    ///
    /// # Examples
    ///
    /// ```
    /// use resource_pool::ResourceDescriptor;
    /// use std::time::Duration;
    ///
    /// let descriptor = ResourceDescriptor::new("p")
    ///     .with_shrink(Duration::from_secs(10), 3);
    ///
    /// assert!(descriptor.allow_shrink);
    /// assert_eq!(descriptor.shrink_increment, 3);
    /// ```
    pub fn with_shrink(mut self, period: Duration, increment: usize) -> Self {
        self.allow_shrink = true;
        self.shrink_period = period;
        self.shrink_increment = increment;
        self
    }

    pub fn without_shrink(mut self) -> Self {
        self.allow_shrink = false;
        self
    }

    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    /// Enable extend mode with the given growth fraction
    pub fn with_extend_mode(mut self, percent: f64) -> Self {
        self.extend_mode = true;
        self.extend_percent = percent;
        self
    }

    /// Hard ceiling on containers: `max_size` plus the extend allowance
    pub fn extend_max_size(&self) -> usize {
        if self.extend_mode {
            self.max_size + (self.max_size as f64 * self.extend_percent).floor() as usize
        } else {
            self.max_size
        }
    }

    /// Check the tuning values, swapping an inverted min/max pair
    pub fn validate(mut self) -> PoolResult<Self> {
        if self.name.trim().is_empty() {
            return Err(PoolError::Configuration("pool name must not be empty".into()));
        }
        if self.min_size > self.max_size {
            tracing::warn!(
                pool = %self.name,
                min_size = self.min_size,
                max_size = self.max_size,
                "min_size exceeds max_size, swapping"
            );
            std::mem::swap(&mut self.min_size, &mut self.max_size);
        }
        if self.max_size == 0 {
            return Err(PoolError::Configuration(format!(
                "pool '{}': max_size must be at least 1",
                self.name
            )));
        }
        if self.concurrent_users_per_container == 0 {
            return Err(PoolError::Configuration(format!(
                "pool '{}': concurrent_users_per_container must be at least 1",
                self.name
            )));
        }
        if self.shrink_period.is_zero() {
            return Err(PoolError::Configuration(format!(
                "pool '{}': shrink_period must be positive",
                self.name
            )));
        }
        if !self.extend_percent.is_finite() || self.extend_percent < 0.0 {
            return Err(PoolError::Configuration(format!(
                "pool '{}': extend_percent must be a non-negative number, got {}",
                self.name, self.extend_percent
            )));
        }
        Ok(self)
    }

    /// Copy of this descriptor with the fields present in `update` applied
    pub fn merged(&self, update: &DescriptorUpdate) -> PoolResult<Self> {
        let mut next = self.clone();
        if let Some(v) = update.min_size {
            next.min_size = v;
        }
        if let Some(v) = update.max_size {
            next.max_size = v;
        }
        if let Some(v) = update.concurrent_users_per_container {
            next.concurrent_users_per_container = v;
        }
        if let Some(v) = update.live_and_unused_duration {
            next.live_and_unused_duration = v;
        }
        if let Some(v) = update.shrink_period {
            next.shrink_period = v;
        }
        if let Some(v) = update.shrink_increment {
            next.shrink_increment = v;
        }
        if let Some(v) = update.allow_shrink {
            next.allow_shrink = v;
        }
        if let Some(v) = update.wait_timeout {
            next.wait_timeout = v;
        }
        if let Some(v) = update.extend_mode {
            next.extend_mode = v;
        }
        if let Some(v) = update.extend_percent {
            next.extend_percent = v;
        }
        next.validate()
    }
}

/// Partial descriptor; absent fields keep their current value
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "metrics", derive(serde::Serialize, serde::Deserialize))]
pub struct DescriptorUpdate {
    pub min_size: Option<usize>,
    pub max_size: Option<usize>,
    pub concurrent_users_per_container: Option<usize>,
    pub live_and_unused_duration: Option<Duration>,
    pub shrink_period: Option<Duration>,
    pub shrink_increment: Option<usize>,
    pub allow_shrink: Option<bool>,
    pub wait_timeout: Option<Duration>,
    pub extend_mode: Option<bool>,
    pub extend_percent: Option<f64>,
}

impl DescriptorUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse string properties; durations are given in milliseconds
    ///
    /// Any unknown key or unparsable value rejects the whole set.
    ///
    /// # Examples
    ///
    /// ```
    /// use resource_pool::DescriptorUpdate;
    /// use std::time::Duration;
    ///
    /// let update = DescriptorUpdate::from_properties([
    ///     ("max_size", "20"),
    ///     ("wait_timeout", "1500"),
    /// ]).unwrap();
    ///
    /// assert_eq!(update.max_size, Some(20));
    /// assert_eq!(update.wait_timeout, Some(Duration::from_millis(1500)));
    /// assert!(DescriptorUpdate::from_properties([("max_size", "lots")]).is_err());
    /// ```
    pub fn from_properties<I, K, V>(properties: I) -> PoolResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut update = Self::default();
        for (key, value) in properties {
            let (key, value) = (key.as_ref().trim(), value.as_ref().trim());
            match key {
                "min_size" => update.min_size = Some(parse(key, value)?),
                "max_size" => update.max_size = Some(parse(key, value)?),
                "concurrent_users_per_container" => {
                    update.concurrent_users_per_container = Some(parse(key, value)?)
                }
                "live_and_unused_duration" => {
                    update.live_and_unused_duration = Some(parse_millis(key, value)?)
                }
                "shrink_period" => update.shrink_period = Some(parse_millis(key, value)?),
                "shrink_increment" => update.shrink_increment = Some(parse(key, value)?),
                "allow_shrink" => update.allow_shrink = Some(parse(key, value)?),
                "wait_timeout" => update.wait_timeout = Some(parse_millis(key, value)?),
                "extend_mode" => update.extend_mode = Some(parse(key, value)?),
                "extend_percent" => update.extend_percent = Some(parse(key, value)?),
                other => {
                    return Err(PoolError::Configuration(format!(
                        "unknown pool property '{other}'"
                    )));
                }
            }
        }
        Ok(update)
    }

    pub fn max_size(mut self, size: usize) -> Self {
        self.max_size = Some(size);
        self
    }

    pub fn min_size(mut self, size: usize) -> Self {
        self.min_size = Some(size);
        self
    }

    pub fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = Some(timeout);
        self
    }

    pub fn extend_percent(mut self, percent: f64) -> Self {
        self.extend_percent = Some(percent);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> PoolResult<T> {
    value
        .parse()
        .map_err(|_| PoolError::Configuration(format!("cannot parse '{value}' for '{key}'")))
}

fn parse_millis(key: &str, value: &str) -> PoolResult<Duration> {
    parse::<u64>(key, value).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extend_max_size() {
        let d = ResourceDescriptor::new("p").with_max_size(10).with_extend_mode(0.5);
        assert_eq!(d.extend_max_size(), 15);

        let d = ResourceDescriptor::new("p").with_max_size(3).with_extend_mode(0.5);
        assert_eq!(d.extend_max_size(), 4);

        let d = ResourceDescriptor::new("p").with_max_size(10);
        assert_eq!(d.extend_max_size(), 10);
    }

    #[test]
    fn test_validate_swaps_inverted_bounds() {
        let d = ResourceDescriptor::new("p")
            .with_min_size(8)
            .with_max_size(2)
            .validate()
            .unwrap();
        assert_eq!((d.min_size, d.max_size), (2, 8));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(ResourceDescriptor::new("p").with_max_size(0).validate().is_err());
        assert!(ResourceDescriptor::new("").validate().is_err());
        assert!(ResourceDescriptor::new("p").with_concurrent_users(0).validate().is_err());
        assert!(
            ResourceDescriptor::new("p")
                .with_extend_mode(f64::NAN)
                .validate()
                .is_err()
        );
        assert!(
            ResourceDescriptor::new("p")
                .with_shrink(Duration::ZERO, 1)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_merged_keeps_unspecified_fields() {
        let d = ResourceDescriptor::new("p")
            .with_min_size(1)
            .with_max_size(4)
            .with_wait_timeout(Duration::from_secs(2));
        let next = d.merged(&DescriptorUpdate::new().max_size(6)).unwrap();

        assert_eq!(next.max_size, 6);
        assert_eq!(next.min_size, 1);
        assert_eq!(next.wait_timeout, Duration::from_secs(2));
        assert_eq!(next.name, "p");
    }

    #[test]
    fn test_from_properties_rejects_whole_set() {
        let err = DescriptorUpdate::from_properties([
            ("max_size", "20"),
            ("extend_percent", "half"),
        ])
        .unwrap_err();
        assert!(matches!(err, PoolError::Configuration(_)));

        assert!(DescriptorUpdate::from_properties([("colour", "blue")]).is_err());
    }

    #[test]
    fn test_from_properties_parses_all_kinds() {
        let update = DescriptorUpdate::from_properties([
            ("allow_shrink", "false"),
            ("extend_mode", "true"),
            ("extend_percent", "0.25"),
            ("shrink_period", "250"),
        ])
        .unwrap();

        assert_eq!(update.allow_shrink, Some(false));
        assert_eq!(update.extend_mode, Some(true));
        assert_eq!(update.extend_percent, Some(0.25));
        assert_eq!(update.shrink_period, Some(Duration::from_millis(250)));
        assert!(!update.is_empty());
        assert!(DescriptorUpdate::new().is_empty());
    }
}
