//! # resource_pool
//!
//! Bounded, thread-safe pool of expensive shared resources (physical
//! connections and the like) with admission control, health tracking and a
//! background reaper.
//!
//! ## Features
//!
//! - Typed [`ResourceFactory`] injected at construction
//! - Blocking checkout with a bounded wait, woken on checkin instead of polling
//! - Explicit deadlines and cancellation tokens per checkout
//! - Extend mode: temporary growth past `max_size` under sustained demand
//! - Sticky per-container health (`Alive` / `Suspect` / `Dead`)
//! - Reaper thread evicting unhealthy and long-idle containers
//! - Per-pool statistics with sum, high-water, low-water and average counters
//! - Prometheus metrics export
//! - Explicitly owned [`PoolRegistry`] keyed by descriptor name
//!
//! ## Quick Start
//!
//! ```rust
//! use resource_pool::{Pool, ResourceDescriptor, ResourceFactory};
//! use std::convert::Infallible;
//! use std::sync::Arc;
//!
//! struct Sessions;
//!
//! impl ResourceFactory for Sessions {
//!     type Resource = String;
//!     type Error = Infallible;
//!
//!     fn create(&self, d: &ResourceDescriptor) -> Result<String, Infallible> {
//!         Ok(format!("session to {}", d.name))
//!     }
//!
//!     fn close(&self, _: &String) -> Result<(), Infallible> {
//!         Ok(())
//!     }
//! }
//!
//! let pool = Pool::new(ResourceDescriptor::new("crm").with_max_size(4), Arc::new(Sessions)).unwrap();
//! {
//!     let handle = pool.checkout("report-job").unwrap();
//!     println!("Using: {}", handle.resource().unwrap());
//!     // Container returned to the pool when `handle` is released or dropped
//! }
//! assert_eq!(pool.idle_count(), 1);
//! ```

mod pool;
mod config;
mod container;
mod handle;
mod factory;
mod metrics;
mod health;
mod eviction;
mod reaper;
mod registry;
mod cancel;
mod errors;
pub mod statistics;

#[cfg(test)]
mod testing;

pub use pool::{Pool, CheckoutOptions};
pub use config::{ResourceDescriptor, DescriptorUpdate};
pub use container::{ContainerId, ContainerState, ContainerStatistics};
pub use handle::Handle;
pub use factory::ResourceFactory;
#[cfg(feature = "metrics")]
pub use metrics::MetricsExporter;
pub use health::{HealthState, HealthStatus};
pub use reaper::SweepReport;
pub use registry::PoolRegistry;
pub use cancel::CancellationToken;
pub use statistics::{Aggregation, Counter, PoolStatistics, Statistic, StatisticsRegistry};
pub use errors::{PoolError, PoolResult};
