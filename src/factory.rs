//! Resource factory seam

use crate::config::ResourceDescriptor;

/// Creates, probes and destroys the physical resources a pool manages
///
/// The pool wraps every resource returned by [`create`](Self::create) in its
/// own container; implementors only deal with the raw resource.
///
/// # Examples
///
/// ```
/// use resource_pool::{ResourceDescriptor, ResourceFactory};
/// use std::convert::Infallible;
///
/// struct Sockets;
///
/// impl ResourceFactory for Sockets {
///     type Resource = String;
///     type Error = Infallible;
///
///     fn create(&self, descriptor: &ResourceDescriptor) -> Result<String, Infallible> {
///         Ok(format!("socket for {}", descriptor.name))
///     }
///
///     fn close(&self, _resource: &String) -> Result<(), Infallible> {
///         Ok(())
///     }
/// }
/// ```
pub trait ResourceFactory: Send + Sync + 'static {
    type Resource: Send + Sync + 'static;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Open a new physical resource for the described pool
    fn create(&self, descriptor: &ResourceDescriptor) -> Result<Self::Resource, Self::Error>;

    /// Tear a resource down; called at most once per resource
    fn close(&self, resource: &Self::Resource) -> Result<(), Self::Error>;

    /// Probe the resource. A `false` answer is sticky for its container.
    fn is_healthy(&self, _resource: &Self::Resource) -> bool {
        true
    }

    /// Runs after a container is handed to `user`
    fn on_checkout(&self, _resource: &Self::Resource, _user: &str) {}
}
