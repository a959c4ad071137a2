//! Host collaborator interfaces
//!
//! The driver core never talks to a device-node filesystem directly. It
//! publishes nodes and reserves device numbers through these two traits;
//! [`crate::nodes::NodeTable`] is the in-process implementation.
//!
//! Both traits also come with small RAII guards ([`NodeClass`],
//! [`MinorRange`]) so that a failed attach releases what it acquired simply
//! by returning early.

use crate::device::EndpointDevice;
use protocol::{DevNumber, NodeInfo};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use thiserror::Error;
use tracing::debug;

/// Failure reported by a host collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("Class '{0}' already exists")]
    ClassExists(String),

    #[error("Unknown class '{0}'")]
    UnknownClass(String),

    #[error("No free major number for '{name}'")]
    NoMajor { name: String },

    #[error("Minor range of {count} does not fit (max: {max})")]
    RangeTooLarge { count: usize, max: usize },

    #[error("Device number {0} is not reserved")]
    Unreserved(DevNumber),

    #[error("Device number {0} already in use")]
    DevNumberInUse(DevNumber),

    #[error("Node name '{0}' already in use")]
    NameInUse(String),
}

/// Handle to a published node; unpublishing consumes it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeHandle {
    pub dev: DevNumber,
    pub name: String,
}

/// Device-node publishing collaborator
pub trait NodeRegistry: Send + Sync {
    /// Create a node class; names are unique while the class lives
    fn create_class(&self, name: &str) -> Result<(), HostError>;

    /// Destroy a node class. Nodes already published under it stay
    /// reachable until they are unpublished.
    fn destroy_class(&self, name: &str);

    /// Publish a node bound to `dev` under `class`
    ///
    /// The registry keeps only a weak reference: publishing never extends the
    /// endpoint's lifetime.
    fn publish(
        &self,
        class: &str,
        dev: DevNumber,
        name: &str,
        endpoint: Weak<EndpointDevice>,
    ) -> Result<NodeHandle, HostError>;

    /// Remove a published node
    fn unpublish(&self, node: &NodeHandle);

    /// Resolve a device number to a live endpoint, taking a reference on it
    fn lookup(&self, dev: DevNumber) -> Option<Arc<EndpointDevice>>;

    /// Describe a published node
    fn node_info(&self, dev: DevNumber) -> Option<NodeInfo>;
}

/// Device-number (minor range) reservation collaborator
pub trait MinorRegistry: Send + Sync {
    /// Reserve `count` contiguous minors; returns the first device number
    fn reserve(&self, count: usize, name: &str) -> Result<DevNumber, HostError>;

    /// Return a range obtained from [`MinorRegistry::reserve`]
    fn release(&self, base: DevNumber, count: usize);
}

/// Node class owned by one USB device
///
/// Destroyed explicitly at detach, or on drop if attach unwinds first.
pub struct NodeClass {
    name: String,
    registry: Arc<dyn NodeRegistry>,
    destroyed: AtomicBool,
}

impl NodeClass {
    pub fn create(registry: Arc<dyn NodeRegistry>, name: &str) -> Result<Self, HostError> {
        registry.create_class(name)?;
        debug!("Created class {}", name);

        Ok(Self {
            name: name.to_string(),
            registry,
            destroyed: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registry(&self) -> &Arc<dyn NodeRegistry> {
        &self.registry
    }

    /// Destroy the class now; later calls are no-ops
    pub fn destroy(&self) {
        if !self.destroyed.swap(true, Ordering::AcqRel) {
            self.registry.destroy_class(&self.name);
            debug!("Destroyed class {}", self.name);
        }
    }
}

impl Drop for NodeClass {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Minor-number range owned by one USB device
pub struct MinorRange {
    base: DevNumber,
    count: usize,
    registry: Arc<dyn MinorRegistry>,
    released: AtomicBool,
}

impl MinorRange {
    pub fn reserve(
        registry: Arc<dyn MinorRegistry>,
        count: usize,
        name: &str,
    ) -> Result<Self, HostError> {
        let base = registry.reserve(count, name)?;
        debug!("Reserved {} minors at {} for {}", count, base, name);

        Ok(Self {
            base,
            count,
            registry,
            released: AtomicBool::new(false),
        })
    }

    pub fn base(&self) -> DevNumber {
        self.base
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Release the range now; later calls are no-ops
    pub fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.registry.release(self.base, self.count);
            debug!("Released {} minors at {}", self.count, self.base);
        }
    }
}

impl Drop for MinorRange {
    fn drop(&mut self) {
        self.release();
    }
}
