//! Per-endpoint state

use crate::device::UsbDevice;
use crate::host::NodeHandle;
use protocol::{PwmValue, TransportError};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use tracing::debug;

/// Value held for one endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PwmState {
    /// Last accepted value; `None` until the first write or read
    pub current: Option<PwmValue>,
    /// Set by a successful read, cleared by open and by a successful write
    pub consumed: bool,
}

/// One bulk-OUT endpoint exposed as a node
pub struct EndpointDevice {
    // Holds a reference on the parent for as long as this endpoint lives
    parent: Arc<UsbDevice>,
    address: u8,
    index: u8,
    state: Mutex<PwmState>,
    node: OnceLock<NodeHandle>,
}

impl EndpointDevice {
    pub(crate) fn new(parent: &Arc<UsbDevice>, address: u8, index: u8) -> Arc<Self> {
        Arc::new(Self {
            parent: Arc::clone(parent),
            address,
            index,
            state: Mutex::new(PwmState::default()),
            node: OnceLock::new(),
        })
    }

    /// bEndpointAddress of the bulk-OUT endpoint
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Position of the endpoint in the interface descriptor
    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn parent(&self) -> &Arc<UsbDevice> {
        &self.parent
    }

    /// Published node, once publication succeeded
    pub fn node(&self) -> Option<&NodeHandle> {
        self.node.get()
    }

    pub(crate) fn set_node(&self, node: NodeHandle) {
        if self.node.set(node).is_err() {
            debug!("Endpoint {:#04x} already has a node", self.address);
        }
    }

    /// Snapshot of the current state
    pub fn state(&self) -> PwmState {
        *self.lock_state()
    }

    /// Lock the value state
    ///
    /// File operations hold this across the bulk transfer so that two
    /// handles on the same endpoint never interleave value and transfer.
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, PwmState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Send `data` to this endpoint over the parent's transport
    pub fn send(&self, data: &[u8]) -> Result<usize, TransportError> {
        debug!(
            "Bulk OUT {:#04x} on hp-gadget{}: {:?}",
            self.address,
            self.parent.slot(),
            String::from_utf8_lossy(data)
        );
        self.parent
            .transport()
            .write_bulk(self.address, data, self.parent.transfer_timeout())
    }
}

impl Drop for EndpointDevice {
    fn drop(&mut self) {
        if let Some(node) = self.node.get() {
            self.parent.class().registry().unpublish(node);
            debug!("Unpublished {}", node.name);
        }
    }
}
