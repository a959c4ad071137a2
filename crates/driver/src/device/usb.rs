//! Per-physical-device state

use crate::device::EndpointDevice;
use crate::host::{MinorRange, NodeClass};
use crate::slots::SlotLease;
use common::BulkTransport;
use protocol::{DeviceSummary, NodeInfo, SlotId};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

/// Where a device sits on the host bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BusLocation {
    pub bus_number: u8,
    pub device_address: u8,
    pub interface: u8,
}

/// One attached hp-gadget interface and its endpoint devices
///
/// Must be torn down with [`UsbDevice::teardown`] before the attach-side
/// reference is dropped; until then the children keep it alive.
pub struct UsbDevice {
    location: BusLocation,
    children: Mutex<Vec<Arc<EndpointDevice>>>,
    class: NodeClass,
    minors: MinorRange,
    transport: Arc<dyn BulkTransport>,
    transfer_timeout: Duration,
    // Dropped last: the slot is free again only once everything else is gone
    lease: SlotLease,
}

impl UsbDevice {
    pub(crate) fn new(
        lease: SlotLease,
        class: NodeClass,
        minors: MinorRange,
        transport: Arc<dyn BulkTransport>,
        transfer_timeout: Duration,
        location: BusLocation,
        children: Vec<Arc<EndpointDevice>>,
    ) -> Self {
        Self {
            location,
            children: Mutex::new(children),
            class,
            minors,
            transport,
            transfer_timeout,
            lease,
        }
    }

    pub fn slot(&self) -> SlotId {
        self.lease.slot()
    }

    pub fn class(&self) -> &NodeClass {
        &self.class
    }

    pub fn minors(&self) -> &MinorRange {
        &self.minors
    }

    pub fn transport(&self) -> &Arc<dyn BulkTransport> {
        &self.transport
    }

    pub fn transfer_timeout(&self) -> Duration {
        self.transfer_timeout
    }

    /// Append a published child
    pub(crate) fn adopt(&self, child: Arc<EndpointDevice>) {
        self.children
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(child);
    }

    /// Number of children still in the child list
    pub fn child_count(&self) -> usize {
        self.children
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Nodes currently published for the children, in enumeration order
    pub fn nodes(&self) -> Vec<NodeInfo> {
        let registry = self.class.registry();
        self.children
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(|child| child.node())
            .filter_map(|node| registry.node_info(node.dev))
            .collect()
    }

    pub fn summary(&self) -> DeviceSummary {
        DeviceSummary {
            slot: self.slot(),
            class: self.class.name().to_string(),
            bus_number: self.location.bus_number,
            device_address: self.location.device_address,
            interface: self.location.interface,
            nodes: self.nodes(),
        }
    }

    /// Detach-time teardown
    ///
    /// Releases the class and the minor range, then drops the child list's
    /// reference on every child. Children with no open handle are freed
    /// (and unpublished) before this returns.
    pub(crate) fn teardown(&self) {
        self.class.destroy();
        self.minors.release();

        let children = std::mem::take(
            &mut *self
                .children
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        debug!(
            "Releasing {} endpoint devices of hp-gadget{}",
            children.len(),
            self.slot()
        );
        drop(children);
    }
}

impl Drop for UsbDevice {
    fn drop(&mut self) {
        debug!("hp-gadget{} freed", self.slot());
    }
}
