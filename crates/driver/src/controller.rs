//! Attach/detach controller
//!
//! `probe` and `disconnect` are the two callbacks the host invokes per
//! matching interface. Probe builds the device graph and publishes one node
//! per bulk-OUT endpoint; disconnect hands the graph over to reference
//! counting, which frees each object once nothing uses it any more.
//!
//! Probe acquires resources through guards (slot lease, node class, minor
//! range). Returning early from any fatal step drops the guards acquired so
//! far in reverse order, so a refused attach leaves nothing behind.

use crate::device::usb::BusLocation;
use crate::device::{EndpointDevice, UsbDevice};
use crate::host::{MinorRange, MinorRegistry, NodeClass, NodeRegistry};
use crate::slots::SlotAllocator;
use common::BulkTransport;
use protocol::{AttachError, Direction, InterfaceDescriptor, TransferKind, naming};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Default timeout of every outbound bulk transfer
pub const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_secs(10);

/// A matching interface as offered by the host
///
/// Carries the parsed descriptor, the opened physical device and the
/// per-interface data slot that links the interface to its `UsbDevice`
/// between probe and disconnect. Dropping an interface that is still bound
/// detaches its device.
pub struct Interface {
    descriptor: InterfaceDescriptor,
    transport: Arc<dyn BulkTransport>,
    bus_number: u8,
    device_address: u8,
    data: Mutex<Option<Arc<UsbDevice>>>,
}

impl Interface {
    pub fn new(
        descriptor: InterfaceDescriptor,
        transport: Arc<dyn BulkTransport>,
        bus_number: u8,
        device_address: u8,
    ) -> Self {
        Self {
            descriptor,
            transport,
            bus_number,
            device_address,
            data: Mutex::new(None),
        }
    }

    pub fn descriptor(&self) -> &InterfaceDescriptor {
        &self.descriptor
    }

    /// Device bound by a successful probe, with a reference taken on it
    pub fn data(&self) -> Option<Arc<UsbDevice>> {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_data(&self, dev: Option<Arc<UsbDevice>>) -> Option<Arc<UsbDevice>> {
        std::mem::replace(
            &mut *self.data.lock().unwrap_or_else(PoisonError::into_inner),
            dev,
        )
    }
}

impl Drop for Interface {
    fn drop(&mut self) {
        let bound = self
            .data
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(dev) = bound {
            debug!("Interface dropped while bound to hp-gadget{}", dev.slot());
            dev.teardown();
        }
    }
}

/// The hp-gadget driver: slot pool plus the host collaborators
pub struct Driver {
    slots: Arc<SlotAllocator>,
    nodes: Arc<dyn NodeRegistry>,
    minors: Arc<dyn MinorRegistry>,
    transfer_timeout: Duration,
}

impl Driver {
    pub fn new(
        nodes: Arc<dyn NodeRegistry>,
        minors: Arc<dyn MinorRegistry>,
        transfer_timeout: Duration,
    ) -> Self {
        Self {
            slots: Arc::new(SlotAllocator::new()),
            nodes,
            minors,
            transfer_timeout,
        }
    }

    pub fn slots(&self) -> &Arc<SlotAllocator> {
        &self.slots
    }

    /// Attach callback
    ///
    /// Endpoints that are inbound or not bulk are skipped, as are endpoints
    /// whose node cannot be published; an interface with no usable endpoint
    /// still attaches.
    pub fn probe(&self, intf: &Interface) -> Result<(), AttachError> {
        let result = self.try_probe(intf);
        if let Err(e) = &result {
            error!("Failed to initialize new device: {}", e);
        }
        result
    }

    fn try_probe(&self, intf: &Interface) -> Result<(), AttachError> {
        let descriptor = intf.descriptor();

        let lease = self.slots.lease().inspect_err(|e| warn!("{}", e))?;
        let slot = lease.slot();

        let class_name = naming::class_name(slot).map_err(|e| {
            warn!("Couldn't name class for slot {}: {}", slot.0, e);
            AttachError::AllocationFailure
        })?;

        let class = NodeClass::create(Arc::clone(&self.nodes), &class_name).map_err(|e| {
            warn!("Couldn't create class {}: {}", class_name, e);
            AttachError::AllocationFailure
        })?;

        let count = descriptor.num_endpoints();
        let minors = MinorRange::reserve(Arc::clone(&self.minors), count, &class_name)
            .map_err(|e| {
                warn!("Couldn't get the minors: {}", e);
                AttachError::RangeReservationFailure {
                    name: class_name.clone(),
                    count,
                }
            })?;

        let mut children = Vec::new();
        children.try_reserve_exact(count).map_err(|_| {
            warn!("Out of memory for {} endpoint devices", count);
            AttachError::AllocationFailure
        })?;

        let dev = Arc::new(UsbDevice::new(
            lease,
            class,
            minors,
            Arc::clone(&intf.transport),
            self.transfer_timeout,
            BusLocation {
                bus_number: intf.bus_number,
                device_address: intf.device_address,
                interface: descriptor.number,
            },
            children,
        ));

        for (i, endpoint) in descriptor.endpoints.iter().enumerate() {
            // Bounded by the 256-minor range reserved above
            let index = i as u8;

            if endpoint.direction() == Direction::In {
                warn!(
                    "Device has unexpected in direction endpoint {:#04x}",
                    endpoint.address
                );
                continue;
            }

            if endpoint.transfer_kind() != TransferKind::Bulk {
                warn!(
                    "Wrong transfer type {:?} for endpoint {:#04x}, expected bulk",
                    endpoint.transfer_kind(),
                    endpoint.address
                );
                continue;
            }

            self.add_endpoint(&dev, endpoint.address, index);
        }

        if let Some(stale) = intf.set_data(Some(Arc::clone(&dev))) {
            warn!("Interface was still bound to hp-gadget{}", stale.slot());
            stale.teardown();
        }

        info!(
            "New device {} ({} of {} endpoints published)",
            class_name,
            dev.child_count(),
            count
        );
        Ok(())
    }

    /// Create, publish and adopt the endpoint device at `index`
    ///
    /// A child that cannot be published is dropped again right away; its
    /// drop releases the reference it took on `dev`.
    fn add_endpoint(&self, dev: &Arc<UsbDevice>, address: u8, index: u8) {
        let child = EndpointDevice::new(dev, address, index);

        let name = match naming::node_name(dev.class().name(), index) {
            Ok(name) => name,
            Err(e) => {
                warn!("Failed to create new devfs device: {}", e);
                return;
            }
        };

        let dev_number = dev.minors().base().offset(u32::from(index));
        match self.nodes.publish(
            dev.class().name(),
            dev_number,
            &name,
            Arc::downgrade(&child),
        ) {
            Ok(node) => {
                child.set_node(node);
                dev.adopt(child);
                debug!("Endpoint {:#04x} published as {}", address, name);
            }
            Err(e) => {
                warn!("Failed to publish {}: {}", name, e);
            }
        }
    }

    /// Detach callback
    ///
    /// Never fails. Nodes of endpoints still held open stay published until
    /// their last handle is released.
    pub fn disconnect(&self, intf: &Interface) {
        let Some(dev) = intf.set_data(None) else {
            warn!("Disconnect of an interface that was never attached");
            return;
        };

        info!("hp-gadget{} disconnected", dev.slot());
        dev.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::NodeTable;
    use common::test_utils::{RecordingTransport, create_bulk_out_interface};

    fn driver_with_table() -> (Driver, Arc<NodeTable>) {
        let table = Arc::new(NodeTable::new());
        let driver = Driver::new(table.clone(), table.clone(), DEFAULT_TRANSFER_TIMEOUT);
        (driver, table)
    }

    #[test]
    fn test_probe_binds_interface() {
        let (driver, table) = driver_with_table();
        let intf = Interface::new(
            create_bulk_out_interface(2),
            Arc::new(RecordingTransport::new()),
            1,
            5,
        );

        driver.probe(&intf).unwrap();

        let dev = intf.data().unwrap();
        assert_eq!(dev.slot().0, 0);
        assert_eq!(dev.child_count(), 2);
        assert_eq!(table.node_count(), 2);
        assert!(table.has_class("hp-gadget0"));
    }

    #[test]
    fn test_disconnect_unbinds_interface() {
        let (driver, table) = driver_with_table();
        let intf = Interface::new(
            create_bulk_out_interface(1),
            Arc::new(RecordingTransport::new()),
            1,
            5,
        );

        driver.probe(&intf).unwrap();
        driver.disconnect(&intf);

        assert!(intf.data().is_none());
        assert_eq!(table.node_count(), 0);
        assert_eq!(driver.slots().in_use(), 0);
    }

    #[test]
    fn test_dropping_bound_interface_detaches() {
        let (driver, table) = driver_with_table();
        let intf = Interface::new(
            create_bulk_out_interface(2),
            Arc::new(RecordingTransport::new()),
            1,
            5,
        );
        driver.probe(&intf).unwrap();
        let dev = Arc::downgrade(&intf.data().unwrap());

        drop(intf);

        assert!(dev.upgrade().is_none());
        assert_eq!(table.node_count(), 0);
        assert!(!table.has_class("hp-gadget0"));
        assert_eq!(driver.slots().in_use(), 0);
    }

    #[test]
    fn test_disconnect_without_probe_is_harmless() {
        let (driver, _table) = driver_with_table();
        let intf = Interface::new(
            create_bulk_out_interface(1),
            Arc::new(RecordingTransport::new()),
            1,
            5,
        );

        driver.disconnect(&intf);
        assert!(intf.data().is_none());
    }
}
