//! hp-gadget device manager
//!
//! Finds matching devices, opens them and hands each interface to the
//! driver's attach callback; departures go to the detach callback. Runs on
//! the USB worker thread together with the rusb event loop.

use crate::controller::{Driver, Interface};
use crate::usb::transport::RusbTransport;
use common::{BulkTransport, DriverEvent};
use protocol::{AttachError, DeviceSummary, EndpointDescriptor, InterfaceDescriptor};
use rusb::{Context, Device, Hotplug, HotplugBuilder, Registration, TransferType, UsbContext};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Hot-plug notification forwarded from the rusb callback
enum HotplugEvent {
    Arrived(Device<Context>),
    Left { bus: u8, address: u8 },
}

/// Interfaces bound to one physical device
struct AttachedDevice {
    interfaces: Vec<Interface>,
}

/// Registry of attached hp-gadget devices keyed by (bus, address)
pub struct DeviceManager {
    /// USB context for device operations
    context: Context,
    driver: Arc<Driver>,
    attached: HashMap<(u8, u8), AttachedDevice>,
    hotplug_tx: async_channel::Sender<HotplugEvent>,
    hotplug_rx: async_channel::Receiver<HotplugEvent>,
    /// Hot-plug registration
    _hotplug_registration: Option<Registration<Context>>,
    event_sender: async_channel::Sender<DriverEvent>,
    /// Device filters (VID:PID patterns)
    allowed_filters: Vec<String>,
}

impl DeviceManager {
    pub fn new(
        driver: Arc<Driver>,
        event_sender: async_channel::Sender<DriverEvent>,
        allowed_filters: Vec<String>,
    ) -> Result<Self, rusb::Error> {
        let context = Context::new()?;
        let (hotplug_tx, hotplug_rx) = async_channel::unbounded();

        Ok(Self {
            context,
            driver,
            attached: HashMap::new(),
            hotplug_tx,
            hotplug_rx,
            _hotplug_registration: None,
            event_sender,
            allowed_filters,
        })
    }

    /// Attach already-connected devices and register for hot-plug
    pub fn initialize(&mut self) -> Result<(), rusb::Error> {
        for device in self.context.devices()?.iter() {
            self.handle_device_arrived(device);
        }

        if rusb::has_hotplug() {
            let callback = HotplugForwarder {
                events: self.hotplug_tx.clone(),
            };
            let registration = HotplugBuilder::new()
                .enumerate(false)
                .register(&self.context, Box::new(callback))?;
            self._hotplug_registration = Some(registration);
            debug!("Hot-plug callbacks registered");
        } else {
            warn!("libusb has no hot-plug support; only devices present at startup are attached");
        }

        info!(
            "Device manager initialized with {} devices",
            self.attached.len()
        );
        Ok(())
    }

    /// Get USB context
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Handle the notifications queued by the hot-plug callback
    pub fn process_hotplug_events(&mut self) {
        while let Ok(event) = self.hotplug_rx.try_recv() {
            match event {
                HotplugEvent::Arrived(device) => self.handle_device_arrived(device),
                HotplugEvent::Left { bus, address } => self.handle_device_left(bus, address),
            }
        }
    }

    /// Open a matching device and attach every interface of it
    pub fn handle_device_arrived(&mut self, device: Device<Context>) {
        let key = (device.bus_number(), device.address());
        if self.attached.contains_key(&key) {
            return;
        }

        let Ok(desc) = device.device_descriptor() else {
            return;
        };
        if !Self::check_filter(desc.vendor_id(), desc.product_id(), &self.allowed_filters) {
            return;
        }

        debug!(
            "Matching device: bus={}, addr={}, vid={:#06x}, pid={:#06x}",
            key.0,
            key.1,
            desc.vendor_id(),
            desc.product_id()
        );

        let handle = match device.open() {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Failed to open device {:03}:{:03}: {}", key.0, key.1, e);
                return;
            }
        };

        let config = match device.active_config_descriptor() {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to get active config descriptor: {}", e);
                return;
            }
        };

        let transport = Arc::new(RusbTransport::new(handle, key.0, key.1));
        let mut interfaces = Vec::new();

        for interface in config.interfaces() {
            let Some(alt) = interface.descriptors().next() else {
                continue;
            };

            if let Err(e) = transport.claim(alt.interface_number()) {
                warn!(
                    "Failed to claim interface {}: {}",
                    alt.interface_number(),
                    e
                );
                continue;
            }

            let endpoints = alt
                .endpoint_descriptors()
                .map(|ep| {
                    EndpointDescriptor::new(ep.address(), transfer_attributes(ep.transfer_type()))
                })
                .collect();
            let descriptor = InterfaceDescriptor::new(alt.interface_number(), endpoints);

            let bulk: Arc<dyn BulkTransport> = transport.clone();
            let intf = Interface::new(descriptor, bulk, key.0, key.1);

            match self.driver.probe(&intf) {
                Ok(()) => {
                    if let Some(dev) = intf.data() {
                        self.send_event(DriverEvent::DeviceAttached {
                            slot: dev.slot(),
                            nodes: dev.nodes(),
                        });
                    }
                    interfaces.push(intf);
                }
                Err(error) => self.attach_failed(key, error),
            }
        }

        if !interfaces.is_empty() {
            self.attached.insert(key, AttachedDevice { interfaces });
        }
    }

    /// Detach every interface of a departed device
    pub fn handle_device_left(&mut self, bus: u8, address: u8) {
        let Some(device) = self.attached.remove(&(bus, address)) else {
            return;
        };

        for intf in device.interfaces {
            let slot = intf.data().map(|dev| dev.slot());
            self.driver.disconnect(&intf);
            if let Some(slot) = slot {
                self.send_event(DriverEvent::DeviceDetached { slot });
            }
        }
    }

    /// Every attached device, ordered by slot
    pub fn list_devices(&self) -> Vec<DeviceSummary> {
        let mut devices: Vec<DeviceSummary> = self
            .attached
            .values()
            .flat_map(|device| device.interfaces.iter())
            .filter_map(|intf| intf.data())
            .map(|dev| dev.summary())
            .collect();
        devices.sort_by_key(|d| d.slot);
        devices
    }

    /// Detach everything, as on driver unload
    pub fn shutdown(&mut self) {
        let keys: Vec<(u8, u8)> = self.attached.keys().copied().collect();
        for (bus, address) in keys {
            self.handle_device_left(bus, address);
        }
    }

    fn attach_failed(&self, (bus_number, device_address): (u8, u8), error: AttachError) {
        self.send_event(DriverEvent::AttachFailed {
            bus_number,
            device_address,
            error,
        });
    }

    fn send_event(&self, event: DriverEvent) {
        if let Err(e) = self.event_sender.try_send(event) {
            error!("Failed to send driver event: {}", e);
        }
    }

    /// Check if a VID/PID pair is allowed by the filters
    fn check_filter(vid: u16, pid: u16, filters: &[String]) -> bool {
        // No filters: every device is offered to the driver
        if filters.is_empty() {
            return true;
        }

        filters.iter().any(|filter| {
            let Some((filter_vid, filter_pid)) = filter.split_once(':') else {
                return false;
            };
            id_matches(filter_vid, vid) && id_matches(filter_pid, pid)
        })
    }
}

/// Match one half of a "0xVID:0xPID" filter; `*` matches anything
fn id_matches(pattern: &str, id: u16) -> bool {
    pattern == "*"
        || u16::from_str_radix(pattern.trim_start_matches("0x"), 16).is_ok_and(|p| p == id)
}

/// bmAttributes transfer-type bits for a parsed endpoint
fn transfer_attributes(kind: TransferType) -> u8 {
    match kind {
        TransferType::Control => 0x00,
        TransferType::Isochronous => 0x01,
        TransferType::Bulk => 0x02,
        TransferType::Interrupt => 0x03,
    }
}

/// Forwards hot-plug notifications to the worker loop
///
/// The callback fires from inside `handle_events`, where the manager is
/// already borrowed, so events are queued and handled afterwards.
struct HotplugForwarder {
    events: async_channel::Sender<HotplugEvent>,
}

impl Hotplug<Context> for HotplugForwarder {
    fn device_arrived(&mut self, device: Device<Context>) {
        debug!(
            "Hot-plug callback: device arrived (bus={}, addr={})",
            device.bus_number(),
            device.address()
        );
        let _ = self.events.try_send(HotplugEvent::Arrived(device));
    }

    fn device_left(&mut self, device: Device<Context>) {
        debug!(
            "Hot-plug callback: device left (bus={}, addr={})",
            device.bus_number(),
            device.address()
        );
        let _ = self.events.try_send(HotplugEvent::Left {
            bus: device.bus_number(),
            address: device.address(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_logic() {
        let filters = vec![
            "0x1209:0x0001".to_string(), // Exact match
            "0xABCD:*".to_string(),      // Wildcard PID
        ];

        assert!(DeviceManager::check_filter(0x1209, 0x0001, &filters));

        assert!(DeviceManager::check_filter(0xABCD, 0x1111, &filters));
        assert!(DeviceManager::check_filter(0xABCD, 0x9999, &filters));

        assert!(!DeviceManager::check_filter(0x1209, 0x0002, &filters));
        assert!(!DeviceManager::check_filter(0x9999, 0x0001, &filters));
        assert!(!DeviceManager::check_filter(0x0000, 0x0000, &filters));

        // Empty filters = allow all
        assert!(DeviceManager::check_filter(0x1234, 0x5678, &[]));
    }

    #[test]
    fn test_malformed_filter_never_matches() {
        let filters = vec!["0x1209".to_string(), "zz:0x0001".to_string()];
        assert!(!DeviceManager::check_filter(0x1209, 0x0001, &filters));
    }

    #[test]
    fn test_transfer_attributes() {
        let bulk = EndpointDescriptor::new(0x01, transfer_attributes(TransferType::Bulk));
        assert_eq!(bulk.transfer_kind(), protocol::TransferKind::Bulk);

        let int = EndpointDescriptor::new(0x01, transfer_attributes(TransferType::Interrupt));
        assert_eq!(int.transfer_kind(), protocol::TransferKind::Interrupt);
    }
}
