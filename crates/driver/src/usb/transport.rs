//! Bulk transport over an opened rusb device handle

use common::BulkTransport;
use protocol::TransportError;
use rusb::{Context, DeviceHandle};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

/// An opened hp-gadget with the interfaces claimed on it
///
/// Shared by every interface of the device; the claims are released and the
/// kernel drivers reattached when the last reference goes away.
pub struct RusbTransport {
    handle: DeviceHandle<Context>,
    bus_number: u8,
    device_address: u8,
    claimed_interfaces: Mutex<Vec<u8>>,
}

impl RusbTransport {
    pub fn new(handle: DeviceHandle<Context>, bus_number: u8, device_address: u8) -> Self {
        Self {
            handle,
            bus_number,
            device_address,
            claimed_interfaces: Mutex::new(Vec::new()),
        }
    }

    /// Detach any kernel driver bound to `interface` and claim it
    pub fn claim(&self, interface: u8) -> Result<(), rusb::Error> {
        match self.handle.kernel_driver_active(interface) {
            Ok(true) => {
                debug!(
                    "Detaching kernel driver from interface {} on {:03}:{:03}",
                    interface, self.bus_number, self.device_address
                );
                if let Err(e) = self.handle.detach_kernel_driver(interface) {
                    warn!(
                        "Failed to detach kernel driver from interface {}: {}",
                        interface, e
                    );
                }
            }
            Ok(false) => {}
            Err(e) => {
                debug!(
                    "Could not check kernel driver status for interface {}: {}",
                    interface, e
                );
            }
        }

        self.handle.claim_interface(interface)?;
        self.claimed_interfaces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(interface);

        debug!(
            "Claimed interface {} on {:03}:{:03}",
            interface, self.bus_number, self.device_address
        );
        Ok(())
    }
}

impl BulkTransport for RusbTransport {
    fn write_bulk(
        &self,
        endpoint: u8,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        self.handle
            .write_bulk(endpoint, data, timeout)
            .map_err(map_rusb_error)
    }
}

impl Drop for RusbTransport {
    fn drop(&mut self) {
        let claimed = std::mem::take(
            self.claimed_interfaces
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner),
        );

        for interface in claimed {
            // Fails routinely once the device is unplugged
            if let Err(e) = self.handle.release_interface(interface) {
                debug!("Could not release interface {}: {}", interface, e);
                continue;
            }
            if let Err(e) = self.handle.attach_kernel_driver(interface) {
                debug!(
                    "Could not reattach kernel driver to interface {}: {}",
                    interface, e
                );
            }
        }

        debug!(
            "Closed device {:03}:{:03}",
            self.bus_number, self.device_address
        );
    }
}

/// Map rusb error to transport error
pub fn map_rusb_error(err: rusb::Error) -> TransportError {
    match err {
        rusb::Error::Timeout => TransportError::Timeout,
        rusb::Error::Pipe => TransportError::Pipe,
        rusb::Error::NoDevice => TransportError::NoDevice,
        rusb::Error::Io => TransportError::Io,
        _ => TransportError::Other {
            message: err.to_string(),
        },
    }
}
