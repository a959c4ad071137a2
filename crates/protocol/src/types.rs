//! USB descriptor, identity and error type definitions
//!
//! These types are shared by the driver core, the host backend and the
//! command bridge, so none of them depend on a particular USB library.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Device instance identity handed out by the slot allocator (0..64)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotId(pub u8);

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Character device number: a (major, minor) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DevNumber {
    pub major: u32,
    pub minor: u32,
}

impl DevNumber {
    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Device number `offset` minors past this one
    pub fn offset(self, offset: u32) -> Self {
        Self {
            major: self.major,
            minor: self.minor + offset,
        }
    }
}

impl fmt::Display for DevNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.major, self.minor)
    }
}

/// Endpoint data direction, from bit 7 of the endpoint address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Host to device
    Out,
    /// Device to host
    In,
}

/// Endpoint transfer type, from bits 0..1 of bmAttributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferKind {
    Control,
    Isochronous,
    Bulk,
    Interrupt,
}

/// Endpoint descriptor as reported by the interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    /// bEndpointAddress: endpoint number plus direction bit
    pub address: u8,
    /// bmAttributes: transfer type in the low two bits
    pub attributes: u8,
}

impl EndpointDescriptor {
    pub const DIR_IN: u8 = 0x80;
    pub const XFER_TYPE_MASK: u8 = 0x03;

    pub fn new(address: u8, attributes: u8) -> Self {
        Self {
            address,
            attributes,
        }
    }

    /// Bulk-OUT endpoint with the given endpoint number
    pub fn bulk_out(number: u8) -> Self {
        Self::new(number & 0x0f, 0x02)
    }

    /// Bulk-IN endpoint with the given endpoint number
    pub fn bulk_in(number: u8) -> Self {
        Self::new((number & 0x0f) | Self::DIR_IN, 0x02)
    }

    /// Interrupt-OUT endpoint with the given endpoint number
    pub fn interrupt_out(number: u8) -> Self {
        Self::new(number & 0x0f, 0x03)
    }

    pub fn direction(&self) -> Direction {
        if self.address & Self::DIR_IN != 0 {
            Direction::In
        } else {
            Direction::Out
        }
    }

    pub fn transfer_kind(&self) -> TransferKind {
        match self.attributes & Self::XFER_TYPE_MASK {
            0 => TransferKind::Control,
            1 => TransferKind::Isochronous,
            2 => TransferKind::Bulk,
            _ => TransferKind::Interrupt,
        }
    }
}

/// Interface descriptor: the current alternate setting's endpoints in
/// enumeration order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceDescriptor {
    pub number: u8,
    pub endpoints: Vec<EndpointDescriptor>,
}

impl InterfaceDescriptor {
    pub fn new(number: u8, endpoints: Vec<EndpointDescriptor>) -> Self {
        Self { number, endpoints }
    }

    /// bNumEndpoints
    pub fn num_endpoints(&self) -> usize {
        self.endpoints.len()
    }
}

/// Published node as shown to user space
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Node name (e.g. `hp-gadget0pwm1`)
    pub name: String,
    /// Class the node was published under
    pub class: String,
    /// Device number bound to the node
    pub dev: DevNumber,
    /// Bulk-OUT endpoint address behind the node
    pub endpoint: u8,
}

/// Attached physical device as reported to the command bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSummary {
    /// Slot identity of the device
    pub slot: SlotId,
    /// Node class name (e.g. `hp-gadget0`)
    pub class: String,
    /// Bus number on the host
    pub bus_number: u8,
    /// Device address on the bus
    pub device_address: u8,
    /// Interface the nodes were created from
    pub interface: u8,
    /// Nodes published for the device
    pub nodes: Vec<NodeInfo>,
}

/// Failure that refuses an attach; every resource acquired so far is released
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttachError {
    /// All device slots are in use
    #[error("Can't handle more than {capacity} devices")]
    Exhausted { capacity: usize },

    /// Memory for device state could not be obtained
    #[error("Out of memory")]
    AllocationFailure,

    /// The minor-number range could not be reserved
    #[error("Couldn't reserve {count} minors for {name}")]
    RangeReservationFailure { name: String, count: usize },
}

/// Failure of a single file operation on an endpoint node
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FileError {
    /// Handle is not associated with a live endpoint
    #[error("No such device")]
    NoDevice,

    /// Delivery to the caller or the bulk transfer failed
    #[error("Bad address: {message}")]
    FaultySource { message: String },
}

/// Failure reported by the bulk transport
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Transfer timed out")]
    Timeout,
    #[error("Endpoint stalled")]
    Pipe,
    #[error("Device disconnected")]
    NoDevice,
    #[error("I/O error")]
    Io,
    #[error("Transport error: {message}")]
    Other { message: String },
}

impl From<TransportError> for FileError {
    fn from(err: TransportError) -> Self {
        FileError::FaultySource {
            message: err.to_string(),
        }
    }
}
