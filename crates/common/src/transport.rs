//! Outbound bulk transport abstraction
//!
//! A `BulkTransport` stands for an opened physical device. The driver core
//! holds it behind an `Arc`, so the handle stays valid for as long as any
//! device object that can reach it is alive.

use protocol::TransportError;
use std::time::Duration;

/// Blocking bulk-OUT transfer primitive
pub trait BulkTransport: Send + Sync {
    /// Send `data` to the bulk-OUT endpoint `endpoint`, waiting at most
    /// `timeout`. Returns the number of bytes the device accepted.
    fn write_bulk(&self, endpoint: u8, data: &[u8], timeout: Duration)
    -> Result<usize, TransportError>;
}
