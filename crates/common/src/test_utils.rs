//! Test utilities for hp-gadget
//!
//! Provides a recording bulk transport and descriptor builders for testing
//! across crates.
//!
//! # Example
//!
//! ```
//! use common::BulkTransport;
//! use common::test_utils::RecordingTransport;
//! use std::time::Duration;
//!
//! let transport = RecordingTransport::new();
//! transport.write_bulk(0x01, b"42", Duration::from_secs(1)).unwrap();
//! assert_eq!(transport.sent_text(0x01), vec!["42".to_string()]);
//! ```

use crate::transport::BulkTransport;
use protocol::{EndpointDescriptor, InterfaceDescriptor, TransportError};
use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// One bulk transfer seen by [`RecordingTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentTransfer {
    pub endpoint: u8,
    pub data: Vec<u8>,
    pub timeout: Duration,
}

/// Bulk transport that records every transfer
///
/// After [`RecordingTransport::unplug`] every transfer fails with
/// `TransportError::NoDevice`, the way a real device handle behaves once the
/// cable is pulled.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<SentTransfer>>,
    unplugged: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following transfer fail
    pub fn unplug(&self) {
        self.unplugged.store(true, Ordering::SeqCst);
    }

    /// All recorded transfers, oldest first
    pub fn sent(&self) -> Vec<SentTransfer> {
        self.sent.lock().unwrap().clone()
    }

    /// Payloads sent to `endpoint` as UTF-8 text, oldest first
    pub fn sent_text(&self, endpoint: u8) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.endpoint == endpoint)
            .map(|t| String::from_utf8_lossy(&t.data).into_owned())
            .collect()
    }

    /// Forget every recorded transfer
    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

impl BulkTransport for RecordingTransport {
    fn write_bulk(
        &self,
        endpoint: u8,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        if self.unplugged.load(Ordering::SeqCst) {
            return Err(TransportError::NoDevice);
        }

        self.sent.lock().unwrap().push(SentTransfer {
            endpoint,
            data: data.to_vec(),
            timeout,
        });
        Ok(data.len())
    }
}

/// Interface with `count` bulk-OUT endpoints numbered from 1
pub fn create_bulk_out_interface(count: u8) -> InterfaceDescriptor {
    InterfaceDescriptor::new(
        0,
        (1..=count).map(EndpointDescriptor::bulk_out).collect(),
    )
}

/// Interface mixing qualifying and non-qualifying endpoints
///
/// Index 0: bulk-OUT 0x01, index 1: bulk-IN 0x82, index 2: interrupt-OUT
/// 0x03, index 3: bulk-OUT 0x04.
pub fn create_mixed_interface() -> InterfaceDescriptor {
    InterfaceDescriptor::new(
        0,
        vec![
            EndpointDescriptor::bulk_out(1),
            EndpointDescriptor::bulk_in(2),
            EndpointDescriptor::interrupt_out(3),
            EndpointDescriptor::bulk_out(4),
        ],
    )
}

/// Timeout wrapper for async tests
///
/// Wraps an async operation with a timeout to prevent tests from hanging.
pub async fn with_timeout<T, F>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| TimeoutError { duration })
}

/// Error returned when a test times out
#[derive(Debug)]
pub struct TimeoutError {
    /// The timeout duration that was exceeded
    pub duration: Duration,
}

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Test timed out after {:?}", self.duration)
    }
}

impl std::error::Error for TimeoutError {}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::{Direction, TransferKind};

    #[test]
    fn test_recording_transport_records() {
        let transport = RecordingTransport::new();
        let timeout = Duration::from_secs(10);

        assert_eq!(transport.write_bulk(0x01, b"12", timeout), Ok(2));
        assert_eq!(transport.write_bulk(0x02, b"3", timeout), Ok(1));

        assert_eq!(transport.sent().len(), 2);
        assert_eq!(transport.sent()[0].timeout, timeout);
        assert_eq!(transport.sent_text(0x01), vec!["12".to_string()]);
        assert_eq!(transport.sent_text(0x02), vec!["3".to_string()]);
    }

    #[test]
    fn test_unplugged_transport_fails() {
        let transport = RecordingTransport::new();
        transport.unplug();

        assert_eq!(
            transport.write_bulk(0x01, b"1", DEFAULT_TEST_TIMEOUT),
            Err(TransportError::NoDevice)
        );
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_create_bulk_out_interface() {
        let iface = create_bulk_out_interface(3);

        assert_eq!(iface.num_endpoints(), 3);
        assert!(iface.endpoints.iter().all(|e| e.direction() == Direction::Out));
        assert!(
            iface
                .endpoints
                .iter()
                .all(|e| e.transfer_kind() == TransferKind::Bulk)
        );
        assert_eq!(iface.endpoints[2].address, 0x03);
    }

    #[test]
    fn test_create_mixed_interface() {
        let iface = create_mixed_interface();

        assert_eq!(iface.endpoints[1].address, 0x82);
        assert_eq!(iface.endpoints[1].direction(), Direction::In);
        assert_eq!(iface.endpoints[2].transfer_kind(), TransferKind::Interrupt);
    }

    #[tokio::test]
    async fn test_with_timeout_success() {
        let result = with_timeout(DEFAULT_TEST_TIMEOUT, async { 42 }).await;

        assert!(result.is_ok());
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_with_timeout_failure() {
        let result = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            42
        })
        .await;

        assert!(result.is_err());
    }
}
