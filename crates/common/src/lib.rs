//! Common utilities for hp-gadget
//!
//! This crate provides functionality shared between the driver core and its
//! host backend: the bulk transport abstraction, error handling, logging
//! setup, the async channel bridge to the USB thread, and test utilities.

pub mod channel;
pub mod error;
pub mod logging;
pub mod test_utils;
pub mod transport;

pub use channel::{DriverBridge, DriverCommand, DriverEvent, DriverWorker, create_driver_bridge};
pub use error::{Error, Result};
pub use logging::setup_logging;
pub use transport::BulkTransport;
