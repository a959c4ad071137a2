//! hp-gadget driver
//!
//! Attaches to hp-gadget PWM peripherals and exposes each bulk-OUT endpoint
//! as a node carrying one integer value.
//!
//! - [`slots`]: the 64-entry device identity pool
//! - [`device`]: the reference-counted USB device / endpoint device graph
//! - [`controller`]: attach (probe) and detach (disconnect)
//! - [`file`]: open/read/write/release on a node
//! - [`host`] and [`nodes`]: node publication and minor-range reservation
//! - [`usb`]: the rusb backend that feeds real devices to the controller
//!
//! # Example
//!
//! ```
//! use common::test_utils::{RecordingTransport, create_bulk_out_interface};
//! use driver::controller::{DEFAULT_TRANSFER_TIMEOUT, Driver, Interface};
//! use driver::file::FileHandle;
//! use driver::nodes::NodeTable;
//! use std::sync::Arc;
//!
//! let table = Arc::new(NodeTable::new());
//! let driver = Driver::new(table.clone(), table.clone(), DEFAULT_TRANSFER_TIMEOUT);
//!
//! let transport = Arc::new(RecordingTransport::new());
//! let intf = Interface::new(create_bulk_out_interface(1), transport.clone(), 1, 4);
//! driver.probe(&intf).unwrap();
//!
//! let dev = table.dev_by_name("hp-gadget0pwm0").unwrap();
//! let mut file = FileHandle::open(table.as_ref(), dev).unwrap();
//! file.write(b"1500\n").unwrap();
//! assert_eq!(transport.sent_text(1), vec!["1500"]);
//! ```

pub mod config;
pub mod console;
pub mod controller;
pub mod device;
pub mod file;
pub mod host;
pub mod nodes;
pub mod slots;
pub mod usb;

pub use config::DriverConfig;
pub use controller::{Driver, Interface};
pub use file::FileHandle;
pub use nodes::NodeTable;
