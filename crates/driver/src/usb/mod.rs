//! rusb host backend
//!
//! Binds the driver to real hardware: enumeration and hot-plug of matching
//! devices, interface claiming, and the bulk transport used by the endpoint
//! nodes.
//!
//! libusb calls block, so the backend runs in a dedicated thread (worker) and
//! talks to the Tokio runtime over the channel bridge in `common`.

pub mod manager;
pub mod transport;
pub mod worker;

pub use manager::DeviceManager;
pub use transport::{RusbTransport, map_rusb_error};
pub use worker::{UsbWorkerThread, spawn_usb_worker};
