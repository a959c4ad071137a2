//! Device objects
//!
//! Two-level ownership graph built at attach:
//!
//! ```text
//!  Interface slot ──► UsbDevice ◄── EndpointDevice ◄── FileHandle
//!                        │  ▲            ▲
//!                        └──┴── children ┘
//! ```
//!
//! Every arrow is an `Arc`, so the strong count of each object is its
//! reference count. A `UsbDevice` is referenced by the interface slot and by
//! each live child; an `EndpointDevice` by its parent's child list and by
//! each open file handle. Detach drops the interface slot's reference and
//! drains the child list, which breaks the parent/child cycle: children
//! without open handles are freed at once, the rest at their last close, and
//! the parent goes last.

pub mod endpoint;
pub mod usb;

pub use endpoint::{EndpointDevice, PwmState};
pub use usb::UsbDevice;
