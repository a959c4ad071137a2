//! Protocol library for hp-gadget
//!
//! This crate defines everything that crosses a boundary of the driver: the
//! ASCII PWM text protocol spoken on each endpoint node, the naming rules for
//! node classes and nodes, the USB descriptor types handed to the attach
//! callback, and the error taxonomy shared by the driver and its host
//! backend.
//!
//! # Example
//!
//! ```
//! use protocol::{PwmValue, parse_write};
//!
//! let accepted = parse_write(b"1500\n").unwrap();
//! assert_eq!(accepted.digits, b"1500");
//! assert_eq!(accepted.value, PwmValue(1500));
//! assert_eq!(accepted.value.read_text(), "1500\n");
//!
//! // Malformed payloads are reported, never stored
//! assert!(parse_write(b"abc").is_err());
//! ```

pub mod error;
pub mod naming;
pub mod pwm;
pub mod types;

pub use error::{ProtocolError, Result};
pub use naming::{class_name, node_name};
pub use pwm::{AcceptedWrite, MAX_DIGITS, MAX_WRITE_LEN, PwmValue, parse_write};
pub use types::{
    AttachError, DevNumber, DeviceSummary, Direction, EndpointDescriptor, FileError,
    InterfaceDescriptor, NodeInfo, SlotId, TransferKind, TransportError,
};
