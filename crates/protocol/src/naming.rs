//! Class and node naming
//!
//! A physical device gets a node class named `hp-gadget<slot>`. Each of its
//! bulk-OUT endpoints is published as `<class>pwm<index>`, where the class
//! part is cut to its first [`CLASS_PREFIX_CHARS`] characters and `index` is
//! the endpoint's position in the interface descriptor.

use crate::error::{ProtocolError, Result};
use crate::types::SlotId;

/// Fixed prefix of every node class name
pub const CLASS_PREFIX: &str = "hp-gadget";

/// Fixed infix between class name and endpoint index
pub const NODE_SUFFIX: &str = "pwm";

/// Longest class name, in characters
pub const MAX_CLASS_NAME_LEN: usize = 13;

/// Characters of the class name carried into a node name
pub const CLASS_PREFIX_CHARS: usize = 15;

/// Longest node name, in characters
pub const MAX_NODE_NAME_LEN: usize = 21;

/// Name of the node class for a slot
pub fn class_name(slot: SlotId) -> Result<String> {
    let name = format!("{}{}", CLASS_PREFIX, slot.0);
    check_len(name, MAX_CLASS_NAME_LEN)
}

/// Name of the node published for the endpoint at `index`
pub fn node_name(class_name: &str, index: u8) -> Result<String> {
    let prefix: String = class_name.chars().take(CLASS_PREFIX_CHARS).collect();
    let name = format!("{}{}{}", prefix, NODE_SUFFIX, index);
    check_len(name, MAX_NODE_NAME_LEN)
}

fn check_len(name: String, max: usize) -> Result<String> {
    let len = name.chars().count();
    if len > max {
        return Err(ProtocolError::NameTooLong { name, len, max });
    }
    Ok(name)
}
