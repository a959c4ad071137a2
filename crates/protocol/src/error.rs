//! Protocol error types

use thiserror::Error;

/// Errors raised while validating PWM payloads and node names
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Write payload exceeds the maximum accepted size
    #[error("Payload too long: {len} bytes (max: {max})")]
    PayloadTooLong { len: usize, max: usize },

    /// Write payload carries no digits
    #[error("Payload carries no digits")]
    EmptyPayload,

    /// A byte other than an ASCII digit (or the final newline)
    #[error("Invalid byte {byte:#04x} at position {position}")]
    InvalidByte { position: usize, byte: u8 },

    /// Digit count exceeds the representable range
    #[error("Too many digits: {digits} (max: {max})")]
    TooManyDigits { digits: usize, max: usize },

    /// Generated class or node name does not fit its length limit
    #[error("Name '{name}' too long: {len} characters (max: {max})")]
    NameTooLong { name: String, len: usize, max: usize },
}

/// Type alias for protocol results
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProtocolError::InvalidByte {
            position: 2,
            byte: b'x',
        };
        let msg = format!("{}", err);
        assert!(msg.contains("0x78"));
        assert!(msg.contains("position 2"));
    }

    #[test]
    fn test_payload_too_long_error() {
        let err = ProtocolError::PayloadTooLong { len: 12, max: 9 };
        assert_eq!(format!("{}", err), "Payload too long: 12 bytes (max: 9)");
    }
}
