//! PWM text codec
//!
//! Each endpoint node carries one signed integer. User space reads it back as
//! decimal text followed by a newline and writes it as plain ASCII digits.
//! The peripheral receives the bare digits (no newline) over its bulk-OUT
//! endpoint.
//!
//! Write validation rules:
//! - at most [`MAX_WRITE_LEN`] bytes as supplied by the caller
//! - a single `\n` is allowed at the final position and is stripped
//! - every other byte must be an ASCII digit
//! - at most [`MAX_DIGITS`] digits remain after stripping

use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest write payload accepted, newline included
pub const MAX_WRITE_LEN: usize = 9;

/// Largest digit count accepted after the trailing newline is stripped
pub const MAX_DIGITS: usize = 8;

/// PWM value stored per endpoint and sent to the peripheral
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PwmValue(pub i32);

impl PwmValue {
    /// Sent in place of a value when nothing has been stored yet
    pub const UNSET: PwmValue = PwmValue(-1);

    /// Decimal text sent to the peripheral
    pub fn encode(self) -> String {
        self.0.to_string()
    }

    /// Text handed to a reader: decimal value plus newline
    pub fn read_text(self) -> String {
        format!("{}\n", self.0)
    }
}

impl fmt::Display for PwmValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A write payload that passed validation
///
/// `digits` borrows the caller's buffer with the trailing newline removed;
/// it is exactly what goes out over the bulk endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceptedWrite<'a> {
    pub digits: &'a [u8],
    pub value: PwmValue,
}

/// Validate a caller-supplied write payload
///
/// Returns the digits to transmit and the parsed value, or the reason the
/// payload is malformed.
pub fn parse_write(input: &[u8]) -> Result<AcceptedWrite<'_>> {
    if input.len() > MAX_WRITE_LEN {
        return Err(ProtocolError::PayloadTooLong {
            len: input.len(),
            max: MAX_WRITE_LEN,
        });
    }

    let digits = match input.split_last() {
        Some((b'\n', rest)) => rest,
        _ => input,
    };

    if let Some(position) = digits.iter().position(|b| !b.is_ascii_digit()) {
        return Err(ProtocolError::InvalidByte {
            position,
            byte: digits[position],
        });
    }

    if digits.len() > MAX_DIGITS {
        return Err(ProtocolError::TooManyDigits {
            digits: digits.len(),
            max: MAX_DIGITS,
        });
    }

    if digits.is_empty() {
        return Err(ProtocolError::EmptyPayload);
    }

    // Eight decimal digits always fit in i32
    let value = digits
        .iter()
        .fold(0i32, |acc, d| acc * 10 + i32::from(d - b'0'));

    Ok(AcceptedWrite {
        digits,
        value: PwmValue(value),
    })
}
