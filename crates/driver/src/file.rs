//! File operations on an endpoint node
//!
//! A [`FileHandle`] is what `open` returns for a node. It holds a reference
//! on the endpoint device until `release` (or drop), which keeps the device
//! and its parent usable even after the physical device has been detached.
//! Operations in that window fail with [`FileError::FaultySource`] once the
//! transport reports the device gone.

use crate::device::EndpointDevice;
use crate::host::NodeRegistry;
use protocol::{DevNumber, FileError, PwmValue, parse_write};
use std::sync::Arc;
use tracing::{debug, warn};

/// An open handle bound to one endpoint device
#[derive(Default)]
pub struct FileHandle {
    endpoint: Option<Arc<EndpointDevice>>,
}

impl FileHandle {
    /// Open the node at `dev`
    ///
    /// Resets the one-shot read gate so the first read after open always
    /// returns the value.
    pub fn open(registry: &dyn NodeRegistry, dev: DevNumber) -> Result<Self, FileError> {
        let endpoint = registry.lookup(dev).ok_or_else(|| {
            warn!("Can't find device for minor {}", dev.minor);
            FileError::NoDevice
        })?;

        endpoint.lock_state().consumed = false;
        debug!("Opened {}", dev);

        Ok(Self {
            endpoint: Some(endpoint),
        })
    }

    /// Endpoint this handle is bound to
    pub fn endpoint(&self) -> Option<&Arc<EndpointDevice>> {
        self.endpoint.as_ref()
    }

    /// Copy `"<value>\n"` into `buf`, once per write cycle
    ///
    /// Returns 0 once the value has been consumed. A value that was never
    /// set is initialised to 0 and sent to the peripheral first.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, FileError> {
        let endpoint = self.endpoint.as_ref().ok_or(FileError::NoDevice)?;
        let mut state = endpoint.lock_state();

        if state.consumed {
            return Ok(0);
        }

        let value = match state.current {
            Some(value) => value,
            None => {
                let value = PwmValue::default();
                state.current = Some(value);
                if let Err(e) = endpoint.send(value.encode().as_bytes()) {
                    warn!("Sending initial value failed: {}", e);
                }
                value
            }
        };

        let text = value.read_text();
        let buf_len = buf.len();
        let out = buf
            .get_mut(..text.len())
            .ok_or_else(|| FileError::FaultySource {
                message: format!("buffer of {} bytes cannot hold {:?}", buf_len, text),
            })?;
        out.copy_from_slice(text.as_bytes());

        state.consumed = true;
        Ok(text.len())
    }

    /// Store and send a new value
    ///
    /// A malformed payload is not an error: the stored value is left alone
    /// and re-sent instead, or [`PwmValue::UNSET`] if nothing was stored
    /// yet. Either way the caller's byte count is returned
    /// once the transfer succeeds.
    pub fn write(&mut self, data: &[u8]) -> Result<usize, FileError> {
        let endpoint = self.endpoint.as_ref().ok_or(FileError::NoDevice)?;
        let mut state = endpoint.lock_state();

        let sent = match parse_write(data) {
            Ok(accepted) => {
                state.current = Some(accepted.value);
                endpoint.send(accepted.digits)
            }
            Err(e) => {
                debug!("Malformed write ({}), resending current value", e);
                let current = state.current.unwrap_or(PwmValue::UNSET);
                endpoint.send(current.encode().as_bytes())
            }
        };

        sent.map_err(|e| {
            warn!("Bulk write to {:#04x} failed: {}", endpoint.address(), e);
            FileError::from(e)
        })?;

        state.consumed = false;
        Ok(data.len())
    }

    /// Drop the reference taken by `open`
    pub fn release(&mut self) -> Result<(), FileError> {
        let endpoint = self.endpoint.take().ok_or(FileError::NoDevice)?;
        debug!("Released endpoint {:#04x}", endpoint.address());
        Ok(())
    }
}
