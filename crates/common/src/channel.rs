//! Async channel bridge between Tokio runtime and USB thread

use async_channel::{Receiver, Sender, bounded};
use protocol::{AttachError, DeviceSummary, NodeInfo, SlotId};

/// Commands from Tokio runtime to USB thread
#[derive(Debug)]
pub enum DriverCommand {
    /// List every attached hp-gadget device with its nodes
    ListDevices {
        /// Channel to send response back
        response: tokio::sync::oneshot::Sender<Vec<DeviceSummary>>,
    },

    /// Shutdown the USB thread gracefully, detaching every device
    Shutdown,
}

/// Attach/detach notifications from the USB thread
#[derive(Debug, Clone)]
pub enum DriverEvent {
    /// Device attached and its nodes published
    DeviceAttached {
        /// Slot identity of the new device
        slot: SlotId,
        /// Nodes published for its bulk-OUT endpoints
        nodes: Vec<NodeInfo>,
    },

    /// Device detached; nodes still held open go away at their last close
    DeviceDetached {
        /// Slot identity the device held
        slot: SlotId,
    },

    /// Matching device was refused
    AttachFailed {
        /// Bus number of the refused device
        bus_number: u8,
        /// Address of the refused device
        device_address: u8,
        /// Why the attach was refused
        error: AttachError,
    },
}

/// Handle for Tokio runtime (async)
#[derive(Clone)]
pub struct DriverBridge {
    cmd_tx: Sender<DriverCommand>,
    event_rx: Receiver<DriverEvent>,
}

impl DriverBridge {
    /// Send a command to the USB thread
    pub async fn send_command(&self, cmd: DriverCommand) -> crate::Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Receive an event from the USB thread
    pub async fn recv_event(&self) -> crate::Result<DriverEvent> {
        self.event_rx
            .recv()
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }
}

/// Handle for USB thread (blocking)
pub struct DriverWorker {
    pub(crate) cmd_rx: Receiver<DriverCommand>,
    /// Event sender (public for USB worker thread to access)
    pub event_tx: Sender<DriverEvent>,
}

impl DriverWorker {
    /// Receive a command from Tokio runtime (blocking)
    pub fn recv_command(&self) -> crate::Result<DriverCommand> {
        self.cmd_rx
            .recv_blocking()
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Try to receive a command without blocking
    pub fn try_recv_command(&self) -> Option<DriverCommand> {
        self.cmd_rx.try_recv().ok()
    }

    /// True once every `DriverBridge` has been dropped
    pub fn is_closed(&self) -> bool {
        self.cmd_rx.is_closed()
    }

    /// Send an event to Tokio runtime without blocking
    ///
    /// Events are informational; the event is dropped when the channel is
    /// full.
    pub fn send_event(&self, event: DriverEvent) -> crate::Result<()> {
        self.event_tx
            .try_send(event)
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }
}

/// Create the channel bridge between Tokio and USB thread
///
/// Returns (DriverBridge for Tokio, DriverWorker for USB thread)
pub fn create_driver_bridge() -> (DriverBridge, DriverWorker) {
    let (cmd_tx, cmd_rx) = bounded(64);
    let (event_tx, event_rx) = bounded(256);

    (
        DriverBridge { cmd_tx, event_rx },
        DriverWorker { cmd_rx, event_tx },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_bridge() {
        let (bridge, worker) = create_driver_bridge();

        // Spawn a thread to simulate USB worker
        let handle = std::thread::spawn(move || {
            let cmd = worker.recv_command().unwrap();
            matches!(cmd, DriverCommand::ListDevices { .. })
        });

        // Send command from async context
        let (tx, _rx) = tokio::sync::oneshot::channel();
        bridge
            .send_command(DriverCommand::ListDevices { response: tx })
            .await
            .unwrap();

        assert!(handle.join().unwrap());
    }

    #[tokio::test]
    async fn test_event_delivery() {
        let (bridge, worker) = create_driver_bridge();

        worker
            .send_event(DriverEvent::DeviceDetached { slot: SlotId(4) })
            .unwrap();

        match bridge.recv_event().await.unwrap() {
            DriverEvent::DeviceDetached { slot } => assert_eq!(slot, SlotId(4)),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_worker_sees_closed_bridge() {
        let (bridge, worker) = create_driver_bridge();
        assert!(!worker.is_closed());

        drop(bridge);
        assert!(worker.is_closed());
        assert!(worker.try_recv_command().is_none());
    }
}
