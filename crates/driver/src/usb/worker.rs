//! USB worker thread
//!
//! Dedicated thread that runs the libusb event loop and owns the device
//! manager. It answers commands from the Tokio runtime and emits attach and
//! detach events back over the bridge.

use crate::controller::Driver;
use crate::usb::manager::DeviceManager;
use common::{DriverCommand, DriverWorker};
use rusb::UsbContext;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// USB worker thread state
pub struct UsbWorkerThread {
    manager: DeviceManager,
    worker: DriverWorker,
}

impl UsbWorkerThread {
    /// Create the device manager and attach the devices already present
    pub fn new(
        worker: DriverWorker,
        driver: Arc<Driver>,
        allowed_filters: Vec<String>,
    ) -> Result<Self, rusb::Error> {
        let mut manager = DeviceManager::new(driver, worker.event_tx.clone(), allowed_filters)?;
        manager.initialize()?;

        Ok(Self { manager, worker })
    }

    /// Run until a Shutdown command arrives or the bridge goes away
    ///
    /// Every device still attached is detached before returning.
    pub fn run(mut self) -> Result<(), rusb::Error> {
        info!("USB worker thread started");

        loop {
            match self.worker.try_recv_command() {
                Some(DriverCommand::Shutdown) => {
                    info!("USB worker shutting down");
                    break;
                }
                Some(cmd) => self.handle_command(cmd),
                None if self.worker.is_closed() => {
                    info!("Bridge closed, USB worker shutting down");
                    break;
                }
                None => {}
            }

            // Short timeout so commands are picked up promptly
            let timeout = Duration::from_millis(100);

            match self.manager.context().handle_events(Some(timeout)) {
                Ok(()) => {}
                Err(rusb::Error::Interrupted) => {
                    debug!("USB event handling interrupted");
                }
                Err(e) => {
                    warn!("Error handling USB events: {}", e);
                    std::thread::sleep(Duration::from_millis(100));
                }
            }

            self.manager.process_hotplug_events();
        }

        self.manager.shutdown();
        info!("USB worker thread stopped");
        Ok(())
    }

    fn handle_command(&mut self, cmd: DriverCommand) {
        match cmd {
            DriverCommand::ListDevices { response } => {
                let devices = self.manager.list_devices();
                debug!("Listing {} devices", devices.len());
                let _ = response.send(devices);
            }
            DriverCommand::Shutdown => {
                error!("Shutdown must be handled by the worker loop");
            }
        }
    }
}

/// Spawn the USB worker thread
///
/// The thread runs until a Shutdown command is received or the USB context
/// cannot be set up.
pub fn spawn_usb_worker(
    worker: DriverWorker,
    driver: Arc<Driver>,
    filters: Vec<String>,
) -> std::io::Result<std::thread::JoinHandle<Result<(), rusb::Error>>> {
    std::thread::Builder::new()
        .name("usb-worker".to_string())
        .spawn(move || {
            let worker_thread = UsbWorkerThread::new(worker, driver, filters)?;
            worker_thread.run()
        })
}
