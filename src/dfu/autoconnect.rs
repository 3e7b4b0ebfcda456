//! Background device polling.
//!
//! The poller enumerates DFU devices on a fixed interval and reports the
//! first one matching its filter. It stops itself after a match; the owner
//! restarts it when the next session ends.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::device::{find_matching_devices, DeviceFilter, DeviceInfo};
use crate::traits::DfuBackend;

/// A running autoconnect loop.
///
/// Dropping the poller stops it.
pub struct AutoConnect {
    stop: Option<Sender<()>>,
    matches: Receiver<DeviceInfo>,
    worker: Option<JoinHandle<()>>,
}

impl AutoConnect {
    /// Start polling `backend` every `interval`.
    ///
    /// The first scan happens immediately.
    pub fn start(backend: Arc<dyn DfuBackend>, filter: DeviceFilter, interval: Duration) -> Self {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (match_tx, match_rx) = mpsc::channel();

        log::debug!(
            "Autoconnect started (vid 0x{:04X}, pid 0x{:04X}, serial {:?}, every {:?})",
            filter.vendor_id,
            filter.product_id,
            filter.serial,
            interval
        );

        let worker = thread::spawn(move || loop {
            match backend.list_devices() {
                Ok(devices) => {
                    if let Some(device) = find_matching_devices(&devices, &filter).into_iter().next()
                    {
                        log::debug!("Autoconnect matched {}", device);
                        let _ = match_tx.send(device);
                        return;
                    }
                }
                Err(e) => log::warn!("Device scan failed: {}", e),
            }

            // Sleeping on the stop channel makes the wait cancellable
            match stop_rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
            }
        });

        Self {
            stop: Some(stop_tx),
            matches: match_rx,
            worker: Some(worker),
        }
    }

    /// Wait up to `timeout` for a matching device.
    ///
    /// Returns `None` on timeout, and also once the loop has ended without
    /// a pending match.
    pub fn wait_match(&self, timeout: Duration) -> Option<DeviceInfo> {
        self.matches.recv_timeout(timeout).ok()
    }

    /// Whether the polling thread is still scanning.
    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Stop polling and wait for the thread to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Closing the channel wakes the thread out of its wait
        self.stop.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Autoconnect thread panicked");
            }
        }
    }
}

impl Drop for AutoConnect {
    fn drop(&mut self) {
        self.shutdown();
    }
}
