//! Device connection management.
//!
//! The manager owns the single active [`DeviceSession`], the autoconnect
//! poller and the flag telling whether the next disconnect is a reset the
//! installer triggered on purpose.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use super::autoconnect::AutoConnect;
use super::config::AUTOCONNECT_DELAY;
use super::device::{DeviceFilter, DeviceInfo};
use super::error::{DfuError, DfuResult};
use super::session::DeviceSession;
use crate::traits::DfuBackend;

/// Connection states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// The bound device is resetting after a manifestation write.
    AwaitingReconnect,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::AwaitingReconnect => "awaiting reconnect",
        };
        f.write_str(name)
    }
}

pub struct ConnectionManager {
    backend: Arc<dyn DfuBackend>,
    interval: Duration,
    filter: Option<DeviceFilter>,
    poller: Option<AutoConnect>,
    session: Option<DeviceSession>,
    state: ConnectionState,
    expect_disconnect: bool,
}

impl ConnectionManager {
    pub fn new(backend: Arc<dyn DfuBackend>) -> Self {
        Self::with_interval(backend, AUTOCONNECT_DELAY)
    }

    pub fn with_interval(backend: Arc<dyn DfuBackend>, interval: Duration) -> Self {
        Self {
            backend,
            interval,
            filter: None,
            poller: None,
            session: None,
            state: ConnectionState::Disconnected,
            expect_disconnect: false,
        }
    }

    pub fn backend(&self) -> &Arc<dyn DfuBackend> {
        &self.backend
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_polling(&self) -> bool {
        self.poller.as_ref().is_some_and(AutoConnect::is_running)
    }

    pub fn disconnect_expected(&self) -> bool {
        self.expect_disconnect
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            log::debug!("Connection: {} -> {}", self.state, state);
            self.state = state;
        }
    }

    /// Let the user pick a device and bind it.
    ///
    /// The filter is kept for the polling that follows a disconnect.
    pub fn request(&mut self, filter: &DeviceFilter) -> DfuResult<&mut DeviceSession> {
        let device = self.backend.request_device(filter)?;
        self.filter = Some(filter.clone());
        self.connect(device)
    }

    /// Open a session on `device`, replacing any previous one.
    ///
    /// Polling is stopped first so that no second open can race this one.
    pub fn connect(&mut self, device: DeviceInfo) -> DfuResult<&mut DeviceSession> {
        self.stop_auto_connect();
        self.session = None;
        self.set_state(ConnectionState::Connecting);

        let opened = self
            .backend
            .open_device(&device)
            .and_then(|handle| DeviceSession::open(device, handle));

        match opened {
            Ok(session) => {
                self.set_state(ConnectionState::Connected);
                Ok(self.session.insert(session))
            }
            Err(e) => {
                log::error!("Failed to connect: {}", e);
                self.set_state(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    /// Start (or restart) polling for devices matching `filter`.
    pub fn start_auto_connect(&mut self, filter: DeviceFilter) {
        self.stop_auto_connect();
        self.poller = Some(AutoConnect::start(
            Arc::clone(&self.backend),
            filter.clone(),
            self.interval,
        ));
        self.filter = Some(filter);
    }

    pub fn stop_auto_connect(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.stop();
        }
    }

    fn restart_auto_connect(&mut self) {
        if let Some(filter) = self.filter.clone() {
            self.start_auto_connect(filter);
        }
    }

    /// Wait up to `timeout` for the poller to match a device, and bind it.
    ///
    /// Returns the bound device, or `None` when nothing matched in time.
    pub fn poll_match(&mut self, timeout: Duration) -> DfuResult<Option<DeviceInfo>> {
        let matched = match &self.poller {
            Some(poller) => poller.wait_match(timeout),
            None => return Ok(None),
        };

        match matched {
            Some(device) => {
                log::info!("Autoconnected to {}", device);
                let session = self.connect(device)?;
                Ok(Some(session.info().clone()))
            }
            None => Ok(None),
        }
    }

    /// Flag the next disconnect of the bound device as expected.
    pub fn expect_disconnect(&mut self) {
        self.expect_disconnect = true;
    }

    /// Drop the session of a device that is resetting on purpose and start
    /// waiting for it to come back.
    pub fn await_reset(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.mark_disconnected();
        }
        self.session = None;
        self.set_state(ConnectionState::AwaitingReconnect);
        self.restart_auto_connect();
    }

    /// Handle a disconnect event from the host.
    ///
    /// A disconnect of the bound device tears its session down; it is an
    /// error unless it was flagged as expected. Disconnects of other
    /// devices are ignored. Polling restarts in every case.
    pub fn on_disconnect(&mut self, device: &DeviceInfo) -> DfuResult<()> {
        let bound = self
            .session
            .as_ref()
            .is_some_and(|session| session.info().id == device.id);

        let result = if bound {
            if let Some(session) = self.session.as_mut() {
                session.mark_disconnected();
            }
            self.session = None;

            if self.expect_disconnect {
                log::info!("{} disconnected as expected", device);
                self.set_state(ConnectionState::AwaitingReconnect);
                Ok(())
            } else {
                log::error!("{} disconnected unexpectedly", device);
                self.set_state(ConnectionState::Disconnected);
                Err(DfuError::UnexpectedDisconnect {
                    device: device.to_string(),
                })
            }
        } else {
            log::debug!("Ignoring disconnect of unbound device {}", device);
            Ok(())
        };

        self.restart_auto_connect();
        result
    }

    /// Wait for the device to re-enumerate after an expected reset.
    ///
    /// On success the expected-disconnect flag is cleared.
    pub fn wait_for_reconnect(&mut self, timeout: Duration) -> DfuResult<DeviceInfo> {
        if self.poller.is_none() {
            self.restart_auto_connect();
        }

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            if let Some(device) = self.poll_match(remaining)? {
                self.expect_disconnect = false;
                return Ok(device);
            }
            if !self.is_polling() {
                break;
            }
        }

        Err(DfuError::ReconnectTimeout {
            timeout_ms: timeout.as_millis() as u64,
        })
    }

    /// Clear the expected-disconnect flag.
    pub fn clear_expected_disconnect(&mut self) {
        self.expect_disconnect = false;
    }

    pub fn session(&self) -> Option<&DeviceSession> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> DfuResult<&mut DeviceSession> {
        self.session.as_mut().ok_or(DfuError::NoActiveSession)
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.stop_auto_connect();
    }
}
