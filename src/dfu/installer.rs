//! Firmware installation orchestrator.
//!
//! Drives one install end to end:
//! 1. Detect - bind a calculator and report its model and software
//! 2. Read storage - dump the script storage and keep the Python scripts
//! 3. Flash - write the firmware images for the model (external bank
//!    first on dual-bank models, internal bank last with manifestation)
//! 4. Reconnect - wait for the calculator to come back from its reset
//! 5. Restore - write the scripts back into the new storage region

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::config::{
    AUTOCONNECT_DELAY, EXTERNAL_FIRMWARE, EXTERNAL_FLASH_BASE, INTERNAL_FIRMWARE,
    INTERNAL_FLASH_BASE, REBOOT_TIMEOUT_MS,
};
use super::connection::ConnectionManager;
use super::device::{DeviceFilter, DeviceInfo, Model};
use super::error::{DfuError, DfuResult, ErrorKind};
use super::storage::StorageContainer;
use super::verifier::ArtifactVerifier;
use crate::firmware::{FirmwareCatalog, FirmwareRelease};
use crate::settings::InstallerSettings;
use crate::traits::{ArtifactStore, DfuBackend, StatusSink};

/// Flash bank being written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FlashStage {
    External,
    Internal,
}

/// Orchestrator states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "data")]
pub enum InstallState {
    Idle,
    Detecting,
    ReadingStorage,
    Flashing { stage: FlashStage },
    AwaitingPostFlashReconnect,
    RestoringStorage,
    Done,
    Error { kind: ErrorKind },
}

impl InstallState {
    /// Get a human-readable message for this state.
    pub fn message(&self) -> String {
        match self {
            InstallState::Idle => "Waiting for a calculator...".into(),
            InstallState::Detecting => "Detecting calculator...".into(),
            InstallState::ReadingStorage => "Saving scripts...".into(),
            InstallState::Flashing {
                stage: FlashStage::External,
            } => "Writing external flash...".into(),
            InstallState::Flashing {
                stage: FlashStage::Internal,
            } => "Writing internal flash...".into(),
            InstallState::AwaitingPostFlashReconnect => {
                "Waiting for calculator to restart...".into()
            }
            InstallState::RestoringStorage => "Restoring scripts...".into(),
            InstallState::Done => "Installation complete!".into(),
            InstallState::Error { kind } => format!("Installation failed ({:?})", kind),
        }
    }
}

impl fmt::Display for InstallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

/// Knobs of one installer instance.
#[derive(Debug, Clone)]
pub struct InstallerOptions {
    pub dry_run: bool,
    pub strict_checksums: bool,
    pub filter: DeviceFilter,
    pub autoconnect_interval: Duration,
    pub reconnect_timeout: Duration,
}

impl Default for InstallerOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            strict_checksums: false,
            filter: DeviceFilter::default(),
            autoconnect_interval: AUTOCONNECT_DELAY,
            reconnect_timeout: Duration::from_millis(REBOOT_TIMEOUT_MS),
        }
    }
}

impl From<&InstallerSettings> for InstallerOptions {
    fn from(settings: &InstallerSettings) -> Self {
        Self {
            dry_run: settings.dry_run,
            strict_checksums: settings.strict_checksums,
            filter: settings.device_filter(),
            autoconnect_interval: settings.autoconnect_interval(),
            reconnect_timeout: settings.reconnect_timeout(),
        }
    }
}

/// State carried across the post-flash reset.
#[derive(Debug, Clone)]
struct InstallSession {
    release: FirmwareRelease,
    model: Model,
    snapshot: StorageContainer,
}

pub struct Installer<S: StatusSink> {
    catalog: FirmwareCatalog,
    connection: ConnectionManager,
    verifier: ArtifactVerifier,
    sink: S,
    options: InstallerOptions,
    target: Option<FirmwareRelease>,
    pending: Option<InstallSession>,
    state: InstallState,
}

impl<S: StatusSink> Installer<S> {
    /// Create an installer using the shipped firmware catalog.
    pub fn new(
        backend: Arc<dyn DfuBackend>,
        store: Arc<dyn ArtifactStore>,
        sink: S,
        options: InstallerOptions,
    ) -> DfuResult<Self> {
        Ok(Self::with_catalog(
            FirmwareCatalog::builtin()?,
            backend,
            store,
            sink,
            options,
        ))
    }

    pub fn with_catalog(
        catalog: FirmwareCatalog,
        backend: Arc<dyn DfuBackend>,
        store: Arc<dyn ArtifactStore>,
        sink: S,
        options: InstallerOptions,
    ) -> Self {
        if options.dry_run {
            log::info!("Dry run: downloads and flash writes are skipped");
        }

        Self {
            catalog,
            connection: ConnectionManager::with_interval(backend, options.autoconnect_interval),
            verifier: ArtifactVerifier::new(store),
            sink,
            options,
            target: None,
            pending: None,
            state: InstallState::Idle,
        }
    }

    pub fn state(&self) -> InstallState {
        self.state
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    /// Release selected by [`init`](Self::init).
    pub fn target(&self) -> Option<&FirmwareRelease> {
        self.target.as_ref()
    }

    /// Whether scripts are waiting to be written back after a reset.
    pub fn has_pending_restore(&self) -> bool {
        self.pending.is_some()
    }

    fn set_state(&mut self, state: InstallState) {
        if self.state != state {
            log::debug!("Installer: {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    /// Enter the error state and report `error` to the sink.
    fn fail(&mut self, error: DfuError) -> DfuError {
        log::error!("{}", error);
        self.set_state(InstallState::Error { kind: error.kind() });
        self.sink.calculator_error(true, Some(error.detail()));
        error
    }

    fn resolve_release(&mut self, version: &str) -> DfuResult<FirmwareRelease> {
        match self.catalog.resolve(version) {
            Ok(release) => Ok(release.clone()),
            Err(e) => {
                let name = self.catalog.resolve_name(version).to_string();
                self.sink.firmware_not_found(&name);
                self.set_state(InstallState::Error { kind: e.kind() });
                Err(e)
            }
        }
    }

    /// Select the release to install and start looking for calculators.
    pub fn init(&mut self, version: &str) -> DfuResult<()> {
        let release = self.resolve_release(version)?;
        log::info!("Selected firmware {}", release.name);
        self.target = Some(release);
        self.sink.calculator_error(false, None);

        if !self.connection.backend().is_supported() {
            self.sink.installer_not_compatible();
            self.set_state(InstallState::Error {
                kind: ErrorKind::UnsupportedEnvironment,
            });
            return Err(DfuError::UnsupportedEnvironment);
        }

        self.connection
            .start_auto_connect(self.options.filter.clone());
        Ok(())
    }

    /// Let the user pick a calculator, bind it and report what it runs.
    pub fn detect(&mut self) -> DfuResult<()> {
        self.sink.calculator_error(false, None);
        self.set_state(InstallState::Detecting);

        let filter = self.options.filter.clone();
        let bound = self.connection.request(&filter).map(|_| ());
        let result = bound.and_then(|()| self.report_calculator_info());

        match result {
            Ok(()) => {
                self.set_state(InstallState::Idle);
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn report_calculator_info(&mut self) -> DfuResult<()> {
        let session = self.connection.session_mut()?;
        let model = session.model()?;
        let info = session.read_platform_info()?;

        self.sink.set_model(model.name());
        if info.magik {
            self.sink.set_epsilon_version(&info.version);
            if let Some(omega) = info.omega.as_ref().filter(|o| o.installed) {
                self.sink.set_omega_version(&omega.version);
            }
            if let Some(user) = info.username() {
                self.sink.set_username(user);
            }
        }
        self.sink.calculator_detected(info.firmware_kind());
        Ok(())
    }

    /// Install `version` (or `"latest"`) on the bound calculator.
    ///
    /// Returns once the scripts are restored, or once the reconnect wait
    /// times out; in that case the restore resumes from [`poll`](Self::poll).
    pub fn install(&mut self, version: &str) -> DfuResult<()> {
        let release = self.resolve_release(version)?;
        match self.run_install(release) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(e)),
        }
    }

    fn run_install(&mut self, release: FirmwareRelease) -> DfuResult<()> {
        let model = self.connection.session_mut()?.model()?;
        log::info!("Installing {} on {}", release.name, model);
        if !release.is_compatible(model) {
            log::warn!("{} is not flagged as compatible with {}", release.name, model);
        }

        self.set_state(InstallState::ReadingStorage);
        let snapshot = self.capture_storage()?;
        log::info!("Saved {} scripts", snapshot.records.len());

        self.pending = Some(InstallSession {
            release: release.clone(),
            model,
            snapshot,
        });

        if self.options.dry_run {
            log::info!("Dry run: skipping firmware download and flash");
        } else {
            match model {
                Model::N0100 => self.flash_single_bank(model, &release)?,
                Model::N0110 => self.flash_dual_bank(model, &release)?,
            }
        }

        self.connection.await_reset();
        self.set_state(InstallState::AwaitingPostFlashReconnect);

        match self
            .connection
            .wait_for_reconnect(self.options.reconnect_timeout)
        {
            Ok(device) => {
                log::info!("{} is back", device);
                self.restore_storage()
            }
            Err(DfuError::ReconnectTimeout { timeout_ms }) => {
                log::warn!(
                    "Calculator not back after {}ms; scripts stay pending",
                    timeout_ms
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn capture_storage(&mut self) -> DfuResult<StorageContainer> {
        let session = self.connection.session_mut()?;
        let info = session.read_platform_info()?;

        match info.storage {
            Some(region) => {
                let dump = session.read_storage(region)?;
                StorageContainer::snapshot(&dump)
            }
            None => {
                log::warn!("No platform info; no scripts to preserve");
                Ok(StorageContainer::default())
            }
        }
    }

    /// Download and check one image.
    ///
    /// A digest mismatch is reported as a warning and the image is still
    /// used, unless strict checksums are enabled.
    fn fetch_image(
        &mut self,
        model: Model,
        release: &FirmwareRelease,
        filename: &str,
    ) -> DfuResult<Vec<u8>> {
        let artifact = self.verifier.verify(model.name(), &release.name, filename)?;

        if let Some(mismatch) = artifact.mismatch() {
            if self.options.strict_checksums {
                return Err(mismatch);
            }
            self.sink.calculator_error(false, Some(mismatch.detail()));
        }

        Ok(artifact.blob)
    }

    fn write(&mut self, address: u32, data: &[u8], manifest: bool) -> DfuResult<()> {
        let sink = &self.sink;
        let session = self.connection.session_mut()?;
        session.download(address, data, manifest, &mut |done, total| {
            let percent = if total == 0 {
                100.0
            } else {
                done as f32 / total as f32 * 100.0
            };
            sink.set_progress_percentage(percent);
        })
    }

    fn flash_single_bank(&mut self, model: Model, release: &FirmwareRelease) -> DfuResult<()> {
        let internal = self.fetch_image(model, release, INTERNAL_FIRMWARE)?;

        self.set_state(InstallState::Flashing {
            stage: FlashStage::Internal,
        });
        self.connection.expect_disconnect();
        self.write(INTERNAL_FLASH_BASE, &internal, true)
    }

    fn flash_dual_bank(&mut self, model: Model, release: &FirmwareRelease) -> DfuResult<()> {
        let external = self.fetch_image(model, release, EXTERNAL_FIRMWARE)?;
        let internal = self.fetch_image(model, release, INTERNAL_FIRMWARE)?;

        self.set_state(InstallState::Flashing {
            stage: FlashStage::External,
        });
        self.write(EXTERNAL_FLASH_BASE, &external, false)?;

        self.set_state(InstallState::Flashing {
            stage: FlashStage::Internal,
        });
        self.connection.expect_disconnect();
        self.write(INTERNAL_FLASH_BASE, &internal, true)
    }

    /// Write the pending scripts into the storage region the new firmware
    /// reports.
    fn restore_storage(&mut self) -> DfuResult<()> {
        let Some(pending) = self.pending.take() else {
            return Err(DfuError::InvalidState {
                operation: "restore storage".to_string(),
                state: self.state.message(),
            });
        };

        self.set_state(InstallState::RestoringStorage);
        let info = self.connection.session_mut()?.read_platform_info()?;
        let region = match info.storage {
            Some(region) => region,
            None if pending.snapshot.records.is_empty() => {
                log::warn!("No platform info after flashing; nothing to restore");
                return self.finish(&pending);
            }
            None => return Err(DfuError::MissingPlatformInfo),
        };

        let blob = pending.snapshot.encode(region.size as usize)?;
        log::info!(
            "Restoring {} scripts ({} bytes) at 0x{:08X}",
            pending.snapshot.records.len(),
            blob.len(),
            region.address
        );
        self.write(region.address, &blob, false)?;

        self.finish(&pending)
    }

    fn finish(&mut self, pending: &InstallSession) -> DfuResult<()> {
        log::info!("Installed {} on {}", pending.release.name, pending.model);
        self.set_state(InstallState::Done);
        self.sink.installation_finished();
        Ok(())
    }

    /// Consume one autoconnect match, waiting up to `timeout`.
    ///
    /// A match resumes a pending restore; otherwise the calculator info is
    /// reported again. Returns whether a device was bound.
    pub fn poll(&mut self, timeout: Duration) -> DfuResult<bool> {
        let matched = match self.connection.poll_match(timeout) {
            Ok(matched) => matched,
            Err(e) => return Err(self.fail(e)),
        };
        let Some(device) = matched else {
            return Ok(false);
        };

        let result = if self.pending.is_some() {
            log::info!("{} reconnected; resuming restore", device);
            self.connection.clear_expected_disconnect();
            self.restore_storage()
        } else {
            self.sink.calculator_error(false, None);
            self.report_calculator_info()
        };

        match result {
            Ok(()) => Ok(true),
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Forward a host disconnect event.
    pub fn on_disconnect(&mut self, device: &DeviceInfo) -> DfuResult<()> {
        match self.connection.on_disconnect(device) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(e)),
        }
    }
}
