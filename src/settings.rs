//! Installer settings with persistence.
//!
//! This module provides:
//! - `InstallerSettings` struct with the knobs of the installer
//! - Persistence to a JSON file in the app data directory
//!
//! ## Extensibility
//!
//! To add a new setting:
//! 1. Add the field to `InstallerSettings` with a `#[serde(default)]`
//! 2. Give it a value in the `Default` impl
//! 3. Read it where the installer is built (`InstallerOptions::from`)

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::dfu::config::{AUTOCONNECT_DELAY, CALCULATOR_PID, CALCULATOR_VID, REBOOT_TIMEOUT_MS};
use crate::dfu::{DeviceFilter, DfuResult};

fn default_vendor_id() -> u16 {
    CALCULATOR_VID
}

fn default_product_id() -> u16 {
    CALCULATOR_PID
}

fn default_autoconnect_interval_ms() -> u64 {
    AUTOCONNECT_DELAY.as_millis() as u64
}

fn default_reconnect_timeout_ms() -> u64 {
    REBOOT_TIMEOUT_MS
}

fn default_true() -> bool {
    true
}

/// Installer settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InstallerSettings {
    /// Skip every download and flash step. Storage is still read and
    /// restored, which exercises the reconnect path without touching the
    /// firmware.
    #[serde(default)]
    pub dry_run: bool,

    /// Abort before any write when a checksum does not match.
    /// When false, a mismatch is reported as a warning and the flash goes on.
    #[serde(default)]
    pub strict_checksums: bool,

    /// Vendor ID the autoconnect loop looks for (0 = any).
    #[serde(default = "default_vendor_id")]
    pub vendor_id: u16,

    /// Product ID the autoconnect loop looks for (0 = any).
    #[serde(default = "default_product_id")]
    pub product_id: u16,

    /// Pin autoconnect to one calculator.
    #[serde(default)]
    pub serial_number: Option<String>,

    #[serde(default = "default_autoconnect_interval_ms")]
    pub autoconnect_interval_ms: u64,

    /// Time allowed for the calculator to come back after flashing.
    #[serde(default = "default_reconnect_timeout_ms")]
    pub reconnect_timeout_ms: u64,

    /// Keep downloaded artifacts in the on-disk cache.
    #[serde(default = "default_true")]
    pub cache_enabled: bool,
}

impl Default for InstallerSettings {
    fn default() -> Self {
        Self {
            dry_run: false,
            strict_checksums: false,
            vendor_id: default_vendor_id(),
            product_id: default_product_id(),
            serial_number: None,
            autoconnect_interval_ms: default_autoconnect_interval_ms(),
            reconnect_timeout_ms: default_reconnect_timeout_ms(),
            cache_enabled: true,
        }
    }
}

impl InstallerSettings {
    /// Check if these settings differ from defaults.
    /// Useful for logging to show when non-default settings are applied.
    pub fn has_non_default_settings(&self) -> bool {
        *self != Self::default()
    }

    /// Filter used when autoconnecting.
    pub fn device_filter(&self) -> DeviceFilter {
        let filter = DeviceFilter::new(self.vendor_id, self.product_id);
        match self.serial_number.as_deref() {
            Some(serial) if !serial.is_empty() => filter.with_serial(serial),
            _ => filter,
        }
    }

    pub fn autoconnect_interval(&self) -> Duration {
        Duration::from_millis(self.autoconnect_interval_ms)
    }

    pub fn reconnect_timeout(&self) -> Duration {
        Duration::from_millis(self.reconnect_timeout_ms)
    }
}

/// Settings file name stored in app data directory.
const SETTINGS_FILENAME: &str = "installer_settings.json";

/// Manages persistence of installer settings to JSON file.
pub struct SettingsManager {
    settings_file_path: PathBuf,
}

impl SettingsManager {
    /// Create a new settings manager for the given app data directory.
    pub fn new(app_data_dir: &Path) -> Self {
        let settings_file_path = app_data_dir.join(SETTINGS_FILENAME);
        Self { settings_file_path }
    }

    /// Load settings from disk, returning defaults if file doesn't exist.
    pub fn load(&self) -> DfuResult<InstallerSettings> {
        if !self.settings_file_path.exists() {
            return Ok(InstallerSettings::default());
        }

        let contents = fs::read_to_string(&self.settings_file_path)?;

        // Handle empty file gracefully
        if contents.trim().is_empty() {
            return Ok(InstallerSettings::default());
        }

        let settings: InstallerSettings = serde_json::from_str(&contents)?;
        if settings.has_non_default_settings() {
            log::info!("Loaded non-default installer settings: {:?}", settings);
        }

        Ok(settings)
    }

    /// Save settings to disk.
    pub fn save(&self, settings: &InstallerSettings) -> DfuResult<()> {
        if let Some(parent) = self.settings_file_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(settings)?;
        fs::write(&self.settings_file_path, contents)?;
        log::debug!("Saved settings to {}", self.settings_file_path.display());

        Ok(())
    }

    /// Get the path where settings are stored.
    pub fn settings_path(&self) -> &Path {
        &self.settings_file_path
    }
}
