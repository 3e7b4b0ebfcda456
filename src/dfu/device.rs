//! Device identity, filtering and model classification.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::config::{CALCULATOR_PID, CALCULATOR_VID, SINGLE_BANK_END_MAX, SINGLE_BANK_END_MIN};
use super::descriptor::MemorySegment;
use super::error::{DfuError, DfuResult};

/// Information about an enumerated DFU device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Enumeration handle. A device that resets and re-enumerates comes
    /// back with a new id.
    pub id: u64,
    /// USB Vendor ID.
    pub vendor_id: u16,
    /// USB Product ID.
    pub product_id: u16,
    /// Device serial number (if available).
    pub serial_number: Option<String>,
    /// Product name (if available).
    pub product_name: Option<String>,
}

impl DeviceInfo {
    /// Get a display label for this device.
    pub fn display_label(&self) -> String {
        match (&self.product_name, &self.serial_number) {
            (Some(name), _) => name.clone(),
            (None, Some(serial)) => format!("Calculator ({})", serial),
            (None, None) => format!("Calculator #{}", self.id),
        }
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x}:{:04x} #{}",
            self.vendor_id, self.product_id, self.id
        )
    }
}

/// Criteria used to pick devices during autoconnect.
///
/// A zero id acts as a wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFilter {
    pub vendor_id: u16,
    pub product_id: u16,
    pub serial: Option<String>,
}

impl DeviceFilter {
    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
            serial: None,
        }
    }

    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.serial = Some(serial.into());
        self
    }

    /// Whether a device satisfies the filter.
    ///
    /// A serial number, when given, is the only criterion. Otherwise the
    /// non-zero ids must match; a filter with both ids zero matches nothing.
    pub fn matches(&self, device: &DeviceInfo) -> bool {
        if let Some(serial) = self.serial.as_deref().filter(|s| !s.is_empty()) {
            return device.serial_number.as_deref() == Some(serial);
        }

        let (vid, pid) = (self.vendor_id, self.product_id);
        match (vid > 0, pid > 0) {
            (true, false) => device.vendor_id == vid,
            (false, true) => device.product_id == pid,
            (true, true) => device.vendor_id == vid && device.product_id == pid,
            (false, false) => false,
        }
    }
}

impl Default for DeviceFilter {
    fn default() -> Self {
        Self::new(CALCULATOR_VID, CALCULATOR_PID)
    }
}

/// Return the devices matching a filter, in enumeration order.
pub fn find_matching_devices(devices: &[DeviceInfo], filter: &DeviceFilter) -> Vec<DeviceInfo> {
    devices
        .iter()
        .filter(|device| filter.matches(device))
        .cloned()
        .collect()
}

/// Supported calculator models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Model {
    /// Single-bank model: the whole firmware lives in internal flash.
    N0100,
    /// Dual-bank model: firmware split between external and internal flash.
    N0110,
}

impl Model {
    /// Classify a device from its memory map.
    pub fn from_segments(segments: &[MemorySegment]) -> DfuResult<Self> {
        let last = segments.last().ok_or(DfuError::MissingMemoryMap)?;
        if last.end > SINGLE_BANK_END_MIN && last.end < SINGLE_BANK_END_MAX {
            Ok(Model::N0100)
        } else {
            Ok(Model::N0110)
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Model::N0100 => "N0100",
            Model::N0110 => "N0110",
        }
    }

    /// Folder of this model in the artifact store.
    pub fn artifact_dir(&self) -> String {
        self.name().to_lowercase()
    }

    pub fn is_dual_bank(&self) -> bool {
        matches!(self, Model::N0110)
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
