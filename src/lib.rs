//! Firmware installer for NumWorks calculators running Epsilon or Omega.
//!
//! The crate reads a calculator's platform info and script storage over an
//! abstract USB DFU transport, flashes a firmware release from an artifact
//! store and restores the user's Python scripts afterwards. Presentation is
//! left to a [`traits::StatusSink`] implementation.

pub mod cache;
pub mod dfu;
pub mod firmware;
pub mod settings;
pub mod traits;

#[cfg(test)]
mod test_helpers;

pub use dfu::{DfuError, DfuResult, Installer, InstallerOptions};
pub use settings::{InstallerSettings, SettingsManager};
