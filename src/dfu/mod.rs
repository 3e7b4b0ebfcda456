//! USB DFU firmware installation for NumWorks calculators.
//!
//! This module drives a complete install on top of an abstract DFU
//! transport ([`crate::traits::DfuBackend`]):
//!
//! # Install Overview
//!
//! 1. **Detection** - Bind a device, read its memory map and platform info
//! 2. **Storage Backup** - Dump the scripts stored in RAM
//! 3. **Fetch & Verify** - Download the images and check their SHA-256
//! 4. **Flashing** - External bank first on dual-bank models, internal last
//! 5. **Reconnect** - Wait for the calculator to re-enumerate after reset
//! 6. **Storage Restore** - Write the scripts back into the new storage area
//!
//! # Example
//!
//! ```ignore
//! use omega_installer::dfu::{Installer, InstallerOptions};
//! use omega_installer::traits::LogSink;
//!
//! let mut installer = Installer::new(backend, store, LogSink, InstallerOptions::default())?;
//! installer.detect()?;
//! installer.install("latest")?;
//! ```

mod autoconnect;
mod bytes;
pub mod config;
mod connection;
mod descriptor;
mod device;
mod error;
mod installer;
mod platform_info;
mod session;
pub mod storage;
mod verifier;

// Connection handling
pub use autoconnect::AutoConnect;
pub use connection::{ConnectionManager, ConnectionState};
pub use session::DeviceSession;

// Device discovery
pub use descriptor::{with_ram_segment, FunctionalDescriptor, MemorySegment};
pub use device::{find_matching_devices, DeviceFilter, DeviceInfo, Model};

// Errors
pub use error::{DfuError, DfuResult, ErrorKind};

// Calculator data
pub use platform_info::{parse_platform_info, OmegaInfo, PlatformInfo, StorageRegion};
pub use storage::{
    assemble_storage, decode_record, encode_record, slice_storage, RawRecord, Record,
    ScriptRecord, StorageContainer,
};

// Firmware images
pub use verifier::{parse_checksum, sha256_hex, ArtifactVerifier, VerifiedArtifact};

// Orchestration
pub use installer::{FlashStage, InstallState, Installer, InstallerOptions};
