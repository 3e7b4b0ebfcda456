//! Static firmware release catalog.

mod catalog;

pub use catalog::{FirmwareCatalog, FirmwareRelease, LATEST};
