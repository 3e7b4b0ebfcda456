//! Configuration constants for the calculator DFU installer.

use std::time::Duration;

// ============================================================================
// USB Device Identifiers
// ============================================================================

/// STMicroelectronics USB Vendor ID.
pub const CALCULATOR_VID: u16 = 0x0483;

/// Product ID exposed by the calculator's DFU interface.
pub const CALCULATOR_PID: u16 = 0xA291;

// ============================================================================
// Connection
// ============================================================================

/// Interval between device scans while autoconnecting.
pub const AUTOCONNECT_DELAY: Duration = Duration::from_millis(1000);

/// Transfer size used until the functional descriptor says otherwise.
pub const DEFAULT_TRANSFER_SIZE: u16 = 2048;

/// Time allowed for the device to come back after a manifestation reset.
pub const REBOOT_TIMEOUT_MS: u64 = 60_000;

/// DFU versions (bcdDFUVersion) that may expose the DfuSe memory map.
pub const DFUSE_VERSIONS: &[u16] = &[0x0100, 0x011A];

/// Interface protocol of a device running the DFU (not runtime) interface.
pub const DFU_MODE_PROTOCOL: u8 = 0x02;

// ============================================================================
// Memory Map
// ============================================================================

/// Start of the RAM segment the transport never reports.
pub const RAM_START: u32 = 0x2000_0000;

/// End (exclusive) of the RAM segment.
pub const RAM_END: u32 = 0x2004_0000;

/// Sector size advertised for the RAM segment.
pub const RAM_SECTOR_SIZE: u32 = 1024;

/// Base address of the internal flash bank.
pub const INTERNAL_FLASH_BASE: u32 = 0x0800_0000;

/// Base address of the external (QSPI) flash bank.
pub const EXTERNAL_FLASH_BASE: u32 = 0x9000_0000;

/// Lower bound (exclusive) of the last segment end for a single-bank model.
pub const SINGLE_BANK_END_MIN: u32 = 0x080E_0000;

/// Upper bound (exclusive) of the last segment end for a single-bank model.
pub const SINGLE_BANK_END_MAX: u32 = 0x9000_0000;

// ============================================================================
// Platform Info
// ============================================================================

/// Address of the platform info block in internal flash.
pub const PLATFORM_INFO_ADDRESS: u32 = 0x0800_01C4;

/// Number of bytes read for the platform info block.
pub const PLATFORM_INFO_LENGTH: usize = 0x48;

/// Magic value opening a valid platform info block.
pub const PLATFORM_MAGIC: u32 = 0xF00D_C0DE;

/// Marker written by the Omega fork.
pub const OMEGA_MAGIC: u32 = 0xDEAD_BEEF;

// ============================================================================
// Storage
// ============================================================================

/// Magic value opening a well-formed storage container.
pub const STORAGE_MAGIC: u32 = 0xBADD_0BEE;

/// Extra bytes read past the reported storage size.
pub const STORAGE_READ_SLACK: usize = 8;

/// Record type of Python scripts, the only records kept across a flash.
pub const SCRIPT_RECORD_TYPE: &str = "py";

// ============================================================================
// Firmware Artifacts
// ============================================================================

/// Image written to the internal bank on every model.
pub const INTERNAL_FIRMWARE: &str = "epsilon.onboarding.internal.bin";

/// Image written to the external bank on dual-bank models.
pub const EXTERNAL_FIRMWARE: &str = "epsilon.onboarding.external.bin";

/// Suffix of the checksum file published next to each artifact.
pub const CHECKSUM_SUFFIX: &str = ".sha256";

/// Root folder of the artifact store.
pub const ARTIFACT_ROOT: &str = "firmwares";

/// Build the artifact store path of a firmware file.
pub fn artifact_path(version: &str, model_dir: &str, filename: &str) -> String {
    format!(
        "{}/{}/{}/{}",
        ARTIFACT_ROOT,
        version,
        model_dir.to_lowercase(),
        filename
    )
}

/// Check whether a descriptor revision and interface protocol call for the
/// extended (DfuSe) transport.
pub fn is_dfuse_candidate(dfu_version: u16, interface_protocol: u8) -> bool {
    DFUSE_VERSIONS.contains(&dfu_version) && interface_protocol == DFU_MODE_PROTOCOL
}
