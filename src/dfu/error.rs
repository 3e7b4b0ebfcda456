//! Error types for the installer, its binary codecs and the DFU seam.

use serde::Serialize;
use thiserror::Error;

/// Result type alias for installer operations.
pub type DfuResult<T> = Result<T, DfuError>;

/// Coarse error classes reported through the orchestrator's error state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    UnsupportedEnvironment,
    FirmwareNotFound,
    ConnectionFailed,
    ChecksumMismatch,
    StorageOverflow,
    TruncatedInput,
    UnexpectedDisconnect,
}

/// Errors that can occur while detecting, flashing or restoring a device.
#[derive(Debug, Error)]
pub enum DfuError {
    /// Standard I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while reading the catalog, settings or cache index.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No WebUSB-like DFU transport is available on this host.
    #[error("No compatible DFU transport is available")]
    UnsupportedEnvironment,

    /// Requested release is absent from the catalog.
    #[error("Firmware '{name}' not found")]
    FirmwareNotFound { name: String },

    /// Opening the device or reading its descriptors failed.
    #[error("Connection failed: {reason}")]
    ConnectionFailed { reason: String },

    /// A transport call failed after the session was established.
    #[error("Transport error during {operation}: {reason}")]
    Transport { operation: String, reason: String },

    /// The artifact store could not resolve or deliver a file.
    #[error("Artifact '{path}' unavailable: {reason}")]
    Artifact { path: String, reason: String },

    /// Downloaded artifact does not match its published digest.
    #[error("Checksum mismatch for {filename}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        filename: String,
        expected: String,
        actual: String,
    },

    /// Re-encoded records do not fit the device storage.
    #[error("Storage overflow at record {index}: {required} bytes needed, {capacity} available")]
    StorageOverflow {
        index: usize,
        required: usize,
        capacity: usize,
    },

    /// A record is too large for its 16-bit length prefix.
    #[error("Record {index} is too large ({size} bytes)")]
    RecordTooLarge { index: usize, size: usize },

    /// A record without a type suffix cannot be framed.
    #[error("Record {index} ('{name}') has no type suffix")]
    UntypedRecord { index: usize, name: String },

    /// A record length prefix is inconsistent with its framing.
    #[error("Malformed storage record at offset {offset} (size {size})")]
    MalformedRecord { offset: usize, size: usize },

    /// A binary parse needed bytes past the end of the input.
    #[error("Truncated input: {needed} bytes needed at offset {offset}, {available} available")]
    TruncatedInput {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// The device returned no valid platform info block.
    #[error("Device reported no platform info")]
    MissingPlatformInfo,

    /// No device matched the filter.
    #[error("No compatible device found")]
    NoDeviceFound,

    /// An operation needed a bound device session.
    #[error("No device session is active")]
    NoActiveSession,

    /// The device did not expose a memory map, so its model is unknown.
    #[error("Device does not expose a memory map")]
    MissingMemoryMap,

    /// The bound device went away while no reset was expected.
    #[error("Device {device} disconnected unexpectedly")]
    UnexpectedDisconnect { device: String },

    /// The device did not come back after a manifestation reset.
    #[error("Device did not reconnect within {timeout_ms}ms")]
    ReconnectTimeout { timeout_ms: u64 },

    /// Operation called in the wrong orchestrator state.
    #[error("Cannot {operation} while {state}")]
    InvalidState { operation: String, state: String },
}

impl DfuError {
    /// Shorthand for transport failures.
    pub fn transport(operation: &str, reason: impl ToString) -> Self {
        DfuError::Transport {
            operation: operation.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error halts the installation.
    ///
    /// Checksum mismatches are surfaced as warnings only.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, DfuError::ChecksumMismatch { .. })
    }

    /// Map this error onto the reported error classes.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DfuError::UnsupportedEnvironment => ErrorKind::UnsupportedEnvironment,
            DfuError::FirmwareNotFound { .. } => ErrorKind::FirmwareNotFound,
            DfuError::ChecksumMismatch { .. } => ErrorKind::ChecksumMismatch,
            DfuError::StorageOverflow { .. }
            | DfuError::RecordTooLarge { .. }
            | DfuError::UntypedRecord { .. } => ErrorKind::StorageOverflow,
            DfuError::TruncatedInput { .. }
            | DfuError::MalformedRecord { .. }
            | DfuError::MissingPlatformInfo => ErrorKind::TruncatedInput,
            DfuError::UnexpectedDisconnect { .. } | DfuError::ReconnectTimeout { .. } => {
                ErrorKind::UnexpectedDisconnect
            }
            DfuError::Io(_)
            | DfuError::Json(_)
            | DfuError::ConnectionFailed { .. }
            | DfuError::Transport { .. }
            | DfuError::Artifact { .. }
            | DfuError::NoDeviceFound
            | DfuError::NoActiveSession
            | DfuError::MissingMemoryMap
            | DfuError::InvalidState { .. } => ErrorKind::ConnectionFailed,
        }
    }

    /// Get a user-friendly error code for support purposes.
    pub fn error_code(&self) -> &'static str {
        match self {
            DfuError::Io(_) => "DFU-002",
            DfuError::Json(_) => "DFU-004",
            DfuError::UnsupportedEnvironment => "DFU-005",
            DfuError::FirmwareNotFound { .. } => "DFU-006",
            DfuError::ConnectionFailed { .. } => "DFU-010",
            DfuError::Transport { .. } => "DFU-011",
            DfuError::Artifact { .. } => "DFU-012",
            DfuError::ChecksumMismatch { .. } => "DFU-020",
            DfuError::StorageOverflow { .. } => "DFU-030",
            DfuError::RecordTooLarge { .. } => "DFU-031",
            DfuError::UntypedRecord { .. } => "DFU-032",
            DfuError::MalformedRecord { .. } => "DFU-033",
            DfuError::TruncatedInput { .. } => "DFU-040",
            DfuError::MissingPlatformInfo => "DFU-041",
            DfuError::NoDeviceFound => "DFU-050",
            DfuError::NoActiveSession => "DFU-051",
            DfuError::MissingMemoryMap => "DFU-052",
            DfuError::UnexpectedDisconnect { .. } => "DFU-053",
            DfuError::ReconnectTimeout { .. } => "DFU-054",
            DfuError::InvalidState { .. } => "DFU-099",
        }
    }

    /// Detail string handed to the status sink.
    pub fn detail(&self) -> String {
        format!("[{}] {}", self.error_code(), self)
    }
}
