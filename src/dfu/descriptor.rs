//! DFU functional descriptor and DfuSe memory segments.

use serde::{Deserialize, Serialize};

use super::bytes::read_u16_le;
use super::config::{RAM_END, RAM_SECTOR_SIZE, RAM_START};
use super::error::{DfuError, DfuResult};

/// USB descriptor type of the DFU functional descriptor.
pub const DFU_FUNCTIONAL_DESCRIPTOR_TYPE: u8 = 0x21;

/// Length of the DFU 1.1 functional descriptor.
const FUNCTIONAL_DESCRIPTOR_LENGTH: usize = 9;

const ATTR_CAN_DOWNLOAD: u8 = 0x01;
const ATTR_CAN_UPLOAD: u8 = 0x02;
const ATTR_MANIFESTATION_TOLERANT: u8 = 0x04;
const ATTR_WILL_DETACH: u8 = 0x08;

/// DFU functional descriptor (bDescriptorType 0x21).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionalDescriptor {
    pub attributes: u8,
    pub detach_timeout: u16,
    pub transfer_size: u16,
    pub dfu_version: u16,
}

impl FunctionalDescriptor {
    /// Parse the raw descriptor bytes.
    ///
    /// Layout: bLength, bDescriptorType, bmAttributes, wDetachTimeOut (LE),
    /// wTransferSize (LE), bcdDFUVersion (LE).
    pub fn parse(bytes: &[u8]) -> DfuResult<Self> {
        if bytes.len() < FUNCTIONAL_DESCRIPTOR_LENGTH {
            return Err(DfuError::TruncatedInput {
                offset: 0,
                needed: FUNCTIONAL_DESCRIPTOR_LENGTH,
                available: bytes.len(),
            });
        }
        if bytes[1] != DFU_FUNCTIONAL_DESCRIPTOR_TYPE {
            return Err(DfuError::ConnectionFailed {
                reason: format!("unexpected descriptor type 0x{:02X}", bytes[1]),
            });
        }

        Ok(Self {
            attributes: bytes[2],
            detach_timeout: read_u16_le(bytes, 3)?,
            transfer_size: read_u16_le(bytes, 5)?,
            dfu_version: read_u16_le(bytes, 7)?,
        })
    }

    pub fn can_download(&self) -> bool {
        self.attributes & ATTR_CAN_DOWNLOAD != 0
    }

    pub fn can_upload(&self) -> bool {
        self.attributes & ATTR_CAN_UPLOAD != 0
    }

    pub fn manifestation_tolerant(&self) -> bool {
        self.attributes & ATTR_MANIFESTATION_TOLERANT != 0
    }

    pub fn will_detach(&self) -> bool {
        self.attributes & ATTR_WILL_DETACH != 0
    }
}

/// A region of the DfuSe memory map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySegment {
    pub start: u32,
    /// Exclusive end address.
    pub end: u32,
    pub sector_size: u32,
    pub readable: bool,
    pub erasable: bool,
    pub writable: bool,
}

impl MemorySegment {
    /// The RAM segment the device never advertises.
    pub fn ram() -> Self {
        Self {
            start: RAM_START,
            end: RAM_END,
            sector_size: RAM_SECTOR_SIZE,
            readable: true,
            erasable: false,
            writable: true,
        }
    }

    pub fn contains(&self, address: u32) -> bool {
        (self.start..self.end).contains(&address)
    }
}

/// Put the RAM segment ahead of the reported ones.
pub fn with_ram_segment(mut segments: Vec<MemorySegment>) -> Vec<MemorySegment> {
    segments.insert(0, MemorySegment::ram());
    segments
}
