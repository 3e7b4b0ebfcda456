//! A device bound for one connection.

use super::config::{
    is_dfuse_candidate, DEFAULT_TRANSFER_SIZE, PLATFORM_INFO_ADDRESS, PLATFORM_INFO_LENGTH,
    STORAGE_READ_SLACK,
};
use super::descriptor::{with_ram_segment, MemorySegment};
use super::device::{DeviceInfo, Model};
use super::error::{DfuError, DfuResult};
use super::platform_info::{parse_platform_info, PlatformInfo, StorageRegion};
use crate::traits::DfuDevice;

/// An opened DFU interface together with the properties learned while
/// opening it.
///
/// A session is never reused across a reset: reconnecting creates a new one.
pub struct DeviceSession {
    info: DeviceInfo,
    handle: Box<dyn DfuDevice>,
    transfer_size: u16,
    manifestation_tolerant: bool,
    segments: Option<Vec<MemorySegment>>,
    disconnected: bool,
}

impl DeviceSession {
    /// Open a device handle and probe its functional descriptor.
    ///
    /// Devices in DFU mode with a known DfuSe revision are switched to the
    /// extended transport, whose memory map gets the RAM segment prepended.
    pub fn open(info: DeviceInfo, mut handle: Box<dyn DfuDevice>) -> DfuResult<Self> {
        handle.open().map_err(|e| DfuError::ConnectionFailed {
            reason: format!("open {}: {}", info, e),
        })?;

        let descriptor = handle
            .functional_descriptor()
            .map_err(|e| DfuError::ConnectionFailed {
                reason: format!("functional descriptor of {}: {}", info, e),
            })?;

        let mut transfer_size = DEFAULT_TRANSFER_SIZE;
        let mut manifestation_tolerant = false;
        let mut segments = None;

        if let Some(desc) = descriptor {
            transfer_size = desc.transfer_size;
            if desc.can_download() {
                manifestation_tolerant = desc.manifestation_tolerant();
            }

            if is_dfuse_candidate(desc.dfu_version, handle.interface_protocol()) {
                log::debug!(
                    "Switching {} to DfuSe (bcdDFU 0x{:04X})",
                    info,
                    desc.dfu_version
                );
                segments = handle
                    .enable_extended()
                    .map_err(|e| DfuError::ConnectionFailed {
                        reason: format!("DfuSe upgrade of {}: {}", info, e),
                    })?
                    .map(with_ram_segment);
            }
        }

        log::info!(
            "Opened {} (transfer size {}, manifestation tolerant: {}, memory map: {})",
            info,
            transfer_size,
            manifestation_tolerant,
            segments.as_ref().map_or(0, Vec::len)
        );

        Ok(Self {
            info,
            handle,
            transfer_size,
            manifestation_tolerant,
            segments,
            disconnected: false,
        })
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn transfer_size(&self) -> u16 {
        self.transfer_size
    }

    pub fn manifestation_tolerant(&self) -> bool {
        self.manifestation_tolerant
    }

    /// Memory map reported by the extended transport, RAM first.
    pub fn segments(&self) -> Option<&[MemorySegment]> {
        self.segments.as_deref()
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }

    pub fn mark_disconnected(&mut self) {
        self.disconnected = true;
    }

    /// Classify the device from its memory map.
    pub fn model(&self) -> DfuResult<Model> {
        Model::from_segments(self.segments().unwrap_or_default())
    }

    fn ensure_connected(&self, operation: &str) -> DfuResult<()> {
        if self.disconnected {
            return Err(DfuError::transport(operation, "device disconnected"));
        }
        Ok(())
    }

    /// Read `length` bytes starting at `address`.
    pub fn upload(&mut self, address: u32, length: usize) -> DfuResult<Vec<u8>> {
        self.ensure_connected("upload")?;
        self.handle.set_start_address(address);
        log::debug!("Reading {} bytes at 0x{:08X}", length, address);
        self.handle.upload(self.transfer_size, length)
    }

    /// Write `data` starting at `address`.
    ///
    /// `manifest` marks the final write of an image; the device resets
    /// once it has been applied.
    pub fn download(
        &mut self,
        address: u32,
        data: &[u8],
        manifest: bool,
        progress: &mut dyn FnMut(usize, usize),
    ) -> DfuResult<()> {
        self.ensure_connected("download")?;
        self.handle.set_start_address(address);
        log::info!(
            "Writing {} bytes at 0x{:08X} (manifest: {})",
            data.len(),
            address,
            manifest
        );
        self.handle
            .download(self.transfer_size, data, manifest, progress)
    }

    /// Read and decode the platform info block.
    pub fn read_platform_info(&mut self) -> DfuResult<PlatformInfo> {
        let block = self.upload(PLATFORM_INFO_ADDRESS, PLATFORM_INFO_LENGTH)?;
        parse_platform_info(&block)
    }

    /// Dump a storage region, including the trailing slack.
    pub fn read_storage(&mut self, region: StorageRegion) -> DfuResult<Vec<u8>> {
        self.upload(region.address, region.size as usize + STORAGE_READ_SLACK)
    }
}
