//! Platform info block decoding.
//!
//! The block lives at a fixed flash address and reports the installed
//! firmware version, its commit, the Omega branding and the location of
//! the script storage. Two historical layouts exist. The old one repeats
//! the platform magic at `0x1C` and relocates the commit and storage fields
//! depending on where its Omega marker sits; the new one has fixed offsets.

use serde::Serialize;

use super::bytes::{read_fixed_string, read_u32_be, read_u32_le};
use super::config::{OMEGA_MAGIC, PLATFORM_MAGIC};
use super::error::DfuResult;

/// Offset of the layout discriminant.
const ERA_OFFSET: usize = 0x1C;

/// Candidate shifts of the old layout's Omega marker, in probe order.
const OLD_MARKER_SHIFTS: [usize; 3] = [8, 16, 32];

/// Omega branding found in the block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OmegaInfo {
    pub installed: bool,
    pub version: String,
    pub user: String,
}

/// Location of the on-device script storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StorageRegion {
    pub address: u32,
    pub size: u32,
}

/// Decoded platform info block.
///
/// When `magik` is false every other field is left at its default and
/// `omega`/`storage` are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlatformInfo {
    pub magik: bool,
    pub old_platform: bool,
    pub version: String,
    pub commit: String,
    pub omega: Option<OmegaInfo>,
    pub storage: Option<StorageRegion>,
}

impl PlatformInfo {
    /// Whether the Omega fork is installed.
    pub fn omega_installed(&self) -> bool {
        self.omega.as_ref().is_some_and(|o| o.installed)
    }

    /// Firmware family reported to the status sink.
    pub fn firmware_kind(&self) -> &'static str {
        if self.omega_installed() {
            "omega"
        } else {
            "epsilon"
        }
    }

    /// Username set by the owner, if any.
    pub fn username(&self) -> Option<&str> {
        self.omega
            .as_ref()
            .filter(|o| o.installed)
            .map(|o| o.user.trim())
            .filter(|user| !user.is_empty())
    }
}

/// Parse a platform info block.
pub fn parse_platform_info(data: &[u8]) -> DfuResult<PlatformInfo> {
    if read_u32_be(data, 0x00)? != PLATFORM_MAGIC {
        return Ok(PlatformInfo::default());
    }

    if read_u32_be(data, ERA_OFFSET)? == PLATFORM_MAGIC {
        parse_old_layout(data)
    } else {
        parse_new_layout(data)
    }
}

fn parse_old_layout(data: &[u8]) -> DfuResult<PlatformInfo> {
    let mut markers = [0u32; 3];
    for (marker, shift) in markers.iter_mut().zip(OLD_MARKER_SHIFTS) {
        *marker = read_u32_be(data, ERA_OFFSET + shift)?;
    }

    let installed = markers
        .iter()
        .any(|&m| m == PLATFORM_MAGIC || m == OMEGA_MAGIC);

    // The first marker holding the platform magic moves the trailing fields.
    let offset = markers
        .iter()
        .zip(OLD_MARKER_SHIFTS)
        .find(|(&m, _)| m == PLATFORM_MAGIC)
        .map(|(_, shift)| shift)
        .unwrap_or(0);

    let omega = if installed {
        OmegaInfo {
            installed,
            version: read_fixed_string(data, 0x0C, 16)?,
            user: String::new(),
        }
    } else {
        OmegaInfo::default()
    };

    Ok(PlatformInfo {
        magik: true,
        old_platform: true,
        version: read_fixed_string(data, 0x04, 8)?,
        commit: read_fixed_string(data, 0x0C + offset, 8)?,
        omega: Some(omega),
        storage: Some(StorageRegion {
            address: read_u32_le(data, 0x14 + offset)?,
            size: read_u32_le(data, 0x18 + offset)?,
        }),
    })
}

fn parse_new_layout(data: &[u8]) -> DfuResult<PlatformInfo> {
    let head = read_u32_be(data, 0x20)?;
    let tail = read_u32_be(data, 0x44)?;
    let installed = head == OMEGA_MAGIC && tail == OMEGA_MAGIC;

    let omega = if installed {
        OmegaInfo {
            installed,
            version: read_fixed_string(data, 0x24, 16)?,
            user: read_fixed_string(data, 0x34, 16)?,
        }
    } else {
        OmegaInfo::default()
    };

    Ok(PlatformInfo {
        magik: true,
        old_platform: false,
        version: read_fixed_string(data, 0x04, 8)?,
        commit: read_fixed_string(data, 0x0C, 8)?,
        omega: Some(omega),
        storage: Some(StorageRegion {
            address: read_u32_le(data, 0x14)?,
            size: read_u32_le(data, 0x18)?,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dfu::error::DfuError;
    use crate::test_helpers::fixtures::PlatformInfoBuilder;

    #[test]
    fn test_bad_magic_yields_empty_info() {
        let info = parse_platform_info(&[0u8; 0x48]).unwrap();
        assert!(!info.magik);
        assert!(info.omega.is_none());
        assert!(info.storage.is_none());
        assert_eq!(info.firmware_kind(), "epsilon");
    }

    #[test]
    fn test_short_input_is_truncated() {
        assert!(matches!(
            parse_platform_info(&[0xF0, 0x0D]),
            Err(DfuError::TruncatedInput { .. })
        ));

        let mut block = PlatformInfoBuilder::new_layout().build();
        block.truncate(0x40);
        assert!(matches!(
            parse_platform_info(&block),
            Err(DfuError::TruncatedInput { offset: 0x44, .. })
        ));
    }

    #[test]
    fn test_new_layout_without_omega() {
        let block = PlatformInfoBuilder::new_layout()
            .version("13.0.0")
            .commit("dcaa1cb")
            .storage(0x2000_0D5C, 0x8000)
            .build();

        let info = parse_platform_info(&block).unwrap();
        assert!(info.magik);
        assert!(!info.old_platform);
        assert_eq!(info.version, "13.0.0");
        assert_eq!(info.commit, "dcaa1cb");
        assert!(!info.omega_installed());
        assert_eq!(
            info.storage,
            Some(StorageRegion {
                address: 0x2000_0D5C,
                size: 0x8000
            })
        );
    }

    #[test]
    fn test_new_layout_with_omega_and_user() {
        let block = PlatformInfoBuilder::new_layout()
            .version("13.0.0")
            .omega("1.19.0-0", "  Alice  ")
            .build();

        let info = parse_platform_info(&block).unwrap();
        let omega = info.omega.clone().unwrap();
        assert!(omega.installed);
        assert_eq!(omega.version, "1.19.0-0");
        assert_eq!(omega.user, "  Alice  ");
        assert_eq!(info.username(), Some("Alice"));
        assert_eq!(info.firmware_kind(), "omega");
    }

    #[test]
    fn test_new_layout_needs_both_markers() {
        let mut block = PlatformInfoBuilder::new_layout().omega("1.19.0", "bob").build();
        block[0x44..0x48].copy_from_slice(&[0, 0, 0, 0]);

        let info = parse_platform_info(&block).unwrap();
        assert!(!info.omega_installed());
        assert_eq!(info.username(), None);
    }

    fn put_u32_be(block: &mut [u8], offset: usize, value: u32) {
        block[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
    }

    #[test]
    fn test_magic_at_era_offset_selects_old_layout() {
        let mut block = vec![0u8; 0x48];
        put_u32_be(&mut block, 0x00, PLATFORM_MAGIC);
        put_u32_be(&mut block, 0x1C, PLATFORM_MAGIC);
        put_u32_be(&mut block, 0x1C + 8, PLATFORM_MAGIC);
        block[0x14..0x1B].copy_from_slice(b"abc1234");

        let info = parse_platform_info(&block).unwrap();
        assert!(info.magik);
        assert!(info.old_platform);
        assert!(info.omega_installed());
        assert_eq!(info.commit, "abc1234");
    }

    #[test]
    fn test_old_layout_marker_relocates_fields() {
        // The era marker at 0x1C overlaps the relocated storage address
        // for shift 8 and the relocated commit for shift 16.
        let era_as_le = u32::from_le_bytes(PLATFORM_MAGIC.to_be_bytes());
        let cases = [
            (8, Some("abc1234"), era_as_le),
            (16, None, 0x2000_1000),
            (32, Some("abc1234"), 0x2000_1000),
        ];

        for (shift, commit, address) in cases {
            let block = PlatformInfoBuilder::old_layout(shift)
                .version("12.4.0")
                .commit("abc1234")
                .storage(0x2000_1000, 0x4000)
                .build();

            let info = parse_platform_info(&block).unwrap();
            assert!(info.old_platform, "shift {}", shift);
            assert!(info.omega_installed(), "shift {}", shift);
            assert_eq!(info.version, "12.4.0");
            if let Some(commit) = commit {
                assert_eq!(info.commit, commit, "shift {}", shift);
            }
            assert_eq!(info.omega.as_ref().unwrap().user, "");
            assert_eq!(
                info.storage,
                Some(StorageRegion {
                    address,
                    size: 0x4000
                }),
                "shift {}",
                shift
            );
        }
    }

    #[test]
    fn test_new_layout_ignores_old_markers() {
        // Without the era marker a relocated marker means nothing
        let block = PlatformInfoBuilder::new_layout()
            .commit("abc1234")
            .marker(8, PLATFORM_MAGIC)
            .build();

        let info = parse_platform_info(&block).unwrap();
        assert!(!info.old_platform);
        assert!(!info.omega_installed());
        assert_eq!(info.commit, "abc1234");
    }

    #[test]
    fn test_old_layout_deadbeef_marker_keeps_base_offset() {
        let block = PlatformInfoBuilder::old_layout(0)
            .version("12.4.0")
            .commit("fedcba9")
            .storage(0x2000_2000, 0x2000)
            .marker(16, OMEGA_MAGIC)
            .build();

        let info = parse_platform_info(&block).unwrap();
        assert!(info.omega_installed());
        assert_eq!(info.commit, "fedcba9");
        assert_eq!(info.storage.unwrap().size, 0x2000);
    }

    #[test]
    fn test_old_layout_without_omega() {
        let block = PlatformInfoBuilder::old_layout(0)
            .version("11.2.0")
            .commit("0123456")
            .build();

        let info = parse_platform_info(&block).unwrap();
        assert!(info.old_platform);
        assert!(!info.omega_installed());
        assert_eq!(info.commit, "0123456");
    }
}
