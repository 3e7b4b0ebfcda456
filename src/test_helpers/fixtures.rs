use crate::dfu::config::{OMEGA_MAGIC, PLATFORM_INFO_LENGTH, PLATFORM_MAGIC, STORAGE_MAGIC};

/// Builder for synthetic platform info blocks.
pub struct PlatformInfoBuilder {
    block: Vec<u8>,
    shift: usize,
    old: bool,
}

impl PlatformInfoBuilder {
    /// New layout: platform magic at 0x00 only.
    pub fn new_layout() -> Self {
        let mut builder = Self {
            block: vec![0; PLATFORM_INFO_LENGTH],
            shift: 0,
            old: false,
        };
        builder.put_u32_be(0x00, PLATFORM_MAGIC);
        builder
    }

    /// Old layout: platform magic at 0x00 and 0x1C, Omega marker at
    /// `0x1C + shift`.
    ///
    /// A shift of 0 writes no marker, which leaves Omega uninstalled.
    pub fn old_layout(shift: usize) -> Self {
        let mut builder = Self {
            block: vec![0; PLATFORM_INFO_LENGTH],
            shift,
            old: true,
        };
        builder.put_u32_be(0x00, PLATFORM_MAGIC);
        if shift > 0 {
            builder.put_u32_be(0x1C + shift, PLATFORM_MAGIC);
        }
        builder
    }

    fn put_u32_be(&mut self, offset: usize, value: u32) {
        self.block[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
    }

    fn put_u32_le(&mut self, offset: usize, value: u32) {
        self.block[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn put_str(&mut self, offset: usize, max_len: usize, text: &str) {
        let field = &mut self.block[offset..offset + max_len];
        field.fill(0);
        let bytes = text.as_bytes();
        let len = bytes.len().min(max_len);
        field[..len].copy_from_slice(&bytes[..len]);
    }

    pub fn version(mut self, version: &str) -> Self {
        self.put_str(0x04, 8, version);
        self
    }

    pub fn commit(mut self, commit: &str) -> Self {
        let offset = 0x0C + self.shift;
        self.put_str(offset, 8, commit);
        self
    }

    pub fn storage(mut self, address: u32, size: u32) -> Self {
        let offset = self.shift;
        self.put_u32_le(0x14 + offset, address);
        self.put_u32_le(0x18 + offset, size);
        self
    }

    /// Omega branding. The old layout has no username field.
    pub fn omega(mut self, version: &str, user: &str) -> Self {
        if self.old {
            self.put_str(0x0C, 16, version);
        } else {
            self.put_u32_be(0x20, OMEGA_MAGIC);
            self.put_str(0x24, 16, version);
            self.put_str(0x34, 16, user);
            self.put_u32_be(0x44, OMEGA_MAGIC);
        }
        self
    }

    /// Write a raw marker at `0x1C + shift`.
    pub fn marker(mut self, shift: usize, value: u32) -> Self {
        self.put_u32_be(0x1C + shift, value);
        self
    }

    /// Finish the block. On the old layout the era marker at 0x1C is
    /// written last and wins over any relocated field overlapping it.
    pub fn build(mut self) -> Vec<u8> {
        if self.old {
            self.put_u32_be(0x1C, PLATFORM_MAGIC);
        }
        self.block
    }
}

/// Builder for storage container dumps.
pub struct StorageBuilder {
    data: Vec<u8>,
}

impl StorageBuilder {
    pub fn new() -> Self {
        Self {
            data: STORAGE_MAGIC.to_be_bytes().to_vec(),
        }
    }

    /// Append a record named `full_name` (`name.type`).
    pub fn record(mut self, full_name: &str, payload: &[u8]) -> Self {
        let size = 2 + full_name.len() + 1 + payload.len();
        self.data.extend_from_slice(&(size as u16).to_le_bytes());
        self.data.extend_from_slice(full_name.as_bytes());
        self.data.push(0);
        self.data.extend_from_slice(payload);
        self
    }

    /// Append a Python script record.
    pub fn script(self, name: &str, auto_import: bool, code: &str) -> Self {
        let mut payload = vec![auto_import as u8];
        payload.extend_from_slice(code.as_bytes());
        payload.push(0);
        self.record(&format!("{}.py", name), &payload)
    }

    /// Terminate the container.
    pub fn build(mut self) -> Vec<u8> {
        self.data.extend_from_slice(&[0, 0]);
        self.data
    }

    /// Terminate the container and pad it to `size` bytes.
    pub fn build_padded(self, size: usize) -> Vec<u8> {
        let mut data = self.build();
        if data.len() < size {
            data.resize(size, 0);
        }
        data
    }
}

impl Default for StorageBuilder {
    fn default() -> Self {
        Self::new()
    }
}
