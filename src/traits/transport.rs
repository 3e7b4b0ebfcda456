use crate::dfu::{DeviceFilter, DeviceInfo, DfuResult, FunctionalDescriptor, MemorySegment};

/// Abstraction over the host's USB DFU stack.
///
/// Implementations enumerate DFU-class interfaces and hand out device
/// handles. The autoconnect poller calls `list_devices` from its own
/// thread, hence `Send + Sync`.
pub trait DfuBackend: Send + Sync {
    /// Whether the host offers a usable DFU transport at all.
    fn is_supported(&self) -> bool;

    /// Let the user pick a device matching the filter.
    fn request_device(&self, filter: &DeviceFilter) -> DfuResult<DeviceInfo>;

    /// Enumerate the devices currently exposing a DFU interface.
    fn list_devices(&self) -> DfuResult<Vec<DeviceInfo>>;

    /// Create a handle for a device. The handle is not opened yet.
    fn open_device(&self, device: &DeviceInfo) -> DfuResult<Box<dyn DfuDevice>>;
}

/// A DFU interface of one attached device.
///
/// Calls are strictly sequential; the control-transfer transport is not
/// reentrant.
pub trait DfuDevice {
    /// Claim the interface.
    fn open(&mut self) -> DfuResult<()>;

    /// Read the DFU functional descriptor, if the device has one.
    fn functional_descriptor(&mut self) -> DfuResult<Option<FunctionalDescriptor>>;

    /// bInterfaceProtocol of the selected alternate setting.
    fn interface_protocol(&self) -> u8;

    /// Switch to the DfuSe transport and return the memory segments it
    /// reports, or `None` when the device has no memory map.
    fn enable_extended(&mut self) -> DfuResult<Option<Vec<MemorySegment>>>;

    /// Move the address cursor used by `upload` and `download`.
    fn set_start_address(&mut self, address: u32);

    /// Current address cursor.
    fn start_address(&self) -> u32;

    /// Read `length` bytes from the cursor in `transfer_size` chunks.
    fn upload(&mut self, transfer_size: u16, length: usize) -> DfuResult<Vec<u8>>;

    /// Write `data` at the cursor in `transfer_size` chunks.
    ///
    /// When `is_last` is set the device manifests the image afterwards,
    /// which usually resets it. `progress` receives `(done, total)` bytes.
    fn download(
        &mut self,
        transfer_size: u16,
        data: &[u8],
        is_last: bool,
        progress: &mut dyn FnMut(usize, usize),
    ) -> DfuResult<()>;
}
