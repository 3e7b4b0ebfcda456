//! In-memory DFU backend used by the connection and installer tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::dfu::config::{CALCULATOR_PID, CALCULATOR_VID, PLATFORM_INFO_ADDRESS};
use crate::dfu::{
    DeviceFilter, DeviceInfo, DfuError, DfuResult, FunctionalDescriptor, MemorySegment,
};
use crate::traits::{DfuBackend, DfuDevice};

/// One `download` call seen by the simulated device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub address: u32,
    pub len: usize,
    pub manifest: bool,
}

struct SimState {
    device: DeviceInfo,
    present: bool,
    hidden_polls: u32,
    supported: bool,
    descriptor: Option<FunctionalDescriptor>,
    interface_protocol: u8,
    segments: Option<Vec<MemorySegment>>,
    fail_open: bool,
    memory: BTreeMap<u32, u8>,
    writes: Vec<WriteRecord>,
    after_reset: Option<Vec<u8>>,
    absent_after_reset: bool,
    resets: u32,
    list_calls: u32,
}

impl SimState {
    fn write(&mut self, address: u32, data: &[u8]) {
        for (i, &byte) in data.iter().enumerate() {
            self.memory.insert(address + i as u32, byte);
        }
    }

    fn read(&self, address: u32, length: usize) -> Vec<u8> {
        (0..length)
            .map(|i| *self.memory.get(&(address + i as u32)).unwrap_or(&0))
            .collect()
    }

    /// Manifestation: the device resets and enumerates again under a new id.
    fn reset(&mut self) {
        self.device.id += 1;
        self.hidden_polls = 1;
        self.resets += 1;
        if let Some(block) = self.after_reset.take() {
            self.write(PLATFORM_INFO_ADDRESS, &block);
        }
        if self.absent_after_reset {
            self.present = false;
        }
    }
}

fn flash_segment(start: u32, end: u32, sector_size: u32) -> MemorySegment {
    MemorySegment {
        start,
        end,
        sector_size,
        readable: true,
        erasable: true,
        writable: true,
    }
}

/// Builder describing a simulated calculator.
pub struct SimulatedDevice {
    state: SimState,
}

impl SimulatedDevice {
    fn with_segments(segments: Vec<MemorySegment>) -> Self {
        Self {
            state: SimState {
                device: DeviceInfo {
                    id: 1,
                    vendor_id: CALCULATOR_VID,
                    product_id: CALCULATOR_PID,
                    serial_number: Some("SIM0001".to_string()),
                    product_name: Some("NumWorks Calculator".to_string()),
                },
                present: true,
                hidden_polls: 0,
                supported: true,
                descriptor: Some(FunctionalDescriptor {
                    attributes: 0x0F,
                    detach_timeout: 255,
                    transfer_size: 2048,
                    dfu_version: 0x011A,
                }),
                interface_protocol: 0x02,
                segments: Some(segments),
                fail_open: false,
                memory: BTreeMap::new(),
                writes: Vec::new(),
                after_reset: None,
                absent_after_reset: false,
                resets: 0,
                list_calls: 0,
            },
        }
    }

    /// Dual-bank model.
    pub fn n0110() -> Self {
        Self::with_segments(vec![
            flash_segment(0x0800_0000, 0x0801_0000, 0x4000),
            flash_segment(0x9000_0000, 0x9080_0000, 0x1000),
        ])
    }

    /// Single-bank model.
    pub fn n0100() -> Self {
        Self::with_segments(vec![flash_segment(0x0800_0000, 0x0810_0000, 0x4000)])
    }

    pub fn serial(mut self, serial: &str) -> Self {
        self.state.device.serial_number = Some(serial.to_string());
        self
    }

    pub fn interface_protocol(mut self, protocol: u8) -> Self {
        self.state.interface_protocol = protocol;
        self
    }

    pub fn without_descriptor(mut self) -> Self {
        self.state.descriptor = None;
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.state.fail_open = true;
        self
    }

    pub fn unsupported(mut self) -> Self {
        self.state.supported = false;
        self
    }

    pub fn absent(mut self) -> Self {
        self.state.present = false;
        self
    }

    pub fn memory(mut self, address: u32, data: &[u8]) -> Self {
        self.state.write(address, data);
        self
    }

    pub fn platform_info(self, block: &[u8]) -> Self {
        self.memory(PLATFORM_INFO_ADDRESS, block)
    }

    /// Platform info block the freshly flashed firmware reports.
    pub fn platform_info_after_reset(mut self, block: &[u8]) -> Self {
        self.state.after_reset = Some(block.to_vec());
        self
    }

    /// Keep the device unplugged once it resets.
    pub fn absent_after_reset(mut self) -> Self {
        self.state.absent_after_reset = true;
        self
    }

    pub fn into_backend(self) -> SimulatedBackend {
        SimulatedBackend {
            state: Arc::new(Mutex::new(self.state)),
        }
    }
}

/// Shared handle on a simulated device; clones observe the same device.
#[derive(Clone)]
pub struct SimulatedBackend {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedBackend {
    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap()
    }

    /// Device as currently enumerated.
    pub fn current_device(&self) -> DeviceInfo {
        self.lock().device.clone()
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.lock().writes.clone()
    }

    pub fn resets(&self) -> u32 {
        self.lock().resets
    }

    pub fn list_calls(&self) -> u32 {
        self.lock().list_calls
    }

    pub fn read_memory(&self, address: u32, length: usize) -> Vec<u8> {
        self.lock().read(address, length)
    }

    pub fn plug(&self) {
        self.lock().present = true;
    }

    pub fn unplug(&self) {
        self.lock().present = false;
    }
}

impl DfuBackend for SimulatedBackend {
    fn is_supported(&self) -> bool {
        self.lock().supported
    }

    fn request_device(&self, filter: &DeviceFilter) -> DfuResult<DeviceInfo> {
        let state = self.lock();
        if state.present && filter.matches(&state.device) {
            Ok(state.device.clone())
        } else {
            Err(DfuError::NoDeviceFound)
        }
    }

    fn list_devices(&self) -> DfuResult<Vec<DeviceInfo>> {
        let mut state = self.lock();
        state.list_calls += 1;
        if !state.present {
            return Ok(Vec::new());
        }
        if state.hidden_polls > 0 {
            state.hidden_polls -= 1;
            return Ok(Vec::new());
        }
        Ok(vec![state.device.clone()])
    }

    fn open_device(&self, device: &DeviceInfo) -> DfuResult<Box<dyn DfuDevice>> {
        Ok(Box::new(SimulatedHandle {
            state: Arc::clone(&self.state),
            id: device.id,
            address: 0,
        }))
    }
}

struct SimulatedHandle {
    state: Arc<Mutex<SimState>>,
    id: u64,
    address: u32,
}

impl SimulatedHandle {
    fn live(&self, operation: &str) -> DfuResult<MutexGuard<'_, SimState>> {
        let state = self.state.lock().unwrap();
        if !state.present || state.device.id != self.id {
            return Err(DfuError::transport(operation, "device is gone"));
        }
        Ok(state)
    }
}

impl DfuDevice for SimulatedHandle {
    fn open(&mut self) -> DfuResult<()> {
        let state = self.live("open")?;
        if state.fail_open {
            return Err(DfuError::transport("open", "access denied"));
        }
        Ok(())
    }

    fn functional_descriptor(&mut self) -> DfuResult<Option<FunctionalDescriptor>> {
        Ok(self.live("descriptor")?.descriptor)
    }

    fn interface_protocol(&self) -> u8 {
        self.state.lock().unwrap().interface_protocol
    }

    fn enable_extended(&mut self) -> DfuResult<Option<Vec<MemorySegment>>> {
        Ok(self.live("enable_extended")?.segments.clone())
    }

    fn set_start_address(&mut self, address: u32) {
        self.address = address;
    }

    fn start_address(&self) -> u32 {
        self.address
    }

    fn upload(&mut self, _transfer_size: u16, length: usize) -> DfuResult<Vec<u8>> {
        let address = self.address;
        Ok(self.live("upload")?.read(address, length))
    }

    fn download(
        &mut self,
        transfer_size: u16,
        data: &[u8],
        is_last: bool,
        progress: &mut dyn FnMut(usize, usize),
    ) -> DfuResult<()> {
        let address = self.address;
        let mut state = self.live("download")?;

        let chunk = usize::from(transfer_size.max(1));
        let mut done = 0;
        for block in data.chunks(chunk) {
            done += block.len();
            progress(done, data.len());
        }

        state.write(address, data);
        state.writes.push(WriteRecord {
            address,
            len: data.len(),
            manifest: is_last,
        });
        if is_last {
            state.reset();
        }
        Ok(())
    }
}
