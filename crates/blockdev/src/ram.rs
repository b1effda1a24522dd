use crate::{check_aligned, check_bounds, BdError, BlockDevice};

/// In-memory block device for tests and benches.
///
/// Geometry (read/program/erase sizes) is configurable so a single test suite
/// can cover both byte-granular media and page-programmed, sector-erased NOR
/// layouts. The device enforces the program/erase alignment contract strictly
/// so a misaligned access fails in tests rather than on hardware.
///
/// Two fault hooks exist for crash testing:
/// - [`raw_mut`](RamBlockDevice::raw_mut) exposes the backing bytes so tests
///   can flip bits and fabricate corrupt or torn records;
/// - [`cut_power_after`](RamBlockDevice::cut_power_after) arms a power cut:
///   once the budget of programmable bytes is spent, the offending program
///   call applies only a prefix and fails with [`BdError::PowerCut`],
///   modeling a write torn by power loss.
pub struct RamBlockDevice {
    data: Vec<u8>,
    read_size: u32,
    program_size: u32,
    erase_size: u32,
    erased_value: u8,
    /// Remaining programmable bytes before the armed power cut, if any.
    power_budget: Option<u32>,
}

impl RamBlockDevice {
    /// Creates a device of `len` bytes, fully erased (`0xFF`).
    ///
    /// # Panics
    ///
    /// Panics if any size is zero, if `erase_size` is not a multiple of
    /// `program_size`, or if `len` is not a multiple of `erase_size`. These
    /// are test-harness configuration errors, not runtime conditions.
    pub fn new(len: u32, read_size: u32, program_size: u32, erase_size: u32) -> Self {
        assert!(read_size > 0 && program_size > 0 && erase_size > 0);
        assert!(erase_size % program_size == 0);
        assert!(len > 0 && len % erase_size == 0);
        Self {
            data: vec![0xFF; len as usize],
            read_size,
            program_size,
            erase_size,
            erased_value: 0xFF,
            power_budget: None,
        }
    }

    /// Switches the erased byte value (`0x00` or `0xFF`) and re-erases the
    /// whole device.
    pub fn with_erased_value(mut self, value: u8) -> Self {
        assert!(value == 0x00 || value == 0xFF);
        self.erased_value = value;
        self.data.fill(value);
        self
    }

    /// The backing bytes, for test assertions.
    pub fn raw(&self) -> &[u8] {
        &self.data
    }

    /// Mutable access to the backing bytes, for corruption injection.
    pub fn raw_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Arms a power cut after `bytes` more programmed bytes.
    pub fn cut_power_after(&mut self, bytes: u32) {
        self.power_budget = Some(bytes);
    }

    /// Disarms the power cut.
    pub fn restore_power(&mut self) {
        self.power_budget = None;
    }
}

impl BlockDevice for RamBlockDevice {
    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), BdError> {
        check_bounds(addr, buf.len(), self.data.len() as u32)?;
        let start = addr as usize;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
        Ok(())
    }

    fn program(&mut self, addr: u32, data: &[u8]) -> Result<(), BdError> {
        check_aligned(addr, data.len() as u32, self.program_size)?;
        check_bounds(addr, data.len(), self.data.len() as u32)?;

        let mut writable = data.len();
        let mut cut = false;
        if let Some(budget) = self.power_budget {
            if (budget as usize) < data.len() {
                writable = budget as usize;
                cut = true;
            }
            self.power_budget = Some(budget.saturating_sub(data.len() as u32));
        }

        let start = addr as usize;
        self.data[start..start + writable].copy_from_slice(&data[..writable]);
        if cut {
            return Err(BdError::PowerCut);
        }
        Ok(())
    }

    fn erase(&mut self, addr: u32, len: u32) -> Result<(), BdError> {
        check_aligned(addr, len, self.erase_size)?;
        check_bounds(addr, len as usize, self.data.len() as u32)?;
        let start = addr as usize;
        self.data[start..start + len as usize].fill(self.erased_value);
        Ok(())
    }

    fn read_size(&self, _addr: u32) -> u32 {
        self.read_size
    }

    fn program_size(&self, _addr: u32) -> u32 {
        self.program_size
    }

    fn erase_size(&self, _addr: u32) -> u32 {
        self.erase_size
    }
}
