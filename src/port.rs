//! Register transports
//!
//! Every controller exposes the same eight task-file registers, but cards
//! wire them up differently:
//!
//! - 16-bit cards map each register on a 32-bit stride; the data register is
//!   accessed as a word with the 16-bit value in the upper half on writes and
//!   the lower half on reads.
//! - 8-bit cards only pass the low byte of the data register; the high byte
//!   goes through a separate latch (written before the data register, read
//!   after it).
//! - PC-style channels sit in x86 I/O port space.
//!
//! A controller is bound to one transport at attach time and never mixes
//! them within a transfer.

use core::ptr;

use crate::regs::REG_DATA;

/// Byte access to the task-file registers plus word access to the data
/// register. Register offsets are in register units (0..=7).
pub trait RegisterPort {
    fn read8(&mut self, reg: u16) -> u8;
    fn write8(&mut self, reg: u16, value: u8);
    fn read16(&mut self) -> u16;
    fn write16(&mut self, value: u16);
}

/// Busy-wait source used between status polls.
pub trait Delay {
    fn delay_us(&mut self, us: u32);
}

/// Delay by spinning a calibrated number of iterations per microsecond.
pub struct SpinDelay {
    spins_per_us: u32,
}

impl SpinDelay {
    pub const fn new(spins_per_us: u32) -> Self {
        Self { spins_per_us }
    }
}

impl Delay for SpinDelay {
    fn delay_us(&mut self, us: u32) {
        for _ in 0..us.saturating_mul(self.spins_per_us) {
            core::hint::spin_loop();
        }
    }
}

/// Memory-mapped registers on a 4-byte stride with a 16-bit data path.
pub struct MmioRegisters {
    base: usize,
}

impl MmioRegisters {
    /// # Safety
    /// `base` must map the controller's register window for the lifetime of
    /// the returned value.
    pub const unsafe fn new(base: usize) -> Self {
        Self { base }
    }

    #[inline]
    fn addr(&self, reg: u16) -> usize {
        self.base + ((reg as usize) << 2)
    }
}

impl RegisterPort for MmioRegisters {
    #[inline]
    fn read8(&mut self, reg: u16) -> u8 {
        unsafe { ptr::read_volatile(self.addr(reg) as *const u8) }
    }

    #[inline]
    fn write8(&mut self, reg: u16, value: u8) {
        unsafe { ptr::write_volatile(self.addr(reg) as *mut u8, value) }
    }

    #[inline]
    fn read16(&mut self) -> u16 {
        let word = unsafe { ptr::read_volatile(self.addr(REG_DATA) as *const u32) };
        (word & 0xffff) as u16
    }

    #[inline]
    fn write16(&mut self, value: u16) {
        unsafe { ptr::write_volatile(self.addr(REG_DATA) as *mut u32, (value as u32) << 16) }
    }
}

/// 8-bit card: data register carries the low byte, a latch the high byte.
///
/// The read and write latches may be the same location.
pub struct LatchedMmioRegisters {
    regs: MmioRegisters,
    latch_read: usize,
    latch_write: usize,
}

impl LatchedMmioRegisters {
    /// # Safety
    /// All three addresses must stay mapped for the lifetime of the value.
    pub const unsafe fn new(base: usize, latch_read: usize, latch_write: usize) -> Self {
        Self {
            regs: MmioRegisters::new(base),
            latch_read,
            latch_write,
        }
    }
}

impl RegisterPort for LatchedMmioRegisters {
    #[inline]
    fn read8(&mut self, reg: u16) -> u8 {
        self.regs.read8(reg)
    }

    #[inline]
    fn write8(&mut self, reg: u16, value: u8) {
        self.regs.write8(reg, value)
    }

    fn read16(&mut self) -> u16 {
        // The latch captures the high byte on the data register access.
        let lo = self.regs.read8(REG_DATA);
        let hi = unsafe { ptr::read_volatile(self.latch_read as *const u8) };
        ((hi as u16) << 8) | lo as u16
    }

    fn write16(&mut self, value: u16) {
        unsafe { ptr::write_volatile(self.latch_write as *mut u8, (value >> 8) as u8) };
        self.regs.write8(REG_DATA, value as u8);
    }
}

/// Legacy PC channel in I/O port space (e.g. 0x1F0 / 0x170).
#[cfg(target_arch = "x86_64")]
pub struct PortIoRegisters {
    base: u16,
}

#[cfg(target_arch = "x86_64")]
impl PortIoRegisters {
    pub const PRIMARY: u16 = 0x1F0;
    pub const SECONDARY: u16 = 0x170;

    /// # Safety
    /// The caller must own the I/O range `base..base + 8`.
    pub const unsafe fn new(base: u16) -> Self {
        Self { base }
    }
}

#[cfg(target_arch = "x86_64")]
impl RegisterPort for PortIoRegisters {
    fn read8(&mut self, reg: u16) -> u8 {
        let mut port = x86_64::instructions::port::Port::<u8>::new(self.base + reg);
        unsafe { port.read() }
    }

    fn write8(&mut self, reg: u16, value: u8) {
        let mut port = x86_64::instructions::port::Port::<u8>::new(self.base + reg);
        unsafe { port.write(value) }
    }

    fn read16(&mut self) -> u16 {
        let mut port = x86_64::instructions::port::Port::<u16>::new(self.base + REG_DATA);
        unsafe { port.read() }
    }

    fn write16(&mut self, value: u16) {
        let mut port = x86_64::instructions::port::Port::<u16>::new(self.base + REG_DATA);
        unsafe { port.write(value) }
    }
}
