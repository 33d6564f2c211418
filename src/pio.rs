//! Polled PIO handshake and the chunked sector transfer engine.

use alloc::boxed::Box;

use crate::config::IdeConfig;
use crate::drive::{Drive, Geometry, IdeDrive};
use crate::error::{PioError, TransferError, TransferErrorKind};
use crate::port::{Delay, RegisterPort};
use crate::regs::{self, ErrorReg, Status};
use crate::SECTOR_SIZE;

const WORDS_PER_SECTOR: usize = SECTOR_SIZE / 2;

/// Transfer direction relative to the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

impl Direction {
    pub const fn command(self) -> u8 {
        match self {
            Direction::Read => regs::CMD_READ,
            Direction::Write => regs::CMD_WRITE,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Direction::Read => "RD",
            Direction::Write => "WR",
        }
    }
}

/// How a drive wants its sectors addressed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Addressing {
    Lba,
    Chs(Geometry),
}

impl From<&Drive> for Addressing {
    fn from(drive: &Drive) -> Self {
        if drive.lba {
            Addressing::Lba
        } else {
            Addressing::Chs(drive.geometry)
        }
    }
}

/// Wait budget for the two handshakes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timing {
    pub busy_timeout_us: u32,
    pub busy_poll_us: u32,
    pub drq_timeout_us: u32,
    pub drq_poll_us: u32,
    pub settle_reads: u8,
}

impl From<&IdeConfig> for Timing {
    fn from(config: &IdeConfig) -> Self {
        Self {
            busy_timeout_us: config.busy_timeout_us,
            busy_poll_us: config.busy_poll_us.max(1),
            drq_timeout_us: config.drq_timeout_us,
            drq_poll_us: config.drq_poll_us.max(1),
            settle_reads: config.settle_reads,
        }
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self::from(&IdeConfig::new())
    }
}

enum SectorData<'a> {
    Read(&'a mut [u8]),
    Write(&'a [u8]),
}

impl SectorData<'_> {
    fn len(&self) -> usize {
        match self {
            SectorData::Read(buf) => buf.len(),
            SectorData::Write(buf) => buf.len(),
        }
    }

    fn direction(&self) -> Direction {
        match self {
            SectorData::Read(_) => Direction::Read,
            SectorData::Write(_) => Direction::Write,
        }
    }
}

/// One ATA channel: a register transport plus the timing it is driven with.
pub struct PioChannel {
    port: Box<dyn RegisterPort + Send>,
    delay: Box<dyn Delay + Send>,
    timing: Timing,
    max_sectors: u16,
}

impl PioChannel {
    pub fn new(
        port: Box<dyn RegisterPort + Send>,
        delay: Box<dyn Delay + Send>,
        config: &IdeConfig,
    ) -> Self {
        Self {
            port,
            delay,
            timing: Timing::from(config),
            max_sectors: config.max_sectors_per_command.clamp(1, 256),
        }
    }

    // ========================================================================
    // Register access
    // ========================================================================

    pub fn status(&mut self) -> Status {
        Status::from_raw(self.port.read8(regs::REG_STATUS))
    }

    /// Write a pattern to the cylinder registers and read it back.
    ///
    /// A card without a working register window fails this.
    pub fn registers_respond(&mut self) -> bool {
        self.port.write8(regs::REG_CYL_LO, 0xAA);
        self.port.write8(regs::REG_CYL_HI, 0x55);
        self.port.read8(regs::REG_CYL_LO) == 0xAA && self.port.read8(regs::REG_CYL_HI) == 0x55
    }

    fn settle(&mut self) {
        for _ in 0..self.timing.settle_reads {
            let _ = self.port.read8(regs::REG_STATUS);
        }
    }

    // ========================================================================
    // Handshake
    // ========================================================================

    /// Poll until BUSY clears.
    pub fn wait_not_busy(&mut self) -> Result<Status, PioError> {
        self.settle();
        let polls = poll_count(self.timing.busy_timeout_us, self.timing.busy_poll_us);
        let mut status = Status::empty();
        for _ in 0..polls {
            status = self.status();
            if !status.contains(Status::BUSY) {
                return Ok(status);
            }
            self.delay.delay_us(self.timing.busy_poll_us);
        }
        Err(PioError::Timeout { status })
    }

    /// Poll until the drive asks for data.
    ///
    /// ERROR or DRIVE-FAULT after BUSY clears ends the wait with the status
    /// and error registers as the drive left them.
    pub fn wait_data_request(&mut self) -> Result<(), PioError> {
        self.settle();
        let polls = poll_count(self.timing.drq_timeout_us, self.timing.drq_poll_us);
        let mut status = Status::empty();
        for _ in 0..polls {
            status = self.status();
            if !status.contains(Status::BUSY) {
                if status.is_failed() {
                    let error = ErrorReg::from_raw(self.port.read8(regs::REG_ERROR));
                    return Err(PioError::Device { status, error });
                }
                if status.contains(Status::DRQ) {
                    return Ok(());
                }
            }
            self.delay.delay_us(self.timing.drq_poll_us);
        }
        Err(PioError::Timeout { status })
    }

    // ========================================================================
    // Addressing
    // ========================================================================

    /// Select a drive with head 0.
    pub fn select(&mut self, drive: IdeDrive) {
        self.port.write8(regs::REG_SDH, regs::sdh_chs(drive.bit(), 0));
    }

    /// Program sector/cylinder/drive-head registers for `sector`.
    ///
    /// Returns `false` when the sector is beyond 28-bit LBA or the CHS
    /// geometry cannot address it.
    pub fn set_address(&mut self, drive: IdeDrive, mode: Addressing, sector: u32) -> bool {
        match mode {
            Addressing::Lba => {
                if sector > regs::LBA28_MAX {
                    return false;
                }
                self.port.write8(regs::REG_LBA_LO, sector as u8);
                self.port.write8(regs::REG_LBA_MID, (sector >> 8) as u8);
                self.port.write8(regs::REG_LBA_HI, (sector >> 16) as u8);
                self.port.write8(regs::REG_SDH, regs::sdh_lba(drive.bit(), sector));
                true
            }
            Addressing::Chs(geometry) => {
                let Some(chs) = geometry.chs_for(sector) else {
                    return false;
                };
                self.port.write8(regs::REG_SECTOR, chs.sector);
                self.port.write8(regs::REG_CYL_LO, chs.cylinder as u8);
                self.port.write8(regs::REG_CYL_HI, (chs.cylinder >> 8) as u8);
                self.port.write8(regs::REG_SDH, regs::sdh_chs(drive.bit(), chs.head));
                true
            }
        }
    }

    // ========================================================================
    // Data phase
    // ========================================================================

    /// Move one sector from the data register into `dest`.
    pub fn read_data(&mut self, dest: &mut [u8]) {
        for pair in dest.chunks_exact_mut(2).take(WORDS_PER_SECTOR) {
            pair.copy_from_slice(&self.port.read16().to_le_bytes());
        }
    }

    /// Move one sector from `src` to the data register.
    pub fn write_data(&mut self, src: &[u8]) {
        for pair in src.chunks_exact(2).take(WORDS_PER_SECTOR) {
            self.port.write16(u16::from_le_bytes([pair[0], pair[1]]));
        }
    }

    /// Issue a command that has no address phase (e.g. IDENTIFY).
    pub fn command(&mut self, command: u8) {
        self.port.write8(regs::REG_COMMAND, command);
    }

    // ========================================================================
    // Transfer engine
    // ========================================================================

    pub fn read_sectors(
        &mut self,
        drive: IdeDrive,
        mode: Addressing,
        start: u32,
        dest: &mut [u8],
    ) -> Result<(), TransferError> {
        self.transfer(drive, mode, start, SectorData::Read(dest))
    }

    pub fn write_sectors(
        &mut self,
        drive: IdeDrive,
        mode: Addressing,
        start: u32,
        src: &[u8],
    ) -> Result<(), TransferError> {
        self.transfer(drive, mode, start, SectorData::Write(src))
    }

    fn transfer(
        &mut self,
        drive: IdeDrive,
        mode: Addressing,
        start: u32,
        mut data: SectorData<'_>,
    ) -> Result<(), TransferError> {
        if data.len() % SECTOR_SIZE != 0 {
            return Err(TransferError::new(0, TransferErrorKind::Length));
        }
        let total = (data.len() / SECTOR_SIZE) as u32;
        let direction = data.direction();

        self.select(drive);
        self.wait_not_busy().map_err(|e| TransferError::pio(0, e))?;
        self.port.write8(regs::REG_PRECOMP, 0);

        let mut done: u32 = 0;
        while done < total {
            let chunk = (total - done).min(self.max_sectors as u32);
            let sector = start.wrapping_add(done);

            let last = sector as u64 + chunk as u64 - 1;
            if matches!(mode, Addressing::Lba) && last > regs::LBA28_MAX as u64 {
                return Err(TransferError::new(done, TransferErrorKind::Geometry));
            }

            // 256 sectors is encoded as 0.
            self.port.write8(regs::REG_SECCOUNT, chunk as u8);
            if !self.set_address(drive, mode, sector) {
                return Err(TransferError::new(done, TransferErrorKind::Geometry));
            }
            self.port.write8(regs::REG_COMMAND, direction.command());

            for _ in 0..chunk {
                self.wait_data_request()
                    .map_err(|e| TransferError::pio(done, e))?;
                let offset = done as usize * SECTOR_SIZE;
                let range = offset..offset + SECTOR_SIZE;
                match &mut data {
                    SectorData::Read(buf) => self.read_data(&mut buf[range]),
                    SectorData::Write(buf) => self.write_data(&buf[range]),
                }
                done += 1;
            }

            let status = self.wait_not_busy().map_err(|e| TransferError::pio(done, e))?;
            if status.is_failed() {
                let error = ErrorReg::from_raw(self.port.read8(regs::REG_ERROR));
                return Err(TransferError::pio(done, PioError::Device { status, error }));
            }
        }

        crate::ktrace!(
            "ecide: {} drive {} sector {} count {} ok",
            direction.as_str(),
            drive.index(),
            start,
            total
        );
        Ok(())
    }
}

fn poll_count(timeout_us: u32, poll_us: u32) -> u32 {
    (timeout_us / poll_us.max(1)).max(1)
}
