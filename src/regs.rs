//! ATA task-file register map, status bits and commands.

use bitflags::bitflags;

// Register offsets (in register units from the controller base)
pub const REG_DATA: u16 = 0; // Data register (R/W, 16 bits)
pub const REG_ERROR: u16 = 1; // Error register (R)
pub const REG_PRECOMP: u16 = 1; // Write precompensation / features (W)
pub const REG_SECCOUNT: u16 = 2; // Sector count (R/W)
pub const REG_SECTOR: u16 = 3; // Sector number / LBA [7:0] (R/W)
pub const REG_CYL_LO: u16 = 4; // Cylinder low / LBA [15:8] (R/W)
pub const REG_CYL_HI: u16 = 5; // Cylinder high / LBA [23:16] (R/W)
pub const REG_SDH: u16 = 6; // Size/drive/head (R/W)
pub const REG_COMMAND: u16 = 7; // Command register (W)
pub const REG_STATUS: u16 = 7; // Status register (R)

pub const REG_LBA_LO: u16 = REG_SECTOR;
pub const REG_LBA_MID: u16 = REG_CYL_LO;
pub const REG_LBA_HI: u16 = REG_CYL_HI;

/// Highest sector a 28-bit LBA command can address.
pub const LBA28_MAX: u32 = (1 << 28) - 1;

// Commands
pub const CMD_READ: u8 = 0x20; // Read sectors (PIO, with retries)
pub const CMD_WRITE: u8 = 0x30; // Write sectors (PIO, with retries)
pub const CMD_IDENTIFY: u8 = 0xEC; // Identify device

// Size/drive/head register
const SDH_CHS: u8 = 0xA0; // 512-byte sectors, CHS
const SDH_LBA: u8 = 0xE0; // 512-byte sectors, LBA mode bit set
const SDH_DRIVE_SHIFT: u8 = 4;

bitflags! {
    /// Status register bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status: u8 {
        const BUSY = 0x80;        // Controller busy
        const READY = 0x40;       // Selected drive is ready
        const DRIVE_FAULT = 0x20; // Drive fault
        const SEEK_DONE = 0x10;   // Seek complete
        const DRQ = 0x08;         // Data request
        const CORRECTED = 0x04;   // ECC correction made in data
        const INDEX = 0x02;       // Index pulse
        const ERROR = 0x01;       // Error, see error register
    }
}

bitflags! {
    /// Error register bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ErrorReg: u8 {
        const BAD_BLOCK = 0x80;     // Bad block
        const UNCORRECTABLE = 0x40; // Uncorrectable data
        const MEDIA_CHANGED = 0x20; // Media changed
        const ID_NOT_FOUND = 0x10;  // ID mark not found
        const MEDIA_CHANGE_REQ = 0x08;
        const ABORTED = 0x04;       // Aborted command
        const TRACK0_NOT_FOUND = 0x02;
        const AMARK_NOT_FOUND = 0x01;
    }
}

impl Status {
    pub const fn from_raw(value: u8) -> Self {
        Self::from_bits_retain(value)
    }

    /// ERROR or DRIVE-FAULT set.
    pub fn is_failed(self) -> bool {
        self.intersects(Status::ERROR | Status::DRIVE_FAULT)
    }
}

impl ErrorReg {
    pub const fn from_raw(value: u8) -> Self {
        Self::from_bits_retain(value)
    }
}

/// Drive/head select value for CHS addressing.
pub const fn sdh_chs(drive: u8, head: u8) -> u8 {
    SDH_CHS | ((drive & 1) << SDH_DRIVE_SHIFT) | (head & 0x0F)
}

/// Drive select value for LBA addressing, carrying LBA bits [27:24].
pub const fn sdh_lba(drive: u8, sector: u32) -> u8 {
    SDH_LBA | ((drive & 1) << SDH_DRIVE_SHIFT) | ((sector >> 24) as u8 & 0x0F)
}
