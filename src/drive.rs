//! Per-drive state: geometry, capacity and the partition table.

use core::fmt;

use crate::MAX_PARTITIONS;

/// Drive position on the channel
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum IdeDrive {
    Master = 0,
    Slave = 1,
}

impl IdeDrive {
    pub const ALL: [IdeDrive; 2] = [IdeDrive::Master, IdeDrive::Slave];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn bit(self) -> u8 {
        self as u8
    }
}

/// Cylinder/head/sector geometry as reported (or reconstructed) at identify.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Geometry {
    pub cylinders: u32,
    pub heads: u16,
    pub sectors_per_track: u16,
}

/// A CHS address. `sector` is 1-based, cylinder and head are 0-based.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Chs {
    pub cylinder: u32,
    pub head: u8,
    pub sector: u8,
}

impl Geometry {
    pub const fn new(cylinders: u32, heads: u16, sectors_per_track: u16) -> Self {
        Self {
            cylinders,
            heads,
            sectors_per_track,
        }
    }

    pub const fn sectors_per_cylinder(&self) -> u32 {
        self.heads as u32 * self.sectors_per_track as u32
    }

    pub const fn total_sectors(&self) -> u64 {
        self.cylinders as u64 * self.heads as u64 * self.sectors_per_track as u64
    }

    /// Translate an absolute sector to CHS.
    ///
    /// Returns `None` when the geometry is degenerate or the result does not
    /// fit the 16-bit cylinder / 4-bit head / 8-bit sector registers.
    pub fn chs_for(&self, sector: u32) -> Option<Chs> {
        let spt = self.sectors_per_track as u32;
        let heads = self.heads as u32;
        if spt == 0 || heads == 0 {
            return None;
        }
        let s = (sector % spt) + 1;
        let track = sector / spt;
        let c = track / heads;
        let h = track % heads;
        if c > 0xFFFF || h > 0x0F || s > 0xFF {
            return None;
        }
        Some(Chs {
            cylinder: c,
            head: h as u8,
            sector: s as u8,
        })
    }

    /// First sector of `cylinder`, or `None` on overflow.
    pub fn sector_from_cyl(&self, cylinder: u32) -> Option<u32> {
        let sectors = self.sectors_per_cylinder() as u64 * cylinder as u64;
        u32::try_from(sectors).ok()
    }
}

/// One entry of a drive's partition table, in absolute 512-byte sectors.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    pub start: u32,
    /// Size in sectors; zero means the slot is absent.
    pub size: u32,
    pub read_only: bool,
    /// On-disk type code, kept for reporting only.
    pub kind: u32,
    pub name: [u8; 16],
}

impl Partition {
    pub const ABSENT: Partition = Partition {
        start: 0,
        size: 0,
        read_only: false,
        kind: 0,
        name: [0; 16],
    };

    pub const fn new(start: u32, size: u32) -> Self {
        Self {
            start,
            size,
            read_only: false,
            kind: 0,
            name: [0; 16],
        }
    }

    pub const fn is_present(&self) -> bool {
        self.size != 0
    }

    /// One past the last sector.
    pub const fn end(&self) -> u64 {
        self.start as u64 + self.size as u64
    }

    pub fn name_str(&self) -> &str {
        let end = self.name.iter().position(|&c| c == 0).unwrap_or(self.name.len());
        core::str::from_utf8(&self.name[..end]).unwrap_or("?")
    }
}

impl fmt::Debug for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Partition")
            .field("start", &self.start)
            .field("size", &self.size)
            .field("read_only", &self.read_only)
            .field("kind", &self.kind)
            .field("name", &self.name_str())
            .finish()
    }
}

/// Everything the driver knows about one unit on the channel.
#[derive(Clone, PartialEq, Eq)]
pub struct Drive {
    pub present: bool,
    pub lba: bool,
    /// Capacity in sectors. 32 bits limits a drive to 2 TiB.
    pub total_sectors: u32,
    pub geometry: Geometry,
    pub capabilities: u16,
    /// Model string, NUL terminated
    pub model: [u8; 41],
    /// Firmware revision, NUL terminated
    pub firmware: [u8; 9],
    pub partitions: [Partition; MAX_PARTITIONS],
}

impl Drive {
    pub const fn absent() -> Self {
        Self {
            present: false,
            lba: false,
            total_sectors: 0,
            geometry: Geometry::new(0, 0, 0),
            capabilities: 0,
            model: [0; 41],
            firmware: [0; 9],
            partitions: [Partition::ABSENT; MAX_PARTITIONS],
        }
    }

    pub fn model_str(&self) -> &str {
        c_str(&self.model)
    }

    pub fn firmware_str(&self) -> &str {
        c_str(&self.firmware)
    }

    pub fn partition(&self, index: usize) -> Option<&Partition> {
        self.partitions.get(index).filter(|p| p.is_present())
    }

    pub fn clear_partitions(&mut self) {
        self.partitions = [Partition::ABSENT; MAX_PARTITIONS];
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.iter().filter(|p| p.is_present()).count()
    }

    pub const fn capacity_mb(&self) -> u32 {
        self.total_sectors / 2048
    }
}

impl Default for Drive {
    fn default() -> Self {
        Self::absent()
    }
}

impl fmt::Debug for Drive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Drive")
            .field("present", &self.present)
            .field("lba", &self.lba)
            .field("total_sectors", &self.total_sectors)
            .field("geometry", &self.geometry)
            .field("model", &self.model_str())
            .field("firmware", &self.firmware_str())
            .field("partitions", &self.partition_count())
            .finish()
    }
}

fn c_str(bytes: &[u8]) -> &str {
    let end = bytes.iter().position(|&c| c == 0).unwrap_or(bytes.len());
    core::str::from_utf8(&bytes[..end]).unwrap_or("?")
}
