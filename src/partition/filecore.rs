//! filecore boot block and the nested 8-slot partition table.

use super::{le16, le32, PartitionTable, ProbeTarget, SectorReader};
use crate::drive::{Geometry, Partition};
use crate::error::PartitionError;
use crate::{MAX_PARTITIONS, SECTOR_SIZE};

/// Boot block location relative to the start of the layout.
pub const BOOT_SECTOR: u32 = 6;

/// Partition type announcing a nested table after the filecore area.
pub const PARTITION_TYPE_NESTED: u8 = 1;

/// Nested table magic ("part" little-endian).
pub const NESTED_MAGIC: u32 = 0x7061_7274;

const DISC_RECORD: usize = 0x1C0;
const PARTITION_TYPE: usize = 0x1FC;
const PARTITION_CYL_LOW: usize = 0x1FD;
const PARTITION_CYL_HIGH: usize = 0x1FE;
const CHECKSUM: usize = 0x1FF;

const SLOT_BASE: usize = 4;
const SLOT_SIZE: usize = 28;

/// `log2secsize` of discs formatted with 256-byte sectors.
const LOG2_HALF_SECTOR: u8 = 8;

/// filecore boot block checksum.
///
/// An all-zero block yields 0xFFFF so it can never match the stored byte.
pub fn checksum(block: &[u8; SECTOR_SIZE]) -> u32 {
    if block.iter().all(|&b| b == 0) {
        return 0xFFFF;
    }

    let mut sum: u32 = 0;
    for &b in &block[..CHECKSUM] {
        sum += b as u32;
        if sum > 255 {
            sum -= 255;
        }
    }
    sum
}

/// Disc record and partition fields of a filecore boot block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BootBlock {
    pub log2secsize: u8,
    pub secspertrack: u8,
    pub heads: u8,
    pub density: u8,
    pub idlen: u8,
    pub log2bpmb: u8,
    pub skew: u8,
    pub bootoption: u8,
    pub lowsector: u8,
    pub nzones: u8,
    pub zone_spare: u16,
    pub root: u32,
    pub disc_size: u32,
    pub disc_id: u16,
    pub disc_name: [u8; 10],
    pub disc_type: u32,
    pub partition_type: u8,
    pub partition_cyl: u16,
    pub checksum: u8,
}

impl BootBlock {
    pub fn parse(raw: &[u8; SECTOR_SIZE]) -> Self {
        let rec = &raw[DISC_RECORD..];
        let mut disc_name = [0u8; 10];
        disc_name.copy_from_slice(&rec[0x16..0x20]);

        Self {
            log2secsize: rec[0x00],
            secspertrack: rec[0x01],
            heads: rec[0x02],
            density: rec[0x03],
            idlen: rec[0x04],
            log2bpmb: rec[0x05],
            skew: rec[0x06],
            bootoption: rec[0x07],
            lowsector: rec[0x08],
            nzones: rec[0x09],
            zone_spare: le16(rec, 0x0A),
            root: le32(rec, 0x0C),
            disc_size: le32(rec, 0x10),
            disc_id: le16(rec, 0x14),
            disc_name,
            disc_type: le32(rec, 0x20),
            partition_type: raw[PARTITION_TYPE],
            partition_cyl: raw[PARTITION_CYL_LOW] as u16 | (raw[PARTITION_CYL_HIGH] as u16) << 8,
            checksum: raw[CHECKSUM],
        }
    }

    pub fn disc_name_str(&self) -> &str {
        let end = self
            .disc_name
            .iter()
            .position(|&c| c < b' ')
            .unwrap_or(self.disc_name.len());
        core::str::from_utf8(&self.disc_name[..end]).unwrap_or("?")
    }

    /// Cylinder fields count half-cylinders on 256-byte-sector discs.
    pub fn cylinder_units(&self) -> CylinderUnits {
        if self.log2secsize == LOG2_HALF_SECTOR {
            CylinderUnits::Half
        } else {
            CylinderUnits::Whole
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CylinderUnits {
    Whole,
    Half,
}

impl CylinderUnits {
    /// Convert an on-disk cylinder value to drive cylinders.
    pub fn to_cylinders(self, value: u32) -> Result<u32, PartitionError> {
        match self {
            CylinderUnits::Whole => Ok(value),
            CylinderUnits::Half if value % 2 != 0 => Err(PartitionError::OddCylinder { value }),
            CylinderUnits::Half => Ok(value / 2),
        }
    }
}

/// One raw slot of the nested table, in on-disk cylinder units.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NestedSlot {
    pub start: u32,
    pub length: u32,
    pub kind: u32,
    pub name: [u8; 16],
}

impl NestedSlot {
    pub fn is_present(&self) -> bool {
        self.length != 0 && self.kind != 0
    }

    pub fn name_str(&self) -> &str {
        let end = self.name.iter().position(|&c| c == 0).unwrap_or(self.name.len());
        core::str::from_utf8(&self.name[..end]).unwrap_or("?")
    }
}

/// Parse the nested table. A wrong magic comes back as the value found.
pub fn parse_nested(raw: &[u8; SECTOR_SIZE]) -> Result<[NestedSlot; MAX_PARTITIONS], u32> {
    let magic = le32(raw, 0);
    if magic != NESTED_MAGIC {
        return Err(magic);
    }

    let mut slots = [NestedSlot {
        start: 0,
        length: 0,
        kind: 0,
        name: [0; 16],
    }; MAX_PARTITIONS];
    for (i, slot) in slots.iter_mut().enumerate() {
        let at = SLOT_BASE + i * SLOT_SIZE;
        slot.start = le32(raw, at);
        slot.length = le32(raw, at + 4);
        slot.kind = le32(raw, at + 8);
        slot.name.copy_from_slice(&raw[at + 12..at + 28]);
    }
    Ok(slots)
}

fn cyl_to_sectors(geometry: &Geometry, cylinders: u32) -> Result<u32, PartitionError> {
    if geometry.sectors_per_cylinder() == 0 {
        return Err(PartitionError::Geometry);
    }
    geometry
        .sector_from_cyl(cylinders)
        .ok_or(PartitionError::Geometry)
}

/// Read the boot block at `offset + 6` and the nested table it points to.
///
/// `offset` is the absolute sector where this layout starts (0 for a bare
/// drive, the container slot start otherwise).
pub fn probe(
    reader: &mut dyn SectorReader,
    target: &ProbeTarget<'_>,
    offset: u32,
    scratch: &mut [u8; SECTOR_SIZE],
) -> Result<PartitionTable, PartitionError> {
    let card = target.card;
    let unit = target.which.index();
    let geometry = target.drive().geometry;

    let boot_sector = offset.checked_add(BOOT_SECTOR).ok_or(PartitionError::Geometry)?;
    reader
        .read_sector(target.which, boot_sector, scratch)
        .map_err(|err| PartitionError::Read {
            sector: boot_sector,
            err,
        })?;

    let computed = checksum(scratch);
    let boot = BootBlock::parse(scratch);
    if boot.checksum as u32 != computed {
        crate::kdebug!("ecide{}:{} boot block checksum bad", card, unit);
        return Err(PartitionError::BadChecksum {
            stored: boot.checksum,
            computed,
        });
    }

    crate::kdebug!(
        "ecide{}:{}  filecore: ssl2 {}, s/t {}, heads {}, size {}, type {}, name '{}'",
        card,
        unit,
        boot.log2secsize,
        boot.secspertrack,
        boot.heads,
        boot.disc_size,
        boot.disc_type,
        boot.disc_name_str()
    );

    if boot.partition_type != PARTITION_TYPE_NESTED {
        return Err(PartitionError::NoNestedTable {
            partition_type: boot.partition_type,
        });
    }

    let units = boot.cylinder_units();
    let table_cyl = units.to_cylinders(boot.partition_cyl as u32).map_err(|err| {
        crate::kerror!(
            "ecide{}:{} odd half-cylinder {} for partition table, drive skipped",
            card,
            unit,
            boot.partition_cyl
        );
        err
    })?;
    let table_sector = offset
        .checked_add(cyl_to_sectors(&geometry, table_cyl)?)
        .ok_or(PartitionError::Geometry)?;
    crate::kinfo!(
        "ecide{}:{} Found partition table at cyl {} (abs sector {})",
        card,
        unit,
        table_cyl,
        table_sector
    );

    reader
        .read_sector(target.which, table_sector, scratch)
        .map_err(|err| PartitionError::Read {
            sector: table_sector,
            err,
        })?;
    let slots = parse_nested(scratch).map_err(|found| {
        crate::kwarn!(
            "ecide{}:{} partition table magic {:08x} not understood",
            card,
            unit,
            found
        );
        PartitionError::BadMagic { found }
    })?;

    let mut table = [Partition::ABSENT; MAX_PARTITIONS];
    for (i, slot) in slots.iter().enumerate() {
        if !slot.is_present() {
            continue;
        }
        crate::kinfo!(
            " {}: '{}' {} +{} type {}",
            i,
            slot.name_str(),
            slot.start,
            slot.length,
            slot.kind
        );

        let start = units.to_cylinders(slot.start);
        let length = units.to_cylinders(slot.length);
        let (start, length) = match (start, length) {
            (Ok(start), Ok(length)) => (start, length),
            (Err(err), _) | (_, Err(err)) => {
                crate::kerror!(
                    "ecide{}:{} partition {} has odd half-cylinder bounds, drive skipped",
                    card,
                    unit,
                    i
                );
                return Err(err);
            }
        };

        table[i] = Partition {
            start: offset
                .checked_add(cyl_to_sectors(&geometry, start)?)
                .ok_or(PartitionError::Geometry)?,
            size: cyl_to_sectors(&geometry, length)?,
            read_only: false,
            kind: slot.kind,
            name: slot.name,
        };
    }
    Ok(table)
}
