//! Container partition table ("IDE2")
//!
//! Kept only on the first present drive of the channel. Each of the four
//! slots names a region on either drive; the top bit of the packed start
//! selects the drive and the rest is the region's first cylinder.

use super::{filecore, le32, PartitionTable, ProbeTarget, SectorReader};
use crate::drive::IdeDrive;
use crate::error::PartitionError;
use crate::SECTOR_SIZE;

pub const CONTAINER_MAGIC: u32 = 0x3245_4449;

pub const CONTAINER_SLOTS: usize = 4;

const SLOT_BASE: usize = 4;
const SLOT_SIZE: usize = 8;
const UNUSED: u32 = 0xFFFF_FFFF;
const DRIVE_BIT: u32 = 1 << 31;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContainerSlot {
    pub packed: u32,
    pub length: u32,
}

impl ContainerSlot {
    pub fn is_used(&self) -> bool {
        self.packed != UNUSED
    }

    pub fn drive(&self) -> IdeDrive {
        if self.packed & DRIVE_BIT != 0 {
            IdeDrive::Slave
        } else {
            IdeDrive::Master
        }
    }

    pub fn cylinder(&self) -> u32 {
        self.packed & !DRIVE_BIT
    }
}

/// Parse the container table. A wrong magic comes back as the value found.
pub fn parse(raw: &[u8; SECTOR_SIZE]) -> Result<[ContainerSlot; CONTAINER_SLOTS], u32> {
    let magic = le32(raw, 0);
    if magic != CONTAINER_MAGIC {
        return Err(magic);
    }

    let mut slots = [ContainerSlot {
        packed: UNUSED,
        length: 0,
    }; CONTAINER_SLOTS];
    for (i, slot) in slots.iter_mut().enumerate() {
        let at = SLOT_BASE + i * SLOT_SIZE;
        slot.packed = le32(raw, at);
        slot.length = le32(raw, at + 4);
    }
    Ok(slots)
}

/// Walk the container slots belonging to `target.which`, returning the
/// first nested table found.
pub fn probe(
    reader: &mut dyn SectorReader,
    target: &ProbeTarget<'_>,
    scratch: &mut [u8; SECTOR_SIZE],
) -> Result<PartitionTable, PartitionError> {
    let card = target.card;
    let unit = target.which.index();

    let holder = if target.drives[IdeDrive::Master.index()].present {
        IdeDrive::Master
    } else {
        IdeDrive::Slave
    };

    reader
        .read_sector(holder, 0, scratch)
        .map_err(|err| {
            crate::kdebug!(
                "ecide{}:{} can't read container table of drive {}",
                card,
                unit,
                holder.index()
            );
            PartitionError::Read { sector: 0, err }
        })?;

    let slots = parse(scratch).map_err(|found| {
        crate::kdebug!("ecide{}:{} bad container magic {:#x}", card, unit, found);
        PartitionError::BadMagic { found }
    })?;
    crate::kdebug!("ecide{}:{} container table found, scanning", card, unit);

    let geometry = target.drive().geometry;
    if geometry.sectors_per_cylinder() == 0 {
        return Err(PartitionError::Geometry);
    }

    for (i, slot) in slots.iter().enumerate() {
        if !slot.is_used() || slot.drive() != target.which {
            continue;
        }
        let cylinder = slot.cylinder();
        crate::kdebug!(
            "ecide{}:{} checking container slot {} (start cyl {})",
            card,
            unit,
            i,
            cylinder
        );
        let Some(offset) = geometry.sector_from_cyl(cylinder) else {
            continue;
        };

        // Only one nested table per drive; stop at the first.
        match filecore::probe(reader, target, offset, scratch) {
            Ok(table) => return Ok(table),
            Err(err) if err.is_hard_reject() => return Err(err),
            Err(err) => {
                crate::kdebug!("ecide{}:{} container slot {}: {}", card, unit, i, err);
            }
        }
    }
    Err(PartitionError::NotFound)
}
