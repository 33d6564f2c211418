//! Partition discovery
//!
//! A drive's usable partitions live in an 8-slot nested table. How that
//! table is reached depends on the controller's partitioning convention:
//!
//! ```text
//! Direct:     sector 6 (filecore boot block) ──▶ nested table @ cylinder N
//!
//! Container:  drive 0, sector 0 (container table, 4 slots)
//!               └─ slot for this drive @ cylinder M
//!                    └─ boot block @ M + 6 ──▶ nested table @ M + cylinder N
//! ```
//!
//! All table positions are stored in drive cylinders and converted to
//! absolute 512-byte sectors here, so the strategy layer only ever adds a
//! partition start to a block number.

pub mod filecore;
pub mod zidefs;

use crate::drive::{Drive, IdeDrive, Partition};
use crate::error::{PartitionError, TransferError};
use crate::{MAX_DRIVES, MAX_PARTITIONS, SECTOR_SIZE};

pub type PartitionTable = [Partition; MAX_PARTITIONS];

/// Partitioning convention of a controller, fixed at attach.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PartitionScheme {
    /// filecore boot block followed by the nested table.
    Direct,
    /// Container table on drive 0 pointing at one direct layout per drive.
    Container,
    /// No known convention; probing is a no-op.
    Unknown,
}

/// Single-sector reads used by the probes.
pub trait SectorReader {
    fn read_sector(
        &mut self,
        drive: IdeDrive,
        sector: u32,
        buf: &mut [u8; SECTOR_SIZE],
    ) -> Result<(), TransferError>;
}

/// What a probe needs to know about the drives on the channel.
pub struct ProbeTarget<'a> {
    pub card: usize,
    pub which: IdeDrive,
    pub drives: &'a [Drive; MAX_DRIVES],
}

impl ProbeTarget<'_> {
    pub fn drive(&self) -> &Drive {
        &self.drives[self.which.index()]
    }
}

#[inline]
pub(crate) fn le16(raw: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([raw[at], raw[at + 1]])
}

#[inline]
pub(crate) fn le32(raw: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([raw[at], raw[at + 1], raw[at + 2], raw[at + 3]])
}

/// Find the partition table of `target.which` using `scheme`.
///
/// The result is already clipped to the drive's capacity.
pub fn probe(
    scheme: PartitionScheme,
    reader: &mut dyn SectorReader,
    target: &ProbeTarget<'_>,
    scratch: &mut [u8; SECTOR_SIZE],
) -> Result<PartitionTable, PartitionError> {
    if !target.drive().present {
        return Err(PartitionError::NoDrive);
    }

    let mut table = match scheme {
        PartitionScheme::Direct => filecore::probe(reader, target, 0, scratch)?,
        PartitionScheme::Container => zidefs::probe(reader, target, scratch)?,
        PartitionScheme::Unknown => return Err(PartitionError::UnknownScheme),
    };

    fit_to_capacity(target.card, target.which, target.drive(), &mut table);
    Ok(table)
}

/// Drop partitions starting beyond the end of the drive and trim those that
/// run past it.
pub(crate) fn fit_to_capacity(
    card: usize,
    which: IdeDrive,
    drive: &Drive,
    table: &mut PartitionTable,
) {
    let capacity = drive.total_sectors as u64;
    for (index, part) in table.iter_mut().enumerate() {
        if !part.is_present() || part.end() <= capacity {
            continue;
        }
        if part.start as u64 >= capacity {
            crate::kwarn!(
                "ecide{}:{} partition {} starts at {} beyond drive end {}, ignored",
                card,
                which.index(),
                index,
                part.start,
                capacity
            );
            *part = Partition::ABSENT;
        } else {
            let size = (capacity - part.start as u64) as u32;
            crate::kwarn!(
                "ecide{}:{} partition {} size {} clipped to {}",
                card,
                which.index(),
                index,
                part.size,
                size
            );
            part.size = size;
        }
    }
}

/// Present partitions of a drive with their slot index.
pub fn present(drive: &Drive) -> impl Iterator<Item = (usize, &Partition)> {
    drive
        .partitions
        .iter()
        .enumerate()
        .filter(|(_, part)| part.is_present())
}

/// Log the partition table of one drive.
pub fn dump(card: usize, which: IdeDrive, drive: &Drive) {
    crate::kinfo!("ecide{}: Partitions on drive {}:", card, which.index());
    for (index, part) in present(drive) {
        crate::kinfo!(
            "{}:  {}-{} (size {}) {}",
            index,
            part.start,
            part.end(),
            part.size,
            if part.read_only { "R" } else { "" }
        );
    }
}
