//! IDENTIFY DEVICE decoding.

use crate::drive::{Drive, Geometry, IdeDrive};
use crate::error::PioError;
use crate::pio::PioChannel;
use crate::regs;
use crate::SECTOR_SIZE;

// Identify block word offsets
const ID_CYLINDERS: usize = 1;
const ID_HEADS: usize = 3;
const ID_SECTORS_PER_TRACK: usize = 6;
const ID_FIRMWARE: usize = 23; // 4 words
const ID_MODEL: usize = 27; // 20 words
const ID_CAPABILITIES: usize = 49;
const ID_LBA_SECTORS: usize = 60; // 2 words, low word first

const CAP_LBA: u16 = 1 << 9;

/// Translated geometry used when an LBA drive's CHS fields can't be trusted.
const LBA_HEADS: u16 = 16;
const LBA_SECTORS_PER_TRACK: u16 = 63;

#[inline]
fn word(block: &[u8; SECTOR_SIZE], index: usize) -> u16 {
    u16::from_le_bytes([block[index * 2], block[index * 2 + 1]])
}

/// Decode an ATA string: each word holds two characters, high byte first.
///
/// Trailing padding (anything up to and including space) is cut, and the
/// result is always NUL terminated. `dst` must hold `2 * words + 1` bytes.
pub fn copy_string(dst: &mut [u8], block: &[u8; SECTOR_SIZE], first: usize, words: usize) {
    let len = words * 2;
    let mut end = 0;
    for i in 0..words {
        let w = word(block, first + i);
        for (j, c) in [(w >> 8) as u8, w as u8].into_iter().enumerate() {
            let at = i * 2 + j;
            dst[at] = c;
            if c > b' ' {
                end = at + 1;
            }
        }
    }
    for c in &mut dst[end..=len] {
        *c = 0;
    }
}

/// Fill `drive` from a raw identify block. Partition slots are untouched.
pub fn parse(block: &[u8; SECTOR_SIZE], drive: &mut Drive) {
    let cylinders = word(block, ID_CYLINDERS);
    let heads = word(block, ID_HEADS);
    let spt = word(block, ID_SECTORS_PER_TRACK);
    let caps = word(block, ID_CAPABILITIES);
    let lba_sectors =
        word(block, ID_LBA_SECTORS) as u32 | (word(block, ID_LBA_SECTORS + 1) as u32) << 16;

    drive.geometry = Geometry::new(cylinders as u32, heads, spt);
    drive.capabilities = caps;

    if caps & CAP_LBA != 0 {
        drive.lba = true;
        drive.total_sectors = lba_sectors;
        if heads != LBA_HEADS
            || spt != LBA_SECTORS_PER_TRACK
            || drive.geometry.total_sectors() != lba_sectors as u64
        {
            // CHS fields disagree with the LBA count, rebuild them.
            let per_cyl = LBA_HEADS as u32 * LBA_SECTORS_PER_TRACK as u32;
            drive.geometry = Geometry::new(lba_sectors / per_cyl, LBA_HEADS, LBA_SECTORS_PER_TRACK);
        }
    } else {
        drive.lba = false;
        drive.total_sectors = drive.geometry.total_sectors().min(u32::MAX as u64) as u32;
    }

    copy_string(&mut drive.model, block, ID_MODEL, 20);
    copy_string(&mut drive.firmware, block, ID_FIRMWARE, 4);
}

/// Run IDENTIFY on one drive.
///
/// `scratch` receives the raw identify block. On success the returned
/// record is marked present with no partitions.
pub fn identify(
    channel: &mut PioChannel,
    which: IdeDrive,
    scratch: &mut [u8; SECTOR_SIZE],
) -> Result<Drive, PioError> {
    channel.select(which);
    channel.wait_not_busy()?;
    channel.command(regs::CMD_IDENTIFY);
    channel.wait_data_request()?;
    channel.read_data(scratch);

    let mut drive = Drive::absent();
    parse(scratch, &mut drive);
    drive.present = true;
    Ok(drive)
}
