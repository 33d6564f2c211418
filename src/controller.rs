//! One IDE card: its channel, drives and request queue.

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::vec::Vec;

use crate::config::{DispatchMode, IdeConfig};
use crate::drive::{Drive, IdeDrive, Partition};
use crate::error::{IdeError, PartitionError, TransferError};
use crate::identify;
use crate::partition::{self, PartitionScheme, PartitionTable, ProbeTarget, SectorReader};
use crate::pio::{Addressing, Direction, PioChannel};
use crate::request::{Completion, Request, RequestId};
use crate::{MAX_DRIVES, SECTOR_SIZE};

/// Card families, each with its own partitioning convention.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostType {
    /// ICS-style card: container table on drive 0.
    Zidefs,
    /// Castle-style card: a bare filecore disc per drive.
    Castle,
    /// HCCS card: no known convention.
    Hccs,
}

impl HostType {
    pub const fn scheme(self) -> PartitionScheme {
        match self {
            HostType::Zidefs => PartitionScheme::Container,
            HostType::Castle => PartitionScheme::Direct,
            HostType::Hccs => PartitionScheme::Unknown,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            HostType::Zidefs => "zidefs",
            HostType::Castle => "castle",
            HostType::Hccs => "hccs",
        }
    }
}

/// Sector reads for the partition probes, addressed per drive.
struct DriveReader<'a> {
    channel: &'a mut PioChannel,
    modes: [Addressing; MAX_DRIVES],
}

impl SectorReader for DriveReader<'_> {
    fn read_sector(
        &mut self,
        drive: IdeDrive,
        sector: u32,
        buf: &mut [u8; SECTOR_SIZE],
    ) -> Result<(), TransferError> {
        self.channel
            .read_sectors(drive, self.modes[drive.index()], sector, buf)
    }
}

/// Where a validated request lands on the drive.
struct Placement {
    drive: IdeDrive,
    mode: Addressing,
    sector: u32,
}

enum Verdict {
    Dispatch,
    /// Complete right away with nothing moved.
    Finish(Option<IdeError>),
}

pub struct Controller {
    card: usize,
    slot: u32,
    host: HostType,
    scheme: PartitionScheme,
    config: IdeConfig,
    channel: PioChannel,
    drives: [Drive; MAX_DRIVES],
    /// Identify block, reused for partition table reads.
    scratch: Box<[u8; SECTOR_SIZE]>,
    queue: VecDeque<(RequestId, Request)>,
    completions: VecDeque<Completion>,
    retries: u32,
    next_id: u64,
}

impl Controller {
    pub fn new(
        card: usize,
        slot: u32,
        host: HostType,
        channel: PioChannel,
        config: IdeConfig,
    ) -> Self {
        Self {
            card,
            slot,
            host,
            scheme: host.scheme(),
            config,
            channel,
            drives: [Drive::absent(), Drive::absent()],
            scratch: Box::new([0; SECTOR_SIZE]),
            queue: VecDeque::new(),
            completions: VecDeque::new(),
            retries: 0,
            next_id: 1,
        }
    }

    pub fn card(&self) -> usize {
        self.card
    }

    pub fn slot(&self) -> u32 {
        self.slot
    }

    pub fn host_type(&self) -> HostType {
        self.host
    }

    pub fn scheme(&self) -> PartitionScheme {
        self.scheme
    }

    pub fn config(&self) -> &IdeConfig {
        &self.config
    }

    pub fn drive(&self, which: IdeDrive) -> &Drive {
        &self.drives[which.index()]
    }

    pub fn drives(&self) -> &[Drive; MAX_DRIVES] {
        &self.drives
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    // ========================================================================
    // Discovery
    // ========================================================================

    /// Check the register window and IDENTIFY both drives.
    ///
    /// Both drive records are invalidated first, so a card that stops
    /// responding is left with no drives. Returns how many drives answered.
    pub fn discover(&mut self) -> Result<usize, IdeError> {
        self.drives = [Drive::absent(), Drive::absent()];
        if !self.channel.registers_respond() {
            crate::kerror!("ecide{}: can't access registers", self.card);
            return Err(IdeError::RegisterAccess);
        }

        let mut found = 0;
        for which in IdeDrive::ALL {
            match identify::identify(&mut self.channel, which, &mut self.scratch) {
                Ok(drive) => {
                    self.log_identity(which, &drive);
                    self.drives[which.index()] = drive;
                    found += 1;
                }
                Err(err) => {
                    crate::kdebug!(
                        "ecide{}: no drive {} ({})",
                        self.card,
                        which.index(),
                        err
                    );
                }
            }
        }
        crate::kdebug!("ecide{}: found {} drives", self.card, found);
        Ok(found)
    }

    fn log_identity(&self, which: IdeDrive, drive: &Drive) {
        crate::kinfo!(
            "ecide{}:{} Disk ID '{}', {}MB ({} sectors, CHS {}/{}/{})",
            self.card,
            which.index(),
            drive.model_str(),
            drive.capacity_mb(),
            drive.total_sectors,
            drive.geometry.cylinders,
            drive.geometry.heads,
            drive.geometry.sectors_per_track
        );
        crate::kinfo!(
            "ecide{}:{} [revision '{}', caps {:04x} ({}LBA)]",
            self.card,
            which.index(),
            drive.firmware_str(),
            drive.capabilities,
            if drive.lba { "" } else { "no " }
        );
    }

    /// Rebuild one drive's partition table.
    ///
    /// The table is cleared first, so on any error the drive is left with
    /// no partitions. Returns the number of partitions found.
    pub fn probe_partitions(&mut self, which: IdeDrive) -> Result<usize, PartitionError> {
        self.drives[which.index()].clear_partitions();
        if !self.drives[which.index()].present {
            return Err(PartitionError::NoDrive);
        }

        let mut reader = DriveReader {
            channel: &mut self.channel,
            modes: [
                Addressing::from(&self.drives[0]),
                Addressing::from(&self.drives[1]),
            ],
        };
        let target = ProbeTarget {
            card: self.card,
            which,
            drives: &self.drives,
        };
        let result = partition::probe(self.scheme, &mut reader, &target, &mut self.scratch);

        match result {
            Ok(table) => {
                let drive = &mut self.drives[which.index()];
                drive.partitions = table;
                Ok(drive.partition_count())
            }
            Err(PartitionError::UnknownScheme) => {
                crate::kwarn!(
                    "ecide{}: Cannot probe partitions, unknown controller {}",
                    self.card,
                    self.host.name()
                );
                Err(PartitionError::UnknownScheme)
            }
            Err(err) => {
                crate::kdebug!("ecide{}:{} no partitions: {}", self.card, which.index(), err);
                Err(err)
            }
        }
    }

    /// Install a partition table supplied by the host, e.g. for a card
    /// with no on-disk convention. Entries are clipped to the drive.
    pub fn set_partitions(
        &mut self,
        which: IdeDrive,
        table: PartitionTable,
    ) -> Result<usize, IdeError> {
        if !self.drives[which.index()].present {
            return Err(IdeError::NoDevice);
        }
        let mut table = table;
        partition::fit_to_capacity(self.card, which, &self.drives[which.index()], &mut table);
        let drive = &mut self.drives[which.index()];
        drive.partitions = table;
        Ok(drive.partition_count())
    }

    pub fn dump_partitions(&self, which: IdeDrive) {
        partition::dump(self.card, which, self.drive(which));
    }

    // ========================================================================
    // Device entry points
    // ========================================================================

    fn partition(&self, which: IdeDrive, index: usize) -> Option<&Partition> {
        let drive = self.drive(which);
        if !drive.present {
            return None;
        }
        drive.partition(index)
    }

    pub fn open(&self, which: IdeDrive, index: usize, write: bool) -> Result<(), IdeError> {
        let part = self.partition(which, index).ok_or(IdeError::NoDevice)?;
        if write && part.read_only {
            return Err(IdeError::ReadOnly);
        }
        Ok(())
    }

    /// Partition size in logical blocks.
    pub fn size(&self, which: IdeDrive, index: usize) -> Option<u32> {
        self.partition(which, index)
            .map(|part| part.size / self.config.sectors_per_block())
    }

    pub fn sector_size(&self) -> u32 {
        self.config.block_size
    }

    // ========================================================================
    // Strategy
    // ========================================================================

    fn check(&self, request: &Request) -> Verdict {
        let block_size = self.config.block_size as usize;
        let len = request.byte_count();
        if len % block_size != 0 {
            return Verdict::Finish(Some(IdeError::InvalidLength));
        }
        if !request.buf.is_word_aligned() {
            return Verdict::Finish(Some(IdeError::Alignment));
        }

        let target = request.target;
        let Some(part) = self.partition(target.drive, target.partition) else {
            return Verdict::Finish(Some(IdeError::NoDevice));
        };
        if request.direction == Direction::Write && part.read_only {
            return Verdict::Finish(Some(IdeError::ReadOnly));
        }

        let spb = self.config.sectors_per_block() as u64;
        let nblks = part.size as u64 / spb;
        let block = request.block as u64;
        let blocks = (len / block_size) as u64;
        if block + blocks > nblks {
            // Exactly at the end is read-ahead running off the partition.
            if block == nblks {
                return Verdict::Finish(None);
            }
            return Verdict::Finish(Some(IdeError::OutOfRange));
        }
        if blocks == 0 {
            return Verdict::Finish(None);
        }

        let end = part.start as u64 + (block + blocks) * spb;
        if end > self.drive(target.drive).total_sectors as u64 {
            return Verdict::Finish(Some(IdeError::OutOfRange));
        }
        Verdict::Dispatch
    }

    fn placement(&self, request: &Request) -> Option<Placement> {
        let target = request.target;
        let part = self.partition(target.drive, target.partition)?;
        let sector = request.block as u64 * self.config.sectors_per_block() as u64
            + part.start as u64;
        Some(Placement {
            drive: target.drive,
            mode: Addressing::from(self.drive(target.drive)),
            sector: u32::try_from(sector).ok()?,
        })
    }

    /// Queue a request.
    ///
    /// Requests failing validation complete at once without touching the
    /// device. In polled mode the queue is run to empty before returning.
    pub fn submit(&mut self, request: Request) -> RequestId {
        let id = RequestId(self.next_id);
        self.next_id += 1;

        if let Verdict::Finish(error) = self.check(&request) {
            if let Some(err) = error {
                crate::kdebug!(
                    "ecide{}: rejected {} block {} len {}: {}",
                    self.card,
                    request.direction.as_str(),
                    request.block,
                    request.byte_count(),
                    err
                );
            }
            self.completions
                .push_back(Completion::untouched(id, request, error));
            return id;
        }

        if self.queue.is_empty() {
            self.retries = 0;
        }
        self.queue.push_back((id, request));

        if self.config.dispatch == DispatchMode::Polled {
            self.run_queue();
        }
        id
    }

    /// Make one transfer attempt for the head of the queue.
    ///
    /// Returns whether requests remain queued.
    pub fn service(&mut self) -> bool {
        let Some((_, request)) = self.queue.front() else {
            return false;
        };

        let placement = self.placement(request);
        let Some(Placement { drive, mode, sector }) = placement else {
            // Partition vanished under a re-probe.
            self.finish_head(Some(IdeError::NoDevice));
            return !self.queue.is_empty();
        };

        let Some((_, request)) = self.queue.front_mut() else {
            return false;
        };
        let result = match request.direction {
            Direction::Read => {
                self.channel
                    .read_sectors(drive, mode, sector, request.buf.as_mut_slice())
            }
            Direction::Write => {
                self.channel
                    .write_sectors(drive, mode, sector, request.buf.as_slice())
            }
        };

        match result {
            Ok(()) => self.finish_head(None),
            Err(err) => {
                let cause = IdeError::from(err);
                self.retries += 1;
                if !cause.is_transient() {
                    crate::kerror!(
                        "ecide{}:{} transfer error {} at sector {}, not retried",
                        self.card,
                        drive.index(),
                        err,
                        sector
                    );
                    self.finish_head(Some(cause));
                } else if self.retries < self.config.retry_limit {
                    crate::kwarn!(
                        "ecide{}:{} transfer error {} at sector {}, retry {}",
                        self.card,
                        drive.index(),
                        err,
                        sector,
                        self.retries
                    );
                } else {
                    crate::kerror!(
                        "ecide{}:{} transfer error {} at sector {}, giving up",
                        self.card,
                        drive.index(),
                        err,
                        sector
                    );
                    self.finish_head(Some(IdeError::Io));
                }
            }
        }
        !self.queue.is_empty()
    }

    /// Service until the queue is empty.
    pub fn run_queue(&mut self) {
        while self.service() {}
    }

    fn finish_head(&mut self, error: Option<IdeError>) {
        let Some((id, request)) = self.queue.pop_front() else {
            return;
        };
        self.retries = 0;
        let completion = match error {
            None => Completion::done(id, request),
            Some(err) => Completion::untouched(id, request, Some(err)),
        };
        self.completions.push_back(completion);
    }

    pub fn pop_completion(&mut self) -> Option<Completion> {
        self.completions.pop_front()
    }

    pub fn take_completion(&mut self, id: RequestId) -> Option<Completion> {
        let at = self.completions.iter().position(|c| c.id == id)?;
        self.completions.remove(at)
    }

    pub fn take_completions(&mut self) -> Vec<Completion> {
        self.completions.drain(..).collect()
    }

    /// Complete everything still queued with `error`.
    pub fn fail_pending(&mut self, error: IdeError) {
        while let Some((id, request)) = self.queue.pop_front() {
            self.completions
                .push_back(Completion::untouched(id, request, Some(error)));
        }
        self.retries = 0;
    }
}
