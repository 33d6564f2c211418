//! Controller registry
//!
//! Cards are attached as the host finds them and keep their index (the card
//! number) until detached. Each controller sits behind its own lock, so
//! separate cards can be driven from separate CPUs.

use alloc::boxed::Box;
use alloc::vec::Vec;

use spin::{Mutex, MutexGuard};

use crate::config::IdeConfig;
use crate::controller::{Controller, HostType};
use crate::drive::IdeDrive;
use crate::error::IdeError;
use crate::pio::{Direction, PioChannel};
use crate::port::{Delay, RegisterPort};
use crate::request::{Completion, IoBuf, Request, RequestId, Target};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ControllerId(pub usize);

pub struct Registry {
    config: IdeConfig,
    controllers: Vec<Option<Mutex<Controller>>>,
}

impl Registry {
    pub fn new(config: IdeConfig) -> Result<Self, IdeError> {
        config.validate()?;
        Ok(Self {
            config,
            controllers: Vec::new(),
        })
    }

    pub fn config(&self) -> &IdeConfig {
        &self.config
    }

    pub fn count(&self) -> usize {
        self.controllers.iter().filter(|c| c.is_some()).count()
    }

    pub fn ids(&self) -> impl Iterator<Item = ControllerId> + '_ {
        self.controllers
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_some())
            .map(|(i, _)| ControllerId(i))
    }

    pub fn controller(&self, id: ControllerId) -> Option<MutexGuard<'_, Controller>> {
        self.controllers
            .get(id.0)
            .and_then(Option::as_ref)
            .map(Mutex::lock)
    }

    /// Bring up a card found in `slot`.
    ///
    /// Runs drive discovery, then the partition probe for every drive that
    /// answered. A card whose registers don't respond is not registered.
    pub fn attach(
        &mut self,
        slot: u32,
        host: HostType,
        port: Box<dyn RegisterPort + Send>,
        delay: Box<dyn Delay + Send>,
    ) -> Result<ControllerId, IdeError> {
        if self.count() >= self.config.max_controllers {
            crate::kwarn!("Ignoring ecide card in slot {}", slot);
            return Err(IdeError::TooManyControllers);
        }

        let card = self
            .controllers
            .iter()
            .position(Option::is_none)
            .unwrap_or(self.controllers.len());

        let channel = PioChannel::new(port, delay, &self.config);
        let mut controller = Controller::new(card, slot, host, channel, self.config);

        let found = controller.discover()?;
        if found > 0 {
            crate::kinfo!(
                "ecide{}: {} drive{} found, slot {} ({})",
                card,
                found,
                if found > 1 { "s" } else { "" },
                slot,
                host.name()
            );
        } else {
            crate::kinfo!("ecide{}, slot {}: no drives found", card, slot);
        }

        for which in IdeDrive::ALL {
            if controller.drive(which).present {
                let _ = controller.probe_partitions(which);
            }
        }
        for which in IdeDrive::ALL {
            if controller.drive(which).present {
                controller.dump_partitions(which);
            }
        }

        if card == self.controllers.len() {
            self.controllers.push(Some(Mutex::new(controller)));
        } else {
            self.controllers[card] = Some(Mutex::new(controller));
        }
        Ok(ControllerId(card))
    }

    /// Remove a card. Requests still queued complete with ENXIO and are
    /// returned along with any completions not yet collected.
    pub fn detach(&mut self, id: ControllerId) -> Result<Vec<Completion>, IdeError> {
        let slot = self.controllers.get_mut(id.0).ok_or(IdeError::NoDevice)?;
        let controller = slot.take().ok_or(IdeError::NoDevice)?;
        let mut controller = controller.into_inner();
        controller.fail_pending(IdeError::NoDevice);
        crate::kinfo!("ecide{}: detached", controller.card());
        Ok(controller.take_completions())
    }

    /// Re-read both drives' identity and partition tables.
    pub fn rescan(&self, id: ControllerId) -> Result<usize, IdeError> {
        let mut controller = self.controller(id).ok_or(IdeError::NoDevice)?;
        controller.fail_pending(IdeError::NoDevice);
        let found = controller.discover()?;
        for which in IdeDrive::ALL {
            if controller.drive(which).present {
                let _ = controller.probe_partitions(which);
            }
        }
        Ok(found)
    }

    pub fn dump(&self, id: ControllerId) {
        if let Some(controller) = self.controller(id) {
            for which in IdeDrive::ALL {
                if controller.drive(which).present {
                    controller.dump_partitions(which);
                }
            }
        }
    }

    // ========================================================================
    // Device entry points
    // ========================================================================

    pub fn open(&self, target: Target, write: bool) -> Result<(), IdeError> {
        let controller = self.controller(target.controller).ok_or(IdeError::NoDevice)?;
        controller.open(target.drive, target.partition, write)
    }

    /// Partition size in logical blocks, `None` if it doesn't exist.
    pub fn size(&self, target: Target) -> Option<u32> {
        self.controller(target.controller)?
            .size(target.drive, target.partition)
    }

    pub fn sector_size(&self) -> u32 {
        self.config.block_size
    }

    pub fn submit(&self, request: Request) -> Result<RequestId, IdeError> {
        let mut controller = self
            .controller(request.target.controller)
            .ok_or(IdeError::NoDevice)?;
        Ok(controller.submit(request))
    }

    /// One attempt on a deferred controller. Returns whether work remains.
    pub fn service(&self, id: ControllerId) -> bool {
        self.controller(id)
            .map(|mut c| c.service())
            .unwrap_or(false)
    }

    pub fn completions(&self, id: ControllerId) -> Vec<Completion> {
        self.controller(id)
            .map(|mut c| c.take_completions())
            .unwrap_or_default()
    }

    // ========================================================================
    // Raw access
    // ========================================================================

    /// Read `len` bytes at byte `offset` of a partition and wait for it.
    pub fn read_raw(
        &self,
        target: Target,
        offset: u64,
        len: usize,
    ) -> Result<Completion, IdeError> {
        self.raw(target, offset, Direction::Read, IoBuf::zeroed(len))
    }

    /// Write `data` at byte `offset` of a partition and wait for it.
    pub fn write_raw(
        &self,
        target: Target,
        offset: u64,
        data: &[u8],
    ) -> Result<Completion, IdeError> {
        self.raw(target, offset, Direction::Write, IoBuf::from_slice(data))
    }

    fn raw(
        &self,
        target: Target,
        offset: u64,
        direction: Direction,
        buf: IoBuf,
    ) -> Result<Completion, IdeError> {
        let block_size = self.config.block_size as u64;
        if offset % block_size != 0 || buf.len() as u64 % block_size != 0 {
            return Err(IdeError::InvalidLength);
        }
        if !buf.is_word_aligned() {
            return Err(IdeError::Alignment);
        }
        let block = u32::try_from(offset / block_size).map_err(|_| IdeError::OutOfRange)?;

        let mut controller = self.controller(target.controller).ok_or(IdeError::NoDevice)?;
        let id = controller.submit(Request::with_buf(target, block, direction, buf));
        loop {
            if let Some(done) = controller.take_completion(id) {
                return Ok(done);
            }
            if !controller.service() {
                return controller.take_completion(id).ok_or(IdeError::Io);
            }
        }
    }
}
