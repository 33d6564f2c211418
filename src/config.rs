//! Driver tunables
//!
//! Defaults match the reference hardware. The embedding kernel may override
//! them from its command line:
//!
//! ```text
//! ecide.retries=5 ecide.max_sectors=128 ecide.block_size=1024 ecide.dispatch=deferred loglevel=debug
//! ```

use crate::error::IdeError;
use crate::logger;
use crate::SECTOR_SIZE;

/// How queued requests reach the transfer engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchMode {
    /// `submit` runs the queue to completion before returning.
    Polled,
    /// `submit` only queues; each `service` call performs one attempt.
    Deferred,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdeConfig {
    /// Logical device block size in bytes (a multiple of the sector size).
    pub block_size: u32,
    /// Ceiling on the sector count of a single READ/WRITE command.
    pub max_sectors_per_command: u16,
    /// Attempts per request before it fails with EIO.
    pub retry_limit: u32,
    pub busy_timeout_us: u32,
    pub busy_poll_us: u32,
    pub drq_timeout_us: u32,
    pub drq_poll_us: u32,
    /// Status reads discarded after a drive select or command write.
    pub settle_reads: u8,
    pub max_controllers: usize,
    pub dispatch: DispatchMode,
}

impl IdeConfig {
    pub const fn new() -> Self {
        Self {
            block_size: 512,
            max_sectors_per_command: 128,
            retry_limit: 5,
            busy_timeout_us: 1_000_000,
            busy_poll_us: 10,
            drq_timeout_us: 1_000_000,
            drq_poll_us: 100,
            settle_reads: 4,
            max_controllers: 4,
            dispatch: DispatchMode::Polled,
        }
    }

    /// Sectors per logical block.
    pub const fn sectors_per_block(&self) -> u32 {
        self.block_size / SECTOR_SIZE as u32
    }

    pub fn validate(&self) -> Result<(), IdeError> {
        if self.block_size == 0 || self.block_size % SECTOR_SIZE as u32 != 0 {
            return Err(IdeError::InvalidConfig);
        }
        if self.max_sectors_per_command == 0 || self.max_sectors_per_command > 256 {
            return Err(IdeError::InvalidConfig);
        }
        if self.retry_limit == 0 || self.max_controllers == 0 {
            return Err(IdeError::InvalidConfig);
        }
        if self.busy_poll_us == 0 || self.drq_poll_us == 0 {
            return Err(IdeError::InvalidConfig);
        }
        Ok(())
    }

    /// Apply `ecide.*` directives and `loglevel=` from a boot command line.
    ///
    /// Unknown keys and unparsable values are logged and skipped; the
    /// previous value stays in effect.
    pub fn parse_cmdline(&mut self, cmdline: &str) {
        if let Some(level) = logger::parse_level_directive(cmdline) {
            logger::set_max_level(level);
        }

        for arg in cmdline.split_whitespace() {
            let Some(directive) = arg.strip_prefix("ecide.") else {
                continue;
            };
            let Some((key, value)) = directive.split_once('=') else {
                crate::kwarn!("ecide: ignoring malformed option '{}'", arg);
                continue;
            };
            if !self.apply(key, value) {
                crate::kwarn!("ecide: ignoring option {}={}", key, value);
            } else {
                crate::kinfo!("ecide: config {}={}", key, value);
            }
        }
    }

    fn apply(&mut self, key: &str, value: &str) -> bool {
        match key {
            "block_size" => set_num(&mut self.block_size, value, |v| {
                v != 0 && v % SECTOR_SIZE as u32 == 0
            }),
            "max_sectors" => set_num(&mut self.max_sectors_per_command, value, |v| {
                (1..=256).contains(&v)
            }),
            "retries" => set_num(&mut self.retry_limit, value, |v| v > 0),
            "busy_timeout_us" => set_num(&mut self.busy_timeout_us, value, |_| true),
            "drq_timeout_us" => set_num(&mut self.drq_timeout_us, value, |_| true),
            "settle_reads" => set_num(&mut self.settle_reads, value, |_| true),
            "max_controllers" => set_num(&mut self.max_controllers, value, |v| v > 0),
            "dispatch" => {
                if value.eq_ignore_ascii_case("polled") {
                    self.dispatch = DispatchMode::Polled;
                } else if value.eq_ignore_ascii_case("deferred") {
                    self.dispatch = DispatchMode::Deferred;
                } else {
                    return false;
                }
                true
            }
            _ => false,
        }
    }
}

impl Default for IdeConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn set_num<T: core::str::FromStr + Copy>(
    slot: &mut T,
    value: &str,
    ok: impl Fn(T) -> bool,
) -> bool {
    match value.parse::<T>() {
        Ok(v) if ok(v) => {
            *slot = v;
            true
        }
        _ => false,
    }
}
