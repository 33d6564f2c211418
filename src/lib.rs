//! podule-ide: polled PIO IDE/ATA block driver core
//!
//! This crate drives an ATA disk channel sitting behind a simple register
//! window on an expansion card (a "podule"). It is split the same way the
//! driver runs:
//!
//! ```text
//! ┌──────────────┐   submit()   ┌─────────────────┐  transfer()  ┌───────────┐
//! │  OS glue     │─────────────▶│  Controller     │─────────────▶│ PioChannel│
//! │ (open/size/  │◀─────────────│  FIFO + retries │              │ handshake │
//! │  strategy)   │  Completion  └────────┬────────┘              └─────┬─────┘
//! └──────────────┘                       │ attach-time                 │
//!                                        ▼                             ▼
//!                              ┌──────────────────┐           ┌──────────────┐
//!                              │ identify +       │           │ RegisterPort │
//!                              │ partition probe  │           │ (MMIO/latch/ │
//!                              └──────────────────┘           │  port I/O)   │
//!                                                             └──────────────┘
//! ```
//!
//! Controllers are owned by a [`registry::Registry`]; each one carries its
//! drives, their partition tables and its own request queue.

#![no_std]

extern crate alloc;

pub mod config;
pub mod controller;
pub mod drive;
pub mod error;
pub mod identify;
pub mod logger;
pub mod partition;
pub mod pio;
pub mod port;
pub mod regs;
pub mod registry;
pub mod request;
#[cfg(all(target_arch = "x86_64", feature = "serial_log"))]
pub mod serial;

pub use config::{DispatchMode, IdeConfig};
pub use controller::{Controller, HostType};
pub use drive::{Chs, Drive, Geometry, IdeDrive, Partition};
pub use error::{IdeError, PartitionError, PioError, TransferError};
pub use partition::PartitionScheme;
pub use pio::{Addressing, Direction, PioChannel};
pub use port::{Delay, RegisterPort};
pub use registry::{ControllerId, Registry};
pub use request::{Completion, IoBuf, Request, RequestId, Target};

/// Physical sector size of every supported drive.
pub const SECTOR_SIZE: usize = 512;

/// Drives per controller (master + slave).
pub const MAX_DRIVES: usize = 2;

/// Partition slots per drive.
pub const MAX_PARTITIONS: usize = 8;

#[macro_export]
macro_rules! klog {
    ($level:expr, $($arg:tt)*) => {{
        $crate::logger::log($level, format_args!($($arg)*));
    }};
}

#[macro_export]
macro_rules! kfatal {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::FATAL, $($arg)*);
    }};
}

#[macro_export]
macro_rules! kerror {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::ERROR, $($arg)*);
    }};
}

#[macro_export]
macro_rules! kwarn {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::WARN, $($arg)*);
    }};
}

#[macro_export]
macro_rules! kinfo {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::INFO, $($arg)*);
    }};
}

#[macro_export]
macro_rules! kdebug {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::DEBUG, $($arg)*);
    }};
}

#[macro_export]
macro_rules! ktrace {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::TRACE, $($arg)*);
    }};
}
