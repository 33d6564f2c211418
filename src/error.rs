//! Driver error taxonomy
//!
//! [`IdeError`] is what crosses the driver boundary: a fieldless code that
//! maps onto a POSIX errno for the request completion channel. The richer
//! types below it ([`PioError`], [`TransferError`], [`PartitionError`]) keep
//! the register-level detail for logging and fold into an `IdeError` when
//! they leave the driver.

use core::fmt;

use crate::regs::{ErrorReg, Status};

/// POSIX style error numbers (subset).
pub mod errno {
    pub const EIO: i32 = 5; // I/O error
    pub const ENXIO: i32 = 6; // No such device or address
    pub const ENODEV: i32 = 19; // No such device
    pub const EINVAL: i32 = 22; // Invalid argument
    pub const ENOSPC: i32 = 28; // No space left on device
    pub const EROFS: i32 = 30; // Read-only file system
    pub const ETIMEDOUT: i32 = 110; // Connection timed out
}

/// Driver operation errors
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(i32)]
pub enum IdeError {
    /// Controller registers did not read back (card absent or not wired)
    RegisterAccess = -1,
    /// Drive did not leave BUSY or raise DRQ in time
    Timeout = -2,
    /// Drive reported ERROR or DRIVE-FAULT
    DeviceError = -3,
    /// Retry budget exhausted on a transfer
    Io = -4,
    /// Controller, drive or partition does not exist
    NoDevice = -5,
    /// Byte count is not a whole number of blocks
    InvalidLength = -6,
    /// Buffer is not word aligned
    Alignment = -7,
    /// Request runs past the end of the partition or drive
    OutOfRange = -8,
    /// Write to a read-only partition
    ReadOnly = -9,
    /// Drive geometry cannot address the request
    BadGeometry = -10,
    /// On-disk partition structure is misaligned
    BadPartitionTable = -11,
    /// Controller table is full
    TooManyControllers = -12,
    /// Configuration value out of range
    InvalidConfig = -13,
}

impl IdeError {
    /// Convert from driver return code
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            -1 => Some(Self::RegisterAccess),
            -2 => Some(Self::Timeout),
            -3 => Some(Self::DeviceError),
            -4 => Some(Self::Io),
            -5 => Some(Self::NoDevice),
            -6 => Some(Self::InvalidLength),
            -7 => Some(Self::Alignment),
            -8 => Some(Self::OutOfRange),
            -9 => Some(Self::ReadOnly),
            -10 => Some(Self::BadGeometry),
            -11 => Some(Self::BadPartitionTable),
            -12 => Some(Self::TooManyControllers),
            -13 => Some(Self::InvalidConfig),
            _ => None,
        }
    }

    pub const fn code(self) -> i32 {
        self as i32
    }

    /// errno reported on the request completion channel.
    pub const fn errno(self) -> i32 {
        match self {
            Self::RegisterAccess => errno::ENODEV,
            Self::Timeout => errno::ETIMEDOUT,
            Self::DeviceError | Self::Io => errno::EIO,
            Self::NoDevice | Self::OutOfRange => errno::ENXIO,
            Self::InvalidLength | Self::Alignment | Self::BadGeometry | Self::InvalidConfig => {
                errno::EINVAL
            }
            Self::ReadOnly => errno::EROFS,
            Self::BadPartitionTable => errno::EIO,
            Self::TooManyControllers => errno::ENOSPC,
        }
    }

    /// Whether the strategy layer may retry after this error.
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::Timeout | Self::DeviceError)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RegisterAccess => "register access failed",
            Self::Timeout => "command timeout",
            Self::DeviceError => "device reported error",
            Self::Io => "I/O error",
            Self::NoDevice => "no such device",
            Self::InvalidLength => "transfer length not a block multiple",
            Self::Alignment => "buffer not word aligned",
            Self::OutOfRange => "transfer outside partition",
            Self::ReadOnly => "partition is read-only",
            Self::BadGeometry => "unusable drive geometry",
            Self::BadPartitionTable => "misaligned partition table",
            Self::TooManyControllers => "controller table full",
            Self::InvalidConfig => "invalid configuration",
        }
    }
}

impl fmt::Display for IdeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a failed PIO handshake.
///
/// A timeout and a device-reported error are kept apart: the first usually
/// means an absent or hung drive, the second carries the status and error
/// registers the drive latched.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PioError {
    Timeout { status: Status },
    Device { status: Status, error: ErrorReg },
}

impl PioError {
    /// Status and error registers packed as `status << 8 | error`.
    pub fn code(&self) -> u16 {
        match *self {
            PioError::Timeout { status } => (status.bits() as u16) << 8,
            PioError::Device { status, error } => {
                ((status.bits() as u16) << 8) | error.bits() as u16
            }
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, PioError::Timeout { .. })
    }
}

impl From<PioError> for IdeError {
    fn from(err: PioError) -> Self {
        match err {
            PioError::Timeout { .. } => IdeError::Timeout,
            PioError::Device { .. } => IdeError::DeviceError,
        }
    }
}

impl fmt::Display for PioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PioError::Timeout { status } => {
                write!(f, "timeout (status {:#04x})", status.bits())
            }
            PioError::Device { .. } => write!(f, "device error {:04x}", self.code()),
        }
    }
}

/// A transfer that stopped part way.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TransferError {
    /// Sectors fully moved before the failure.
    pub completed: u32,
    pub kind: TransferErrorKind,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TransferErrorKind {
    Pio(PioError),
    Geometry,
    Length,
}

impl TransferError {
    pub const fn new(completed: u32, kind: TransferErrorKind) -> Self {
        Self { completed, kind }
    }

    pub const fn pio(completed: u32, err: PioError) -> Self {
        Self::new(completed, TransferErrorKind::Pio(err))
    }
}

impl From<TransferError> for IdeError {
    fn from(err: TransferError) -> Self {
        match err.kind {
            TransferErrorKind::Pio(pio) => pio.into(),
            TransferErrorKind::Geometry => IdeError::BadGeometry,
            TransferErrorKind::Length => IdeError::InvalidLength,
        }
    }
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TransferErrorKind::Pio(pio) => {
                write!(f, "{} after {} sectors", pio, self.completed)
            }
            TransferErrorKind::Geometry => f.write_str("drive geometry cannot address sector"),
            TransferErrorKind::Length => f.write_str("buffer is not a whole number of sectors"),
        }
    }
}

/// Why a partition probe found nothing.
///
/// Everything except [`PartitionError::OddCylinder`] means "no table here";
/// an odd half-cylinder is a hard reject for the whole drive.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PartitionError {
    /// Drive not present
    NoDrive,
    /// Controller type has no known partitioning convention
    UnknownScheme,
    /// Table sector could not be read
    Read { sector: u32, err: TransferError },
    /// filecore boot block checksum mismatch
    BadChecksum { stored: u8, computed: u32 },
    /// Boot block does not announce a nested table
    NoNestedTable { partition_type: u8 },
    /// Magic constant mismatch
    BadMagic { found: u32 },
    /// Half-cylinder value that cannot be halved
    OddCylinder { value: u32 },
    /// Drive geometry is zero, cylinders cannot be converted
    Geometry,
    /// Container table has no slot leading to a nested table
    NotFound,
}

impl PartitionError {
    pub const fn is_hard_reject(&self) -> bool {
        matches!(self, PartitionError::OddCylinder { .. })
    }
}

impl From<PartitionError> for IdeError {
    fn from(err: PartitionError) -> Self {
        match err {
            PartitionError::NoDrive | PartitionError::UnknownScheme | PartitionError::NotFound => {
                IdeError::NoDevice
            }
            PartitionError::Read { err, .. } => err.into(),
            PartitionError::Geometry => IdeError::BadGeometry,
            PartitionError::BadChecksum { .. }
            | PartitionError::NoNestedTable { .. }
            | PartitionError::BadMagic { .. }
            | PartitionError::OddCylinder { .. } => IdeError::BadPartitionTable,
        }
    }
}

impl fmt::Display for PartitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionError::NoDrive => f.write_str("drive not present"),
            PartitionError::UnknownScheme => f.write_str("unknown controller type"),
            PartitionError::Read { sector, err } => {
                write!(f, "can't read sector {}: {}", sector, err)
            }
            PartitionError::BadChecksum { stored, computed } => write!(
                f,
                "boot block checksum bad (stored {:#04x}, computed {:#06x})",
                stored, computed
            ),
            PartitionError::NoNestedTable { partition_type } => {
                write!(f, "no RISCiX section (partition type {})", partition_type)
            }
            PartitionError::BadMagic { found } => {
                write!(f, "partition table magic {:08x} not understood", found)
            }
            PartitionError::OddCylinder { value } => {
                write!(f, "odd half-cylinder value {}", value)
            }
            PartitionError::Geometry => f.write_str("drive geometry is zero"),
            PartitionError::NotFound => f.write_str("no partition table found"),
        }
    }
}
