//! Transfer requests and their completions.

use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use crate::drive::IdeDrive;
use crate::error::IdeError;
use crate::pio::Direction;
use crate::registry::ControllerId;

/// Identifies a request on its completion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(pub u64);

/// A partition on a drive on a controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Target {
    pub controller: ControllerId,
    pub drive: IdeDrive,
    pub partition: usize,
}

impl Target {
    pub const fn new(controller: ControllerId, drive: IdeDrive, partition: usize) -> Self {
        Self {
            controller,
            drive,
            partition,
        }
    }
}

/// Owned transfer buffer.
///
/// Storage is word aligned; a non-zero `offset` shifts the visible bytes
/// so that callers handing over misaligned memory can be represented.
pub struct IoBuf {
    words: Vec<u32>,
    offset: usize,
    len: usize,
}

impl IoBuf {
    pub fn zeroed(len: usize) -> Self {
        Self::zeroed_at(len, 0)
    }

    /// A buffer whose first byte sits `offset` bytes past a word boundary.
    pub fn zeroed_at(len: usize, offset: usize) -> Self {
        let words = (offset + len).div_ceil(4);
        Self {
            words: vec![0; words],
            offset,
            len,
        }
    }

    pub fn from_slice(data: &[u8]) -> Self {
        let mut buf = Self::zeroed(data.len());
        buf.as_mut_slice().copy_from_slice(data);
        buf
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_word_aligned(&self) -> bool {
        (self.as_slice().as_ptr() as usize) % core::mem::size_of::<u32>() == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: u8 has no alignment or validity requirements and the
        // range lies inside the word allocation.
        unsafe {
            let base = self.words.as_ptr() as *const u8;
            core::slice::from_raw_parts(base.add(self.offset), self.len)
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above, with exclusive access through &mut self.
        unsafe {
            let base = self.words.as_mut_ptr() as *mut u8;
            core::slice::from_raw_parts_mut(base.add(self.offset), self.len)
        }
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.as_slice().to_vec()
    }
}

impl fmt::Debug for IoBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoBuf")
            .field("len", &self.len)
            .field("offset", &self.offset)
            .finish()
    }
}

/// A block transfer against one partition.
#[derive(Debug)]
pub struct Request {
    pub target: Target,
    /// First block, relative to the partition, in logical block units.
    pub block: u32,
    pub direction: Direction,
    pub buf: IoBuf,
}

impl Request {
    pub fn read(target: Target, block: u32, len: usize) -> Self {
        Self {
            target,
            block,
            direction: Direction::Read,
            buf: IoBuf::zeroed(len),
        }
    }

    pub fn write(target: Target, block: u32, data: &[u8]) -> Self {
        Self {
            target,
            block,
            direction: Direction::Write,
            buf: IoBuf::from_slice(data),
        }
    }

    pub fn with_buf(target: Target, block: u32, direction: Direction, buf: IoBuf) -> Self {
        Self {
            target,
            block,
            direction,
            buf,
        }
    }

    pub fn byte_count(&self) -> usize {
        self.buf.len()
    }
}

/// Outcome of a request, handed back with its buffer.
#[derive(Debug)]
pub struct Completion {
    pub id: RequestId,
    pub target: Target,
    pub direction: Direction,
    pub buf: IoBuf,
    /// Bytes moved.
    pub transferred: usize,
    /// Bytes not moved.
    pub residual: usize,
    pub error: Option<IdeError>,
}

impl Completion {
    pub(crate) fn done(id: RequestId, request: Request) -> Self {
        let len = request.buf.len();
        Self {
            id,
            target: request.target,
            direction: request.direction,
            buf: request.buf,
            transferred: len,
            residual: 0,
            error: None,
        }
    }

    /// Nothing moved. `error` of `None` is the end-of-partition case.
    pub(crate) fn untouched(id: RequestId, request: Request, error: Option<IdeError>) -> Self {
        let len = request.buf.len();
        Self {
            id,
            target: request.target,
            direction: request.direction,
            buf: request.buf,
            transferred: 0,
            residual: len,
            error,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// errno for the completion channel, 0 on success.
    pub fn errno(&self) -> i32 {
        self.error.map(IdeError::errno).unwrap_or(0)
    }
}
