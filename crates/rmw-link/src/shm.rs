// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared memory pool for large payloads.
//!
//! A context that enables shared memory owns one [`ShmProvider`]: a single
//! POSIX segment of [`SHM_BUFFER_SIZE`] bytes carved into aligned buffers.
//!
//! ```text
//! +---------------------------------------------------------------+
//! | /rmw_link_<pid>_<n>                                           |
//! | [ buf A ][ free ][ buf B ][ buf C ][          free           ] |
//! +---------------------------------------------------------------+
//!   ^ every offset and length is a multiple of the alignment
//! ```
//!
//! Allocation is first-fit over an offset-sorted free list; freeing a buffer
//! (dropping its [`ShmBuf`]) merges it with adjacent free ranges.

mod segment;

use parking_lot::Mutex;
use segment::ShmSegment;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Size of the pool a context provisions (10 MiB).
pub const SHM_BUFFER_SIZE: usize = 10 * 1024 * 1024;

/// Alignment used for every context pool (2^5 = 32 bytes).
pub const DEFAULT_ALIGNMENT: AllocAlignment = AllocAlignment { pow: 5 };

/// Payload size from which publishing through shared memory pays off.
pub const DEFAULT_MESSAGE_SIZE_THRESHOLD: usize = 2048;

// Larger alignments than a page buy nothing for payload buffers.
const MAX_ALIGNMENT_POW: u8 = 12;

static SEGMENT_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Errors that can occur in shared memory operations
#[derive(Debug)]
pub enum ShmError {
    /// Shared memory segment creation failed
    SegmentCreate(io::Error),

    /// Memory mapping failed
    Mmap(io::Error),

    /// Invalid segment name
    InvalidName(String),

    /// Pool size or alignment unusable
    InvalidLayout(String),

    /// Request larger than the whole pool
    PayloadTooLarge { size: usize, capacity: usize },

    /// No free range large enough
    OutOfMemory { requested: usize, available: usize },

    /// Pool released by its owning context
    Released,
}

impl fmt::Display for ShmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SegmentCreate(e) => write!(f, "Shared memory segment creation failed: {e}"),
            Self::Mmap(e) => write!(f, "Memory mapping failed: {e}"),
            Self::InvalidName(name) => write!(f, "Invalid segment name: {name}"),
            Self::InvalidLayout(msg) => write!(f, "Invalid pool layout: {msg}"),
            Self::PayloadTooLarge { size, capacity } => {
                write!(
                    f,
                    "Payload too large: {size} bytes exceeds pool capacity {capacity}"
                )
            }
            Self::OutOfMemory {
                requested,
                available,
            } => write!(
                f,
                "Pool exhausted: {requested} bytes requested, {available} bytes free"
            ),
            Self::Released => write!(f, "Pool released"),
        }
    }
}

impl std::error::Error for ShmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::SegmentCreate(e) | Self::Mmap(e) => Some(e),
            _ => None,
        }
    }
}

/// Allocation alignment as a power of two.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AllocAlignment {
    pub pow: u8,
}

impl AllocAlignment {
    /// Alignment in bytes.
    #[must_use]
    pub const fn bytes(self) -> usize {
        1usize << self.pow
    }
}

impl Default for AllocAlignment {
    fn default() -> Self {
        DEFAULT_ALIGNMENT
    }
}

struct PoolInner {
    segment: ShmSegment,
    alignment: AllocAlignment,
    // (offset, len), sorted by offset, never adjacent
    free: Mutex<Vec<(usize, usize)>>,
    released: AtomicBool,
}

impl PoolInner {
    fn release(&self, offset: usize, len: usize) {
        let mut free = self.free.lock();
        let idx = free.partition_point(|&(off, _)| off < offset);
        free.insert(idx, (offset, len));

        // merge with successor, then predecessor
        if idx + 1 < free.len() && free[idx].0 + free[idx].1 == free[idx + 1].0 {
            free[idx].1 += free[idx + 1].1;
            free.remove(idx + 1);
        }
        if idx > 0 && free[idx - 1].0 + free[idx - 1].1 == free[idx].0 {
            free[idx - 1].1 += free[idx].1;
            free.remove(idx);
        }
    }
}

/// Shared memory pool owned by a context.
///
/// Cloning is cheap and yields a handle to the same pool; the segment is
/// unmapped when the last handle and the last [`ShmBuf`] are gone.
/// [`Self::release`] ends the pool for every handle at once: the name is
/// unlinked and further allocations fail, while live buffers stay mapped.
#[derive(Clone)]
pub struct ShmProvider {
    inner: Arc<PoolInner>,
    message_size_threshold: usize,
}

impl ShmProvider {
    /// Create a pool of `size` bytes handing out `alignment`-aligned buffers.
    pub fn new(size: usize, alignment: AllocAlignment) -> Result<Self, ShmError> {
        if alignment.pow > MAX_ALIGNMENT_POW {
            return Err(ShmError::InvalidLayout(format!(
                "alignment 2^{} exceeds 2^{}",
                alignment.pow, MAX_ALIGNMENT_POW
            )));
        }
        if size == 0 || size % alignment.bytes() != 0 {
            return Err(ShmError::InvalidLayout(format!(
                "size {size} is not a non-zero multiple of {}",
                alignment.bytes()
            )));
        }

        let name = format!(
            "/rmw_link_{}_{}",
            std::process::id(),
            SEGMENT_COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        let segment = ShmSegment::create(&name, size)?;
        log::debug!(
            "[shm] created pool {} ({} bytes, align {})",
            segment.name(),
            size,
            alignment.bytes()
        );

        Ok(Self {
            inner: Arc::new(PoolInner {
                segment,
                alignment,
                free: Mutex::new(vec![(0, size)]),
                released: AtomicBool::new(false),
            }),
            message_size_threshold: DEFAULT_MESSAGE_SIZE_THRESHOLD,
        })
    }

    /// Set the payload size from which [`Self::should_use_shm`] answers yes.
    #[must_use]
    pub fn with_message_size_threshold(mut self, threshold: usize) -> Self {
        self.message_size_threshold = threshold;
        self
    }

    /// Reserve a buffer of at least `len` bytes.
    pub fn alloc(&self, len: usize) -> Result<ShmBuf, ShmError> {
        if self.is_released() {
            return Err(ShmError::Released);
        }

        let capacity = self.capacity();
        let align = self.inner.alignment.bytes();
        let reserved = len
            .max(1)
            .checked_add(align - 1)
            .map(|n| n & !(align - 1))
            .filter(|&n| n <= capacity)
            .ok_or(ShmError::PayloadTooLarge {
                size: len,
                capacity,
            })?;

        let mut free = self.inner.free.lock();
        let Some(idx) = free.iter().position(|&(_, blk)| blk >= reserved) else {
            let available = free.iter().map(|&(_, blk)| blk).sum();
            return Err(ShmError::OutOfMemory {
                requested: len,
                available,
            });
        };

        let (offset, blk) = free[idx];
        if blk == reserved {
            free.remove(idx);
        } else {
            free[idx] = (offset + reserved, blk - reserved);
        }
        drop(free);

        Ok(ShmBuf {
            pool: Arc::clone(&self.inner),
            offset,
            len,
            reserved,
        })
    }

    /// Stop handing out buffers and unlink the segment name.
    ///
    /// Applies to every clone of this provider. Calling it again is a no-op.
    pub fn release(&self) {
        if self.inner.released.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.segment.unlink_name();
        log::debug!("[shm] released pool {}", self.segment_name());
    }

    #[must_use]
    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::Acquire)
    }

    /// Free bytes across all ranges.
    #[must_use]
    pub fn available(&self) -> usize {
        self.inner.free.lock().iter().map(|&(_, blk)| blk).sum()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.segment.size()
    }

    #[must_use]
    pub fn alignment(&self) -> AllocAlignment {
        self.inner.alignment
    }

    #[must_use]
    pub fn segment_name(&self) -> &str {
        self.inner.segment.name()
    }

    #[must_use]
    pub fn message_size_threshold(&self) -> usize {
        self.message_size_threshold
    }

    /// Whether a payload of `len` bytes should travel through the pool.
    #[must_use]
    pub fn should_use_shm(&self, len: usize) -> bool {
        len >= self.message_size_threshold
    }
}

impl fmt::Debug for ShmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShmProvider")
            .field("segment", &self.segment_name())
            .field("capacity", &self.capacity())
            .field("available", &self.available())
            .field("alignment", &self.inner.alignment.bytes())
            .field("released", &self.is_released())
            .finish()
    }
}

/// Buffer carved out of a [`ShmProvider`] pool; returned to the pool on drop.
pub struct ShmBuf {
    pool: Arc<PoolInner>,
    offset: usize,
    len: usize,
    reserved: usize,
}

impl ShmBuf {
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Byte offset of the buffer inside the segment.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: [offset, offset + len) lies inside the mapping and is owned
        // exclusively by this buffer until drop.
        unsafe { std::slice::from_raw_parts(self.pool.segment.as_ptr().add(self.offset), self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above; &mut self guarantees no other view of the range.
        unsafe {
            std::slice::from_raw_parts_mut(self.pool.segment.as_ptr().add(self.offset), self.len)
        }
    }
}

impl AsRef<[u8]> for ShmBuf {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl fmt::Debug for ShmBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShmBuf")
            .field("offset", &self.offset)
            .field("len", &self.len)
            .finish()
    }
}

impl Drop for ShmBuf {
    fn drop(&mut self) {
        self.pool.release(self.offset, self.reserved);
    }
}
