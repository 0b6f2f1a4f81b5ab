// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! POSIX shared memory segment backing the provider pool.
//!
//! The provider creates the segment, maps it once, and unlinks the name when
//! the segment is dropped: the pool is private to the process that owns the
//! context, other processes reach buffers through the transport.
//!
//! Segment names must start with `/` and contain no other `/`.
//! Example: `/rmw_link_4242_1`

use super::ShmError;
use std::ffi::CString;
use std::io;
use std::ptr;

/// Mapped, owned POSIX shared memory segment.
pub(crate) struct ShmSegment {
    ptr: *mut u8,
    size: usize,
    name: String,
}

// SAFETY: the mapping is plain memory; the provider hands out disjoint
// ranges and serialises its bookkeeping behind a mutex.
unsafe impl Send for ShmSegment {}
unsafe impl Sync for ShmSegment {}

impl ShmSegment {
    /// Create and map a zeroed segment of `size` bytes.
    ///
    /// A stale segment with the same name is replaced.
    pub(crate) fn create(name: &str, size: usize) -> Result<Self, ShmError> {
        Self::validate_name(name)?;
        if size == 0 {
            return Err(ShmError::InvalidLayout("segment size is zero".to_string()));
        }

        let c_name = CString::new(name).map_err(|_| ShmError::InvalidName(name.to_string()))?;
        let len = libc::off_t::try_from(size)
            .map_err(|_| ShmError::InvalidLayout(format!("segment size {size} too large")))?;

        // SAFETY:
        // - c_name is a valid null-terminated CString created above
        // - shm_unlink errors are ignored (segment may not exist)
        // - shm_open returns a valid fd or -1 (checked below)
        let fd = unsafe {
            libc::shm_unlink(c_name.as_ptr());
            libc::shm_open(
                c_name.as_ptr(),
                libc::O_CREAT | libc::O_RDWR | libc::O_EXCL,
                0o600,
            )
        };
        if fd < 0 {
            return Err(ShmError::SegmentCreate(io::Error::last_os_error()));
        }

        // SAFETY: fd is valid from the successful shm_open above.
        if unsafe { libc::ftruncate(fd, len) } < 0 {
            let err = io::Error::last_os_error();
            // SAFETY: fd is valid and closed exactly once on this error path;
            // the name is removed so nothing is left behind.
            unsafe {
                libc::close(fd);
                libc::shm_unlink(c_name.as_ptr());
            }
            return Err(ShmError::SegmentCreate(err));
        }

        // SAFETY:
        // - null hint lets the kernel choose the address
        // - fd is valid and sized to `size` by ftruncate
        // - mmap returns MAP_FAILED on error (checked below)
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };

        // SAFETY: fd is valid; the mapping (if any) keeps its own reference.
        unsafe { libc::close(fd) };

        if ptr == libc::MAP_FAILED {
            let err = io::Error::last_os_error();
            // SAFETY: c_name is valid; removing the name of a segment we created.
            unsafe { libc::shm_unlink(c_name.as_ptr()) };
            return Err(ShmError::Mmap(err));
        }

        Ok(Self {
            ptr: ptr.cast::<u8>(),
            size,
            name: name.to_string(),
        })
    }

    fn validate_name(name: &str) -> Result<(), ShmError> {
        if !name.starts_with('/') {
            return Err(ShmError::InvalidName(format!(
                "Segment name must start with '/': {name}"
            )));
        }
        if name.len() > 1 && name[1..].contains('/') {
            return Err(ShmError::InvalidName(format!(
                "Segment name cannot contain '/' after prefix: {name}"
            )));
        }
        if name.len() > 255 {
            return Err(ShmError::InvalidName(format!(
                "Segment name too long (max 255): {name}"
            )));
        }
        Ok(())
    }

    /// Check if a segment with the given name exists
    #[cfg(test)]
    pub(crate) fn exists(name: &str) -> bool {
        let Ok(c_name) = CString::new(name) else {
            return false;
        };
        // SAFETY: c_name is valid; a successful open is closed immediately.
        let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDONLY, 0) };
        if fd >= 0 {
            // SAFETY: fd is valid (>= 0) and not used afterwards.
            unsafe { libc::close(fd) };
            true
        } else {
            false
        }
    }

    #[inline]
    pub(crate) fn as_ptr(&self) -> *mut u8 {
        self.ptr
    }

    #[inline]
    pub(crate) fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Remove the name while keeping the mapping alive.
    pub(crate) fn unlink_name(&self) {
        if let Ok(c_name) = CString::new(self.name.as_str()) {
            // SAFETY: c_name is valid; a missing name is not an error here.
            unsafe { libc::shm_unlink(c_name.as_ptr()) };
        }
    }
}

impl Drop for ShmSegment {
    fn drop(&mut self) {
        // SAFETY: ptr/size come from the successful mmap in create() and are
        // unmapped exactly once here.
        unsafe {
            libc::munmap(self.ptr.cast::<libc::c_void>(), self.size);
        }
        self.unlink_name();
    }
}
