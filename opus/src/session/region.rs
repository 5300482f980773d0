//! Fixed-capacity native byte regions.

use std::alloc::{self, Layout};
use std::ptr::NonNull;

use crate::error::{Error, Result};
use crate::ffi;
use crate::sample::Sample;

/// Alignment of every region; covers `i16` and `f32` views.
const REGION_ALIGN: usize = 16;

/// A zero-initialised heap region handed to the native codec.
///
/// The region never grows; its capacity is fixed at allocation.
pub(crate) struct NativeRegion {
    ptr: NonNull<u8>,
    capacity: usize,
}

// Safety: the region is uniquely owned, like a Box<[u8]>.
unsafe impl Send for NativeRegion {}

impl NativeRegion {
    pub(crate) fn alloc(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::config("region capacity must be positive"));
        }
        let layout = Layout::from_size_align(capacity, REGION_ALIGN)
            .map_err(|e| Error::config(format!("region of {capacity} bytes: {e}")))?;
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or_else(|| Error::init(ffi::OPUS_ALLOC_FAIL))?;
        Ok(Self { ptr, capacity })
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.capacity) }
    }

    pub(crate) fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.capacity) }
    }

    /// Views the first `len_bytes` bytes as samples; a trailing partial
    /// sample is left out.
    pub(crate) fn samples<S: Sample>(&self, len_bytes: usize) -> &[S] {
        let len = len_bytes.min(self.capacity) / S::WIDTH;
        // Safety: aligned for S, initialised, and every bit pattern is a valid S.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr() as *const S, len) }
    }

    /// Views the whole region as samples.
    pub(crate) fn samples_mut<S: Sample>(&mut self) -> &mut [S] {
        let len = self.capacity / S::WIDTH;
        // Safety: see `samples`.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr() as *mut S, len) }
    }
}

impl Drop for NativeRegion {
    fn drop(&mut self) {
        // Safety: allocated in `alloc` with this exact layout.
        unsafe {
            alloc::dealloc(
                self.ptr.as_ptr(),
                Layout::from_size_align_unchecked(self.capacity, REGION_ALIGN),
            )
        };
    }
}
