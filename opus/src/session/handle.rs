//! Owned native encoder/decoder instances.

use std::os::raw::c_int;
use std::ptr::{self, NonNull};

use crate::config::Application;
use crate::error::{Error, Result, check};
use crate::ffi;
use crate::sample::Sample;

/// Exclusively owned `OpusEncoder*`, destroyed on drop.
pub(crate) struct EncoderHandle {
    ptr: NonNull<ffi::OpusEncoder>,
    channels: usize,
}

// Safety: the handle is owned by exactly one session and never aliased.
unsafe impl Send for EncoderHandle {}

impl EncoderHandle {
    pub(crate) fn create(sample_rate: u32, channels: u8, application: Application) -> Result<Self> {
        let mut error: c_int = 0;
        let raw = unsafe {
            ffi::opus_encoder_create(
                sample_rate as i32,
                channels as c_int,
                application.to_ffi(),
                &mut error,
            )
        };

        if error != ffi::OPUS_OK {
            if !raw.is_null() {
                unsafe { ffi::opus_encoder_destroy(raw) };
            }
            return Err(Error::init(error));
        }

        let ptr = NonNull::new(raw).ok_or_else(|| Error::init(ffi::OPUS_ALLOC_FAIL))?;
        Ok(Self {
            ptr,
            channels: channels as usize,
        })
    }

    /// Encodes interleaved `pcm` into `out`. Returns the packet length.
    pub(crate) fn encode<S: Sample>(&mut self, pcm: &[S], out: &mut [u8]) -> Result<usize> {
        let frame_size = pcm.len() / self.channels;
        let n = unsafe {
            S::encode_raw(
                self.ptr.as_ptr(),
                pcm.as_ptr(),
                frame_size as c_int,
                out.as_mut_ptr(),
                out.len().min(i32::MAX as usize) as i32,
            )
        };
        check(n)
    }

    pub(crate) fn ctl(&mut self, request: c_int, value: i32) -> Result<()> {
        let ret = unsafe { ffi::opus_encoder_ctl(self.ptr.as_ptr(), request, value) };
        check(ret).map(|_| ())
    }
}

impl Drop for EncoderHandle {
    fn drop(&mut self) {
        unsafe { ffi::opus_encoder_destroy(self.ptr.as_ptr()) };
    }
}

/// Exclusively owned `OpusDecoder*`, destroyed on drop.
pub(crate) struct DecoderHandle {
    ptr: NonNull<ffi::OpusDecoder>,
    channels: usize,
}

// Safety: the handle is owned by exactly one session and never aliased.
unsafe impl Send for DecoderHandle {}

impl DecoderHandle {
    pub(crate) fn create(sample_rate: u32, channels: u8) -> Result<Self> {
        let mut error: c_int = 0;
        let raw = unsafe { ffi::opus_decoder_create(sample_rate as i32, channels as c_int, &mut error) };

        if error != ffi::OPUS_OK {
            if !raw.is_null() {
                unsafe { ffi::opus_decoder_destroy(raw) };
            }
            return Err(Error::init(error));
        }

        let ptr = NonNull::new(raw).ok_or_else(|| Error::init(ffi::OPUS_ALLOC_FAIL))?;
        Ok(Self {
            ptr,
            channels: channels as usize,
        })
    }

    /// Decodes `packet` (or conceals a loss when `None`) into `out`.
    ///
    /// `frame_size` is the per-channel hint handed to the codec; it never
    /// exceeds what `out` can hold. Returns decoded samples per channel.
    pub(crate) fn decode<S: Sample>(
        &mut self,
        packet: Option<&[u8]>,
        out: &mut [S],
        frame_size: usize,
        fec: bool,
    ) -> Result<usize> {
        if frame_size * self.channels > out.len() {
            return Err(Error::runtime(ffi::OPUS_BUFFER_TOO_SMALL));
        }

        let (data, len) = match packet {
            Some(p) if !p.is_empty() => (p.as_ptr(), p.len() as i32),
            _ => (ptr::null(), 0),
        };

        let n = unsafe {
            S::decode_raw(
                self.ptr.as_ptr(),
                data,
                len,
                out.as_mut_ptr(),
                frame_size as c_int,
                fec as c_int,
            )
        };
        check(n)
    }
}

impl Drop for DecoderHandle {
    fn drop(&mut self) {
        unsafe { ffi::opus_decoder_destroy(self.ptr.as_ptr()) };
    }
}
