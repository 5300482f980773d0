//! PCM sample representations accepted by the codec.
//!
//! The representation is a type parameter of sessions and stream adapters,
//! so a float stream can never be fed to an integer encode path.

use std::fmt;
use std::os::raw::c_int;

use crate::ffi;

mod sealed {
    pub trait Sealed {}
    impl Sealed for i16 {}
    impl Sealed for f32 {}
}

/// Sample representation tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// 16-bit signed little-endian integer.
    Int16,
    /// 32-bit float in [-1, 1].
    Float32,
}

impl SampleFormat {
    /// Returns the byte width of one sample.
    pub fn width(&self) -> usize {
        match self {
            Self::Int16 => 2,
            Self::Float32 => 4,
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int16 => write!(f, "s16le"),
            Self::Float32 => write!(f, "f32"),
        }
    }
}

/// A PCM sample type the native codec can encode from and decode into.
///
/// Implemented for `i16` and `f32` only.
pub trait Sample: sealed::Sealed + Copy + Default + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// Representation tag.
    const FORMAT: SampleFormat;

    /// Byte width of one sample.
    const WIDTH: usize;

    /// Calls the matching native encode function.
    ///
    /// # Safety
    /// `pcm` must point to `frame_size * channels` readable samples and `data`
    /// to `max_data_bytes` writable bytes.
    #[doc(hidden)]
    unsafe fn encode_raw(
        enc: *mut ffi::OpusEncoder,
        pcm: *const Self,
        frame_size: c_int,
        data: *mut u8,
        max_data_bytes: i32,
    ) -> i32;

    /// Calls the matching native decode function.
    ///
    /// # Safety
    /// `data` must be null or point to `len` readable bytes; `pcm` must point
    /// to `frame_size * channels` writable samples.
    #[doc(hidden)]
    unsafe fn decode_raw(
        dec: *mut ffi::OpusDecoder,
        data: *const u8,
        len: i32,
        pcm: *mut Self,
        frame_size: c_int,
        decode_fec: c_int,
    ) -> c_int;

    /// Applies soft clipping in place. No-op for integer samples.
    #[doc(hidden)]
    fn soft_clip(_pcm: &mut [Self], _channels: usize, _mem: &mut [f32; 2]) {}
}

impl Sample for i16 {
    const FORMAT: SampleFormat = SampleFormat::Int16;
    const WIDTH: usize = 2;

    unsafe fn encode_raw(
        enc: *mut ffi::OpusEncoder,
        pcm: *const Self,
        frame_size: c_int,
        data: *mut u8,
        max_data_bytes: i32,
    ) -> i32 {
        unsafe { ffi::opus_encode(enc, pcm, frame_size, data, max_data_bytes) }
    }

    unsafe fn decode_raw(
        dec: *mut ffi::OpusDecoder,
        data: *const u8,
        len: i32,
        pcm: *mut Self,
        frame_size: c_int,
        decode_fec: c_int,
    ) -> c_int {
        unsafe { ffi::opus_decode(dec, data, len, pcm, frame_size, decode_fec) }
    }
}

impl Sample for f32 {
    const FORMAT: SampleFormat = SampleFormat::Float32;
    const WIDTH: usize = 4;

    unsafe fn encode_raw(
        enc: *mut ffi::OpusEncoder,
        pcm: *const Self,
        frame_size: c_int,
        data: *mut u8,
        max_data_bytes: i32,
    ) -> i32 {
        unsafe { ffi::opus_encode_float(enc, pcm, frame_size, data, max_data_bytes) }
    }

    unsafe fn decode_raw(
        dec: *mut ffi::OpusDecoder,
        data: *const u8,
        len: i32,
        pcm: *mut Self,
        frame_size: c_int,
        decode_fec: c_int,
    ) -> c_int {
        unsafe { ffi::opus_decode_float(dec, data, len, pcm, frame_size, decode_fec) }
    }

    fn soft_clip(pcm: &mut [Self], channels: usize, mem: &mut [f32; 2]) {
        crate::soft_clip::soft_clip_with_mem(pcm, channels, mem);
    }
}

/// Reinterprets a sample slice as its native-endian bytes.
pub(crate) fn as_bytes<S: Sample>(samples: &[S]) -> &[u8] {
    // Safety: i16 and f32 have no padding and every bit pattern is a valid u8.
    unsafe { std::slice::from_raw_parts(samples.as_ptr() as *const u8, samples.len() * S::WIDTH) }
}

/// Copies samples into a fresh byte vector in native endianness.
pub fn samples_to_bytes<S: Sample>(samples: &[S]) -> Vec<u8> {
    as_bytes(samples).to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_widths() {
        assert_eq!(<i16 as Sample>::WIDTH, 2);
        assert_eq!(<f32 as Sample>::WIDTH, 4);
        assert_eq!(<i16 as Sample>::FORMAT.width(), 2);
        assert_eq!(<f32 as Sample>::FORMAT.width(), 4);
    }

    #[test]
    fn test_format_display() {
        assert_eq!(SampleFormat::Int16.to_string(), "s16le");
        assert_eq!(SampleFormat::Float32.to_string(), "f32");
    }

    #[test]
    fn test_as_bytes() {
        let samples: [i16; 2] = [1, -1];
        let bytes = as_bytes(&samples);
        assert_eq!(bytes.len(), 4);
        if cfg!(target_endian = "little") {
            assert_eq!(bytes, &[0x01, 0x00, 0xff, 0xff]);
        }

        let samples = [0.5f32];
        assert_eq!(as_bytes(&samples), &0.5f32.to_ne_bytes());
    }

    #[test]
    fn test_soft_clip_noop_for_i16() {
        let mut pcm = [i16::MAX, i16::MIN];
        let mut mem = [0.0; 2];
        <i16 as Sample>::soft_clip(&mut pcm, 1, &mut mem);
        assert_eq!(pcm, [i16::MAX, i16::MIN]);
    }
}
