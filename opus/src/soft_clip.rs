//! Soft clipping of float PCM into [-1, 1].

use std::os::raw::c_int;

use crate::error::{Error, Result};
use crate::ffi;

/// Soft-clips interleaved float samples in place.
///
/// Samples already within [-1, 1] are left untouched; samples outside the
/// range are smoothly folded into it. Each call starts from a clean clipping
/// state; use [`SoftClipper`] to carry the state across consecutive frames.
pub fn pcm_soft_clip(pcm: &mut [f32], channels: usize) -> Result<()> {
    SoftClipper::new(channels)?.process(pcm)
}

/// Stateful soft clipper for a continuous float stream.
#[derive(Debug, Clone)]
pub struct SoftClipper {
    channels: usize,
    mem: [f32; 2],
}

impl SoftClipper {
    /// Creates a soft clipper for 1 or 2 interleaved channels.
    pub fn new(channels: usize) -> Result<Self> {
        if !matches!(channels, 1 | 2) {
            return Err(Error::config(format!("soft clip: unsupported channel count {channels}")));
        }
        Ok(Self {
            channels,
            mem: [0.0; 2],
        })
    }

    /// Soft-clips one frame of interleaved samples in place.
    pub fn process(&mut self, pcm: &mut [f32]) -> Result<()> {
        if pcm.len() % self.channels != 0 {
            return Err(Error::config(format!(
                "soft clip: {} samples are not a multiple of {} channels",
                pcm.len(),
                self.channels
            )));
        }
        soft_clip_with_mem(pcm, self.channels, &mut self.mem);
        Ok(())
    }

    /// Clears the carried clipping state.
    pub fn reset(&mut self) {
        self.mem = [0.0; 2];
    }
}

pub(crate) fn soft_clip_with_mem(pcm: &mut [f32], channels: usize, mem: &mut [f32; 2]) {
    let frame_size = pcm.len() / channels;
    if frame_size == 0 {
        return;
    }
    unsafe {
        ffi::opus_pcm_soft_clip(
            pcm.as_mut_ptr(),
            frame_size as c_int,
            channels as c_int,
            mem.as_mut_ptr(),
        )
    };
}
