//! Codec sessions: one native encoder or decoder instance each.
//!
//! Two variants share the same capability set:
//!
//! - `BufferedEncoder` / `BufferedDecoder` own preallocated native regions and
//!   expose the staging protocol (input region + cursor) used by the stream
//!   adapters.
//! - `SimpleEncoder` / `SimpleDecoder` allocate buffers per call.
//!
//! Every session releases its native state exactly once, either through
//! `destroy()` or on drop. Any operation after `destroy()` fails with
//! [`Error::UseAfterDestroy`](crate::Error::UseAfterDestroy).

mod buffered_decoder;
mod buffered_encoder;
mod handle;
mod region;
mod simple;

pub use buffered_decoder::*;
pub use buffered_encoder::*;
pub use simple::*;

use std::time::Duration;

use crate::config::{DecodeOptions, EncoderConfig};
use crate::error::Result;
use crate::ffi;
use crate::frame_time::duration_to_samples;
use crate::packet::Packet;
use crate::sample::Sample;

/// State shared by every codec session.
pub trait CodecSession {
    /// Returns the sample rate.
    fn sample_rate(&self) -> u32;

    /// Returns the number of channels.
    fn channels(&self) -> u8;

    /// Returns true once `destroy()` has run.
    fn is_destroyed(&self) -> bool;

    /// Releases the native instance and buffers. Repeated calls are no-ops.
    fn destroy(&mut self);
}

/// A session that turns PCM frames into packets.
pub trait PcmEncoder: CodecSession {
    /// Encodes one frame of interleaved samples.
    fn encode_pcm<S: Sample>(&mut self, pcm: &[S]) -> Result<Packet>;
}

/// A session that turns packets (or losses) into PCM frames.
pub trait PcmDecoder: CodecSession {
    /// Decodes one packet, or conceals a lost one when `packet` is `None`.
    fn decode_packet<S: Sample>(
        &mut self,
        packet: Option<&[u8]>,
        options: DecodeOptions,
    ) -> Result<Vec<S>>;

    /// Duration of the most recently decoded frame.
    fn last_packet_duration(&self) -> Duration;
}

/// Duration assumed for a loss before any frame has been decoded.
pub const DEFAULT_LOSS_DURATION: Duration = Duration::from_millis(20);

/// Per-channel frame size handed to the native decoder.
///
/// A normal decode may fill the whole output; concealment and recovery
/// decode exactly the lost duration. Never exceeds `capacity`.
pub(crate) fn frame_size_hint(
    has_packet: bool,
    options: &DecodeOptions,
    last_packet_duration: Duration,
    sample_rate: u32,
    capacity: usize,
) -> usize {
    if has_packet && !options.forward_error_correction {
        return capacity;
    }
    let loss = options.loss_duration.unwrap_or(last_packet_duration);
    duration_to_samples(loss, sample_rate).min(capacity)
}

pub(crate) fn apply_encoder_ctls(
    config: &EncoderConfig,
    mut ctl: impl FnMut(i32, i32) -> Result<()>,
) -> Result<()> {
    if let Some(bitrate) = config.bitrate {
        ctl(ffi::OPUS_SET_BITRATE_REQUEST, bitrate)?;
    }
    if let Some(complexity) = config.complexity {
        ctl(ffi::OPUS_SET_COMPLEXITY_REQUEST, complexity)?;
    }
    if config.inband_fec {
        ctl(ffi::OPUS_SET_INBAND_FEC_REQUEST, 1)?;
    }
    if let Some(percent) = config.packet_loss_percent {
        ctl(ffi::OPUS_SET_PACKET_LOSS_PERC_REQUEST, percent)?;
    }
    Ok(())
}
