//! Buffered Opus codec sessions and streaming frame adapters.
//!
//! This crate wraps libopus via FFI and provides:
//!
//! - `session`: encoder and decoder sessions, either over preallocated native
//!   regions (`BufferedEncoder`, `BufferedDecoder`) or allocating per call
//!   (`SimpleEncoder`, `SimpleDecoder`)
//! - `stream`: adapters that re-chunk arbitrary PCM into fixed-duration frames
//!   and decode packet streams with loss concealment and FEC recovery
//! - `packet`: packet introspection (samples, frames, channels, bandwidth)
//! - `soft_clip`: float soft clipping
//!
//! # Example
//!
//! ```ignore
//! use giztoy_opus::{Application, BufferedDecoder, BufferedEncoder, DecodeOptions, PcmEncoder};
//!
//! let mut encoder = BufferedEncoder::new(16000, 1, Application::VoIP)?;
//! let pcm = vec![0i16; 320]; // 20ms at 16kHz
//! let packet = encoder.encode_pcm(&pcm)?;
//!
//! let mut decoder = BufferedDecoder::new(16000, 1)?;
//! decoder.stage_packet(packet.as_bytes())?;
//! let decoded = decoder.decode(DecodeOptions::default())?;
//! assert_eq!(decoded.len(), 320);
//! ```

pub mod config;
pub mod error;
pub mod ffi;
pub mod frame_time;
pub mod packet;
pub mod sample;
pub mod session;
pub mod soft_clip;
pub mod stream;

pub use config::*;
pub use error::{Error, Result};
pub use frame_time::{FrameTime, MAX_FRAME_DURATION_MS, MAX_PACKET_SIZE, samples_per_ms};
pub use packet::{Bandwidth, Packet};
pub use sample::{Sample, SampleFormat};
pub use session::*;
pub use soft_clip::{SoftClipper, pcm_soft_clip};
pub use stream::*;

/// Returns the libopus version string.
pub fn version() -> String {
    ffi::version_string()
}
