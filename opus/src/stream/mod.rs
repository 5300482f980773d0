//! Stream adapters between PCM chunks and Opus packets.
//!
//! Each adapter owns exactly one buffered session for its whole lifetime and
//! releases it when the stream ends, fails, or is dropped. Every API shape
//! comes in three flavors:
//!
//! - [`FrameEncoder`] / [`FrameDecoder`]: pull-based state machines yielding
//!   views into the session's native regions, valid until the next call.
//! - [`EncodeIter`] / [`DecodeIter`]: blocking iterators yielding owned copies.
//! - [`encode_stream`] / [`decode_stream`]: async streams yielding owned copies.
//!
//! The encoder side also accepts raw PCM bytes chunked at arbitrary offsets
//! ([`FrameEncoder::encode_next_bytes`], [`EncodeIter::from_bytes`],
//! [`encode_byte_stream`]).

mod decoder;
mod encoder;
#[cfg(test)]
mod testutil;

pub use decoder::*;
pub use encoder::*;
