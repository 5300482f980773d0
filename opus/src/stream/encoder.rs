//! Re-chunking PCM into fixed-duration frames and encoding them.

use std::marker::PhantomData;
use std::pin::pin;

use async_stream::try_stream;
use futures::{Stream, StreamExt};
use tracing::debug;

use crate::config::{EncoderConfig, StreamEncoderConfig};
use crate::error::{Error, Result};
use crate::frame_time::FrameTime;
use crate::packet::Packet;
use crate::sample::Sample;
use crate::session::{BufferedEncoder, CodecSession};

/// Writes one chunk of elements into a frame encoder, returning the packet
/// of a completed frame.
type Feed<S, T> = for<'a> fn(&'a mut FrameEncoder<S>, &mut &[T]) -> Result<Option<&'a [u8]>>;

/// Pull-based frame encoder over one PCM stream.
///
/// Incoming chunks of any size are copied into the session's input region;
/// every time the region fills up exactly one packet is produced. At most one
/// frame of PCM is ever buffered. Input is either typed samples
/// ([`encode_next`](Self::encode_next)) or raw PCM bytes split anywhere,
/// even inside a sample ([`encode_next_bytes`](Self::encode_next_bytes));
/// `S` selects the native encode path in both cases.
///
/// Packets are returned as views into the session's output region and are
/// only valid until the next call.
pub struct FrameEncoder<S: Sample> {
    session: BufferedEncoder,
    frame_time: FrameTime,
    fill_up_last_frame: bool,
    _sample: PhantomData<S>,
}

impl<S: Sample> FrameEncoder<S> {
    pub fn new(config: &StreamEncoderConfig) -> Result<Self> {
        let enc = &config.encoder;
        let frame_bytes = config
            .frame_time
            .frame_bytes(enc.sample_rate, enc.channels, S::WIDTH);
        let session = BufferedEncoder::with_config(&EncoderConfig {
            input_capacity: Some(frame_bytes),
            ..enc.clone()
        })?;
        debug!(
            "opus: frame encoder ready ({}, {}, {} bytes per frame)",
            config.frame_time,
            S::FORMAT,
            frame_bytes
        );
        Ok(Self {
            session,
            frame_time: config.frame_time,
            fill_up_last_frame: config.fill_up_last_frame,
            _sample: PhantomData,
        })
    }

    pub fn frame_time(&self) -> FrameTime {
        self.frame_time
    }

    /// Bytes of PCM per frame.
    pub fn frame_bytes(&self) -> usize {
        self.session.input_capacity()
    }

    /// Bytes waiting for the current frame to fill up.
    pub fn buffered_bytes(&self) -> usize {
        self.session.input_cursor()
    }

    /// Whole samples waiting for the current frame to fill up.
    pub fn buffered_samples(&self) -> usize {
        self.session.input_cursor() / S::WIDTH
    }

    /// Consumes samples from `input` until a frame is complete.
    ///
    /// Returns the packet for the completed frame, with `input` advanced
    /// past the consumed samples, or `None` once `input` is exhausted
    /// without completing a frame.
    pub fn encode_next(&mut self, input: &mut &[S]) -> Result<Option<&[u8]>> {
        self.encode_with(input, BufferedEncoder::write_input::<S>)
    }

    /// Like [`encode_next`](Self::encode_next), over raw PCM bytes in host
    /// byte order.
    pub fn encode_next_bytes(&mut self, input: &mut &[u8]) -> Result<Option<&[u8]>> {
        self.encode_with(input, BufferedEncoder::write_input_bytes)
    }

    fn encode_with<T>(
        &mut self,
        input: &mut &[T],
        write: fn(&mut BufferedEncoder, &[T]) -> Result<usize>,
    ) -> Result<Option<&[u8]>> {
        while !input.is_empty() {
            let n = write(&mut self.session, input)?;
            if n == 0 {
                // Only reachable after bytes left a partial sample staged.
                return Err(Error::config(format!(
                    "{} buffered bytes are not a whole number of {} samples",
                    self.session.input_cursor(),
                    S::FORMAT
                )));
            }
            *input = &input[n..];
            if self.session.input_cursor() == self.session.input_capacity() {
                return self.flush().map(Some);
            }
        }
        Ok(None)
    }

    /// Handles the end of input.
    ///
    /// A partial frame is zero-padded and encoded when `fill_up_last_frame`
    /// is set; otherwise it fails with `UnfinishedFrame`.
    pub fn finish(&mut self) -> Result<Option<&[u8]>> {
        let cursor = self.session.input_cursor();
        if cursor == 0 {
            return Ok(None);
        }
        if !self.fill_up_last_frame {
            let missing_samples = (self.session.input_capacity() - cursor) / S::WIDTH;
            self.session.set_input_cursor(0)?;
            return Err(Error::UnfinishedFrame { missing_samples });
        }
        let padded = self.session.fill_input()?;
        debug!("opus: padded last frame with {} bytes", padded);
        self.flush().map(Some)
    }

    fn flush(&mut self) -> Result<&[u8]> {
        self.session.encode_as::<S>()?;
        self.session.set_input_cursor(0)?;
        self.session.output()
    }

    /// Releases the native encoder. Further calls fail with `UseAfterDestroy`.
    pub fn close(&mut self) {
        self.session.destroy();
    }

    pub fn is_closed(&self) -> bool {
        self.session.is_destroyed()
    }
}

/// Blocking adapter encoding an iterator of PCM chunks into packets.
///
/// Chunks are slices of samples (`T = S`, see [`new`](Self::new)) or of raw
/// PCM bytes (`T = u8`, see [`from_bytes`](Self::from_bytes)).
///
/// Terminates after the first error. The session is released when the input
/// ends, on error, or when the iterator is dropped.
pub struct EncodeIter<S: Sample, I: Iterator, T = S> {
    encoder: Option<FrameEncoder<S>>,
    input: I,
    chunk: Option<I::Item>,
    offset: usize,
    feed: Feed<S, T>,
}

impl<S, I> EncodeIter<S, I>
where
    S: Sample,
    I: Iterator,
    I::Item: AsRef<[S]>,
{
    pub fn new(input: I, config: &StreamEncoderConfig) -> Result<Self> {
        Self::with_feed(input, config, FrameEncoder::<S>::encode_next)
    }
}

impl<S, I> EncodeIter<S, I, u8>
where
    S: Sample,
    I: Iterator,
    I::Item: AsRef<[u8]>,
{
    /// Encodes chunks of raw PCM bytes, which may split samples.
    pub fn from_bytes(input: I, config: &StreamEncoderConfig) -> Result<Self> {
        Self::with_feed(input, config, FrameEncoder::<S>::encode_next_bytes)
    }
}

impl<S: Sample, I: Iterator, T> EncodeIter<S, I, T> {
    fn with_feed(input: I, config: &StreamEncoderConfig, feed: Feed<S, T>) -> Result<Self> {
        Ok(Self {
            encoder: Some(FrameEncoder::new(config)?),
            input,
            chunk: None,
            offset: 0,
            feed,
        })
    }
}

impl<S, I, T> Iterator for EncodeIter<S, I, T>
where
    S: Sample,
    I: Iterator,
    I::Item: AsRef<[T]>,
{
    type Item = Result<Packet>;

    fn next(&mut self) -> Option<Self::Item> {
        let encoder = self.encoder.as_mut()?;
        loop {
            if let Some(chunk) = self.chunk.as_ref() {
                let mut rest = &chunk.as_ref()[self.offset..];
                let before = rest.len();
                let step = (self.feed)(encoder, &mut rest).map(|p| p.map(Packet::from_slice));
                let consumed = before - rest.len();
                match step {
                    Ok(Some(packet)) => {
                        self.offset += consumed;
                        return Some(Ok(packet));
                    }
                    Ok(None) => {
                        self.chunk = None;
                        self.offset = 0;
                    }
                    Err(e) => {
                        self.encoder = None;
                        return Some(Err(e));
                    }
                }
            }

            match self.input.next() {
                Some(chunk) => self.chunk = Some(chunk),
                None => {
                    let last = encoder.finish().map(|p| p.map(Packet::from_slice));
                    self.encoder = None;
                    return last.transpose();
                }
            }
        }
    }
}

/// Encodes a stream of PCM chunks into a stream of packets.
///
/// The returned stream ends with the first error. Dropping it drops `input`
/// and releases the native encoder.
pub fn encode_stream<S, St>(
    input: St,
    config: StreamEncoderConfig,
) -> impl Stream<Item = Result<Packet>>
where
    S: Sample,
    St: Stream,
    St::Item: AsRef<[S]>,
{
    packet_stream(input, config, FrameEncoder::<S>::encode_next)
}

/// Encodes a stream of raw PCM byte chunks into a stream of packets.
///
/// Chunks may end anywhere, including inside a sample; `S` selects how the
/// bytes are read. Otherwise behaves like [`encode_stream`].
pub fn encode_byte_stream<S, St>(
    input: St,
    config: StreamEncoderConfig,
) -> impl Stream<Item = Result<Packet>>
where
    S: Sample,
    St: Stream,
    St::Item: AsRef<[u8]>,
{
    packet_stream(input, config, FrameEncoder::<S>::encode_next_bytes)
}

fn packet_stream<S, T, St>(
    input: St,
    config: StreamEncoderConfig,
    feed: Feed<S, T>,
) -> impl Stream<Item = Result<Packet>>
where
    S: Sample,
    St: Stream,
    St::Item: AsRef<[T]>,
{
    try_stream! {
        let mut encoder = FrameEncoder::<S>::new(&config)?;
        let mut input = pin!(input);

        while let Some(chunk) = input.next().await {
            let mut rest = chunk.as_ref();
            loop {
                let packet = match feed(&mut encoder, &mut rest)? {
                    Some(p) => Packet::from_slice(p),
                    None => break,
                };
                yield packet;
            }
        }

        if let Some(p) = encoder.finish()? {
            let packet = Packet::from_slice(p);
            yield packet;
        }
        encoder.close();
    }
}
