//! Encoder session with preallocated native input/output regions.

use tracing::{debug, trace};

use super::handle::EncoderHandle;
use super::region::NativeRegion;
use super::{CodecSession, PcmEncoder, apply_encoder_ctls};
use crate::config::{Application, EncoderConfig};
use crate::error::{Error, Result};
use crate::ffi;
use crate::frame_time::{MAX_PACKET_SIZE, max_frame_samples};
use crate::packet::Packet;
use crate::sample::{self, Sample};

struct EncoderState {
    handle: EncoderHandle,
    input: NativeRegion,
    output: NativeRegion,
}

/// Encoder session over one native encoder and two fixed native regions.
///
/// PCM is staged into the input region and `input_cursor` records how many
/// bytes are valid. `encode` consumes exactly those bytes and leaves the
/// cursor alone; resetting it is up to the caller.
pub struct BufferedEncoder {
    sample_rate: u32,
    channels: u8,
    application: Application,
    input_capacity: usize,
    output_capacity: usize,
    input_cursor: usize,
    output_len: usize,
    state: Option<EncoderState>,
}

impl BufferedEncoder {
    /// Creates an encoder with default region capacities.
    pub fn new(sample_rate: u32, channels: u8, application: Application) -> Result<Self> {
        Self::with_config(&EncoderConfig::new(sample_rate, channels, application))
    }

    /// Creates an encoder from a config, applying its encoder controls.
    pub fn with_config(config: &EncoderConfig) -> Result<Self> {
        config.validate()?;
        let input_capacity = config
            .input_capacity
            .unwrap_or_else(|| Self::default_input_capacity(config.sample_rate, config.channels));
        let output_capacity = config.output_capacity.unwrap_or(MAX_PACKET_SIZE);

        let handle = EncoderHandle::create(config.sample_rate, config.channels, config.application)?;
        let input = NativeRegion::alloc(input_capacity)?;
        let output = NativeRegion::alloc(output_capacity)?;

        let mut encoder = Self {
            sample_rate: config.sample_rate,
            channels: config.channels,
            application: config.application,
            input_capacity,
            output_capacity,
            input_cursor: 0,
            output_len: 0,
            state: Some(EncoderState {
                handle,
                input,
                output,
            }),
        };
        apply_encoder_ctls(config, |request, value| encoder.ctl(request, value))?;

        debug!(
            "opus: buffered encoder created ({}Hz, {}ch, {:?}, in={}B, out={}B)",
            encoder.sample_rate, encoder.channels, encoder.application, input_capacity, output_capacity
        );
        Ok(encoder)
    }

    /// Default input capacity: a 120 ms frame of float samples.
    pub fn default_input_capacity(sample_rate: u32, channels: u8) -> usize {
        4 * max_frame_samples(sample_rate, channels)
    }

    pub fn application(&self) -> Application {
        self.application
    }

    pub fn input_capacity(&self) -> usize {
        self.input_capacity
    }

    pub fn output_capacity(&self) -> usize {
        self.output_capacity
    }

    /// Bytes currently staged in the input region.
    pub fn input_cursor(&self) -> usize {
        self.input_cursor
    }

    /// Bytes produced by the last encode call.
    pub fn output_len(&self) -> usize {
        self.output_len
    }

    fn state(&mut self) -> Result<&mut EncoderState> {
        self.state.as_mut().ok_or(Error::UseAfterDestroy)
    }

    /// Sets the number of staged bytes.
    pub fn set_input_cursor(&mut self, cursor: usize) -> Result<()> {
        let capacity = self.state()?.input.capacity();
        if cursor > capacity {
            return Err(Error::config(format!(
                "input cursor {cursor} exceeds capacity {capacity}"
            )));
        }
        self.input_cursor = cursor;
        Ok(())
    }

    /// Write access to the whole input region.
    pub fn input_mut(&mut self) -> Result<&mut [u8]> {
        Ok(self.state()?.input.as_bytes_mut())
    }

    /// Copies as many whole samples of `pcm` as fit behind the cursor and
    /// advances it. Returns the number of samples copied.
    pub fn write_input<S: Sample>(&mut self, pcm: &[S]) -> Result<usize> {
        let free = self.state()?.input.capacity() - self.input_cursor;
        let n = pcm.len().min(free / S::WIDTH);
        self.write_input_bytes(sample::as_bytes(&pcm[..n]))?;
        Ok(n)
    }

    /// Copies as many raw bytes of `data` as fit behind the cursor and
    /// advances it. Returns the number of bytes copied.
    ///
    /// The bytes are staged as-is, so a chunk may end in the middle of a
    /// sample. The codec reads them in host byte order.
    pub fn write_input_bytes(&mut self, data: &[u8]) -> Result<usize> {
        let cursor = self.input_cursor;
        let input = &mut self.state()?.input;
        let n = data.len().min(input.capacity() - cursor);
        input.as_bytes_mut()[cursor..cursor + n].copy_from_slice(&data[..n]);
        self.input_cursor += n;
        Ok(n)
    }

    /// Zero-fills the input region behind the cursor and moves the cursor to
    /// the end. Returns the number of bytes filled.
    pub fn fill_input(&mut self) -> Result<usize> {
        let cursor = self.input_cursor;
        let input = &mut self.state()?.input;
        let capacity = input.capacity();
        input.as_bytes_mut()[cursor..].fill(0);
        self.input_cursor = capacity;
        Ok(capacity - cursor)
    }

    /// Output of the last encode call.
    pub fn output(&self) -> Result<&[u8]> {
        let state = self.state.as_ref().ok_or(Error::UseAfterDestroy)?;
        Ok(&state.output.as_bytes()[..self.output_len])
    }

    /// Encodes the staged 16-bit samples.
    pub fn encode(&mut self) -> Result<&[u8]> {
        self.encode_as::<i16>()
    }

    /// Encodes the staged float samples.
    pub fn encode_float(&mut self) -> Result<&[u8]> {
        self.encode_as::<f32>()
    }

    /// Encodes the staged samples interpreted as `S`.
    pub fn encode_as<S: Sample>(&mut self) -> Result<&[u8]> {
        let frame_bytes = self.channels as usize * S::WIDTH;
        let staged = self.input_cursor / frame_bytes * frame_bytes;
        let state = self.state.as_mut().ok_or(Error::UseAfterDestroy)?;

        let pcm = state.input.samples::<S>(staged);
        let n = state.handle.encode(pcm, state.output.as_bytes_mut())?;
        self.output_len = n;
        trace!("opus: encoded {} {} samples into {} bytes", pcm.len(), S::FORMAT, n);
        Ok(&state.output.as_bytes()[..n])
    }

    /// Sets the target bitrate in bits per second.
    pub fn set_bitrate(&mut self, bitrate: i32) -> Result<()> {
        self.ctl(ffi::OPUS_SET_BITRATE_REQUEST, bitrate)
    }

    /// Sets the encoder complexity (0-10).
    pub fn set_complexity(&mut self, complexity: i32) -> Result<()> {
        self.ctl(ffi::OPUS_SET_COMPLEXITY_REQUEST, complexity)
    }

    /// Enables or disables in-band forward error correction.
    pub fn set_inband_fec(&mut self, enabled: bool) -> Result<()> {
        self.ctl(ffi::OPUS_SET_INBAND_FEC_REQUEST, enabled as i32)
    }

    /// Sets the expected packet loss percentage (0-100).
    pub fn set_packet_loss_percent(&mut self, percent: i32) -> Result<()> {
        self.ctl(ffi::OPUS_SET_PACKET_LOSS_PERC_REQUEST, percent)
    }

    fn ctl(&mut self, request: i32, value: i32) -> Result<()> {
        self.state()?.handle.ctl(request, value)
    }
}

impl CodecSession for BufferedEncoder {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u8 {
        self.channels
    }

    fn is_destroyed(&self) -> bool {
        self.state.is_none()
    }

    fn destroy(&mut self) {
        if self.state.take().is_some() {
            self.input_cursor = 0;
            self.output_len = 0;
            debug!("opus: buffered encoder destroyed");
        }
    }
}

impl PcmEncoder for BufferedEncoder {
    fn encode_pcm<S: Sample>(&mut self, pcm: &[S]) -> Result<Packet> {
        let len = pcm.len() * S::WIDTH;
        let capacity = self.state()?.input.capacity();
        if len > capacity {
            return Err(Error::PacketTooLarge { len, capacity });
        }
        self.input_cursor = 0;
        self.write_input(pcm)?;
        let packet = self.encode_as::<S>().map(Packet::from_slice);
        self.input_cursor = 0;
        packet
    }
}
