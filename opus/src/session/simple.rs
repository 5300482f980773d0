//! Sessions that allocate their buffers per call.

use std::time::Duration;

use tracing::{debug, trace};

use super::handle::{DecoderHandle, EncoderHandle};
use super::{
    CodecSession, DEFAULT_LOSS_DURATION, PcmDecoder, PcmEncoder, apply_encoder_ctls,
    frame_size_hint,
};
use crate::config::{Application, DecodeOptions, EncoderConfig, validate_format};
use crate::error::{Error, Result};
use crate::ffi;
use crate::frame_time::{FrameTime, MAX_PACKET_SIZE, max_frame_samples, samples_to_duration};
use crate::packet::Packet;
use crate::sample::Sample;

/// Opus encoder allocating a fresh packet buffer for every call.
pub struct SimpleEncoder {
    sample_rate: u32,
    channels: u8,
    handle: Option<EncoderHandle>,
}

impl SimpleEncoder {
    /// Creates a new Opus encoder.
    ///
    /// # Parameters
    /// - `sample_rate`: Sample rate (8000, 12000, 16000, 24000, or 48000)
    /// - `channels`: Number of channels (1 or 2)
    /// - `application`: Intended application type
    pub fn new(sample_rate: u32, channels: u8, application: Application) -> Result<Self> {
        Self::with_config(&EncoderConfig::new(sample_rate, channels, application))
    }

    /// Creates an encoder from a config. Region capacities are ignored.
    pub fn with_config(config: &EncoderConfig) -> Result<Self> {
        validate_format(config.sample_rate, config.channels)?;
        let handle = EncoderHandle::create(config.sample_rate, config.channels, config.application)?;
        let mut encoder = Self {
            sample_rate: config.sample_rate,
            channels: config.channels,
            handle: Some(handle),
        };
        apply_encoder_ctls(config, |request, value| encoder.ctl(request, value))?;
        debug!(
            "opus: simple encoder created ({}Hz, {}ch, {:?})",
            config.sample_rate, config.channels, config.application
        );
        Ok(encoder)
    }

    /// Creates a new VoIP encoder.
    pub fn new_voip(sample_rate: u32, channels: u8) -> Result<Self> {
        Self::new(sample_rate, channels, Application::VoIP)
    }

    /// Creates a new audio encoder.
    pub fn new_audio(sample_rate: u32, channels: u8) -> Result<Self> {
        Self::new(sample_rate, channels, Application::Audio)
    }

    fn handle(&mut self) -> Result<&mut EncoderHandle> {
        self.handle.as_mut().ok_or(Error::UseAfterDestroy)
    }

    /// Encodes interleaved 16-bit samples to a packet.
    pub fn encode(&mut self, pcm: &[i16]) -> Result<Packet> {
        self.encode_pcm(pcm)
    }

    /// Encodes interleaved float samples to a packet.
    pub fn encode_float(&mut self, pcm: &[f32]) -> Result<Packet> {
        self.encode_pcm(pcm)
    }

    /// Encodes to a provided buffer. Returns number of bytes written.
    pub fn encode_to<S: Sample>(&mut self, pcm: &[S], buf: &mut [u8]) -> Result<usize> {
        let n = self.handle()?.encode(pcm, buf)?;
        trace!("opus: encoded {} {} samples into {} bytes", pcm.len(), S::FORMAT, n);
        Ok(n)
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
        self.handle()?.ctl(request, value)
    }

    /// Returns the per-channel frame size for a frame time.
    pub fn frame_size_for(&self, frame_time: FrameTime) -> usize {
        frame_time.samples(self.sample_rate, 1)
    }
}

impl CodecSession for SimpleEncoder {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u8 {
        self.channels
    }

    fn is_destroyed(&self) -> bool {
        self.handle.is_none()
    }

    fn destroy(&mut self) {
        if self.handle.take().is_some() {
            debug!("opus: simple encoder destroyed");
        }
    }
}

impl PcmEncoder for SimpleEncoder {
    fn encode_pcm<S: Sample>(&mut self, pcm: &[S]) -> Result<Packet> {
        let mut buf = vec![0u8; MAX_PACKET_SIZE];
        let n = self.encode_to(pcm, &mut buf)?;
        buf.truncate(n);
        Ok(Packet::new(buf))
    }
}

/// Opus decoder allocating a fresh PCM buffer for every call.
pub struct SimpleDecoder {
    sample_rate: u32,
    channels: u8,
    last_packet_duration: Duration,
    soft_clip_mem: [f32; 2],
    handle: Option<DecoderHandle>,
}

impl SimpleDecoder {
    /// Creates a new Opus decoder.
    ///
    /// # Parameters
    /// - `sample_rate`: Sample rate to decode at (8000, 12000, 16000, 24000, or 48000)
    /// - `channels`: Number of channels (1 or 2)
    pub fn new(sample_rate: u32, channels: u8) -> Result<Self> {
        validate_format(sample_rate, channels)?;
        let handle = DecoderHandle::create(sample_rate, channels)?;
        debug!("opus: simple decoder created ({}Hz, {}ch)", sample_rate, channels);
        Ok(Self {
            sample_rate,
            channels,
            last_packet_duration: DEFAULT_LOSS_DURATION,
            soft_clip_mem: [0.0; 2],
            handle: Some(handle),
        })
    }

    /// Decodes a packet to 16-bit samples; `None` conceals a lost packet.
    pub fn decode(&mut self, packet: Option<&[u8]>, options: DecodeOptions) -> Result<Vec<i16>> {
        self.decode_vec(packet, options, false)
    }

    /// Decodes a packet to float samples, optionally soft-clipping them.
    pub fn decode_float(
        &mut self,
        packet: Option<&[u8]>,
        options: DecodeOptions,
        auto_soft_clip: bool,
    ) -> Result<Vec<f32>> {
        self.decode_vec(packet, options, auto_soft_clip)
    }

    /// Performs packet loss concealment for `duration` of missing audio.
    pub fn decode_plc(&mut self, duration: Duration) -> Result<Vec<i16>> {
        self.decode(
            None,
            DecodeOptions {
                forward_error_correction: false,
                loss_duration: Some(duration),
            },
        )
    }

    /// Decodes to a provided buffer. Returns number of samples per channel.
    pub fn decode_to<S: Sample>(
        &mut self,
        packet: Option<&[u8]>,
        options: DecodeOptions,
        buf: &mut [S],
    ) -> Result<usize> {
        let channels = self.channels as usize;
        let packet = packet.filter(|p| !p.is_empty());
        let frame_size = frame_size_hint(
            packet.is_some(),
            &options,
            self.last_packet_duration,
            self.sample_rate,
            buf.len() / channels,
        );
        let handle = self.handle.as_mut().ok_or(Error::UseAfterDestroy)?;
        let n = handle.decode(
            packet,
            &mut buf[..frame_size * channels],
            frame_size,
            options.forward_error_correction,
        )?;
        self.last_packet_duration = samples_to_duration(n, self.sample_rate);
        trace!(
            "opus: decoded {} bytes into {} {} samples (fec={})",
            packet.map_or(0, <[u8]>::len),
            n,
            S::FORMAT,
            options.forward_error_correction
        );
        Ok(n)
    }

    fn decode_vec<S: Sample>(
        &mut self,
        packet: Option<&[u8]>,
        options: DecodeOptions,
        soft_clip: bool,
    ) -> Result<Vec<S>> {
        if self.handle.is_none() {
            return Err(Error::UseAfterDestroy);
        }
        let channels = self.channels as usize;
        let mut buf = vec![S::default(); max_frame_samples(self.sample_rate, self.channels)];
        let n = self.decode_to(packet, options, &mut buf)?;
        buf.truncate(n * channels);
        if soft_clip {
            S::soft_clip(&mut buf, channels, &mut self.soft_clip_mem);
        }
        Ok(buf)
    }
}

impl CodecSession for SimpleDecoder {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u8 {
        self.channels
    }

    fn is_destroyed(&self) -> bool {
        self.handle.is_none()
    }

    fn destroy(&mut self) {
        if self.handle.take().is_some() {
            debug!("opus: simple decoder destroyed");
        }
    }
}

impl PcmDecoder for SimpleDecoder {
    fn decode_packet<S: Sample>(
        &mut self,
        packet: Option<&[u8]>,
        options: DecodeOptions,
    ) -> Result<Vec<S>> {
        self.decode_vec(packet, options, false)
    }

    fn last_packet_duration(&self) -> Duration {
        self.last_packet_duration
    }
}
