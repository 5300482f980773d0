//! Decoder session with preallocated native input/output regions.

use std::time::Duration;

use tracing::{debug, trace};

use super::handle::DecoderHandle;
use super::region::NativeRegion;
use super::{CodecSession, DEFAULT_LOSS_DURATION, PcmDecoder, frame_size_hint};
use crate::config::{DecodeOptions, DecoderConfig};
use crate::error::{Error, Result};
use crate::frame_time::{MAX_PACKET_SIZE, max_frame_samples, samples_to_duration};
use crate::sample::Sample;

struct DecoderState {
    handle: DecoderHandle,
    input: NativeRegion,
    output: NativeRegion,
}

/// Decoder session over one native decoder and two fixed native regions.
///
/// The input cursor holds the length of the staged packet; a cursor of zero
/// means the packet was lost and the next decode conceals (or, with FEC,
/// recovers) the missing audio.
///
/// The default output capacity holds a 120 ms frame of 16-bit samples. Float
/// decoding of frames longer than 60 ms needs an explicit, larger capacity;
/// the default is not adjusted for float output.
pub struct BufferedDecoder {
    sample_rate: u32,
    channels: u8,
    input_capacity: usize,
    output_capacity: usize,
    input_cursor: usize,
    output_len: usize,
    last_packet_duration: Duration,
    soft_clip_mem: [f32; 2],
    state: Option<DecoderState>,
}

impl BufferedDecoder {
    /// Creates a decoder with default region capacities.
    pub fn new(sample_rate: u32, channels: u8) -> Result<Self> {
        Self::with_config(&DecoderConfig::new(sample_rate, channels))
    }

    pub fn with_config(config: &DecoderConfig) -> Result<Self> {
        config.validate()?;
        let input_capacity = config.input_capacity.unwrap_or(MAX_PACKET_SIZE);
        let output_capacity = config
            .output_capacity
            .unwrap_or_else(|| Self::default_output_capacity(config.sample_rate, config.channels));

        let handle = DecoderHandle::create(config.sample_rate, config.channels)?;
        let input = NativeRegion::alloc(input_capacity)?;
        let output = NativeRegion::alloc(output_capacity)?;

        debug!(
            "opus: buffered decoder created ({}Hz, {}ch, in={}B, out={}B)",
            config.sample_rate, config.channels, input_capacity, output_capacity
        );
        Ok(Self {
            sample_rate: config.sample_rate,
            channels: config.channels,
            input_capacity,
            output_capacity,
            input_cursor: 0,
            output_len: 0,
            last_packet_duration: DEFAULT_LOSS_DURATION,
            soft_clip_mem: [0.0; 2],
            state: Some(DecoderState {
                handle,
                input,
                output,
            }),
        })
    }

    /// Default output capacity: a 120 ms frame of 16-bit samples.
    pub fn default_output_capacity(sample_rate: u32, channels: u8) -> usize {
        2 * max_frame_samples(sample_rate, channels)
    }

    pub fn input_capacity(&self) -> usize {
        self.input_capacity
    }

    pub fn output_capacity(&self) -> usize {
        self.output_capacity
    }

    /// Length of the staged packet; zero marks a lost packet.
    pub fn input_cursor(&self) -> usize {
        self.input_cursor
    }

    /// Bytes produced by the last decode call.
    pub fn output_len(&self) -> usize {
        self.output_len
    }

    fn state(&mut self) -> Result<&mut DecoderState> {
        self.state.as_mut().ok_or(Error::UseAfterDestroy)
    }

    /// Sets the staged packet length.
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

    /// Copies a packet into the input region and sets the cursor to its length.
    pub fn stage_packet(&mut self, packet: &[u8]) -> Result<()> {
        let input = &mut self.state()?.input;
        let capacity = input.capacity();
        if packet.len() > capacity {
            return Err(Error::PacketTooLarge {
                len: packet.len(),
                capacity,
            });
        }
        input.as_bytes_mut()[..packet.len()].copy_from_slice(packet);
        self.input_cursor = packet.len();
        Ok(())
    }

    /// Marks the current packet as lost.
    pub fn mark_lost(&mut self) -> Result<()> {
        self.set_input_cursor(0)
    }

    /// Bytes of the last decoded frame.
    pub fn output(&self) -> Result<&[u8]> {
        let state = self.state.as_ref().ok_or(Error::UseAfterDestroy)?;
        Ok(&state.output.as_bytes()[..self.output_len])
    }

    /// Decodes the staged packet into 16-bit samples.
    pub fn decode(&mut self, options: DecodeOptions) -> Result<&[i16]> {
        self.decode_as::<i16>(options, false)
    }

    /// Decodes the staged packet into float samples, optionally soft-clipping
    /// them in place.
    pub fn decode_float(&mut self, options: DecodeOptions, auto_soft_clip: bool) -> Result<&[f32]> {
        self.decode_as::<f32>(options, auto_soft_clip)
    }

    /// Decodes the staged packet into samples of type `S`.
    ///
    /// With a staged packet the whole output region is offered to the codec;
    /// with a lost packet (cursor zero) the codec produces
    /// `options.loss_duration`, or the last frame's duration, of audio.
    ///
    /// An FEC decode is the exception to the first rule: even though a packet
    /// is staged, the frame size is the loss duration rather than the output
    /// capacity, so only the gap before the staged packet is recovered.
    pub fn decode_as<S: Sample>(&mut self, options: DecodeOptions, soft_clip: bool) -> Result<&[S]> {
        let channels = self.channels as usize;
        let cursor = self.input_cursor;
        let frame_size = frame_size_hint(
            cursor > 0,
            &options,
            self.last_packet_duration,
            self.sample_rate,
            self.output_capacity / (channels * S::WIDTH),
        );
        let state = self.state.as_mut().ok_or(Error::UseAfterDestroy)?;

        let packet = (cursor > 0).then(|| &state.input.as_bytes()[..cursor]);
        let out = state.output.samples_mut::<S>();
        let n = state.handle.decode(
            packet,
            &mut out[..frame_size * channels],
            frame_size,
            options.forward_error_correction,
        )?;

        let pcm = &mut out[..n * channels];
        if soft_clip {
            S::soft_clip(pcm, channels, &mut self.soft_clip_mem);
        }
        self.output_len = pcm.len() * S::WIDTH;
        self.last_packet_duration = samples_to_duration(n, self.sample_rate);
        trace!(
            "opus: decoded {} bytes into {} {} samples (fec={})",
            cursor, n, S::FORMAT, options.forward_error_correction
        );
        Ok(pcm)
    }
}

impl CodecSession for BufferedDecoder {
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
            debug!("opus: buffered decoder destroyed");
        }
    }
}

impl PcmDecoder for BufferedDecoder {
    fn decode_packet<S: Sample>(
        &mut self,
        packet: Option<&[u8]>,
        options: DecodeOptions,
    ) -> Result<Vec<S>> {
        match packet {
            Some(p) => self.stage_packet(p)?,
            None => self.mark_lost()?,
        }
        Ok(self.decode_as::<S>(options, false)?.to_vec())
    }

    fn last_packet_duration(&self) -> Duration {
        self.last_packet_duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Application;
    use crate::ffi;
    use crate::session::{BufferedEncoder, PcmEncoder};
    use crate::frame_time::FrameTime;
    use crate::sample::samples_to_bytes;

    fn encode_frames(rate: u32, channels: u8, ft: FrameTime, count: usize, fec: bool) -> Vec<Vec<u8>> {
        let cfg = crate::config::EncoderConfig {
            inband_fec: fec,
            packet_loss_percent: fec.then_some(20),
            ..crate::config::EncoderConfig::new(rate, channels, Application::VoIP)
        };
        let mut enc = BufferedEncoder::with_config(&cfg).unwrap();
        let samples = ft.samples(rate, channels);
        (0..count)
            .map(|n| {
                let pcm: Vec<i16> = (0..samples)
                    .map(|i| (((n * samples + i) as f32 * 0.05).sin() * 8000.0) as i16)
                    .collect();
                enc.encode_pcm(&pcm).unwrap().into_inner()
            })
            .collect()
    }

    #[test]
    fn test_create_defaults() {
        let dec = BufferedDecoder::new(16000, 1).unwrap();
        assert_eq!(dec.input_capacity(), MAX_PACKET_SIZE);
        assert_eq!(dec.output_capacity(), 2 * 1920);
        assert_eq!(dec.last_packet_duration(), DEFAULT_LOSS_DURATION);
        assert_eq!(dec.input_cursor(), 0);
    }

    #[test]
    fn test_create_invalid() {
        assert!(matches!(
            BufferedDecoder::new(11025, 1),
            Err(Error::CodecInit { code: ffi::OPUS_BAD_ARG, .. })
        ));
        assert!(matches!(BufferedDecoder::new(96000, 1), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_decode_all_rates_and_frame_times() {
        for &rate in &[8000u32, 12000, 16000, 24000, 48000] {
            for &channels in &[1u8, 2] {
                let mut dec = BufferedDecoder::new(rate, channels).unwrap();
                for ft in FrameTime::ALL {
                    let packets = encode_frames(rate, channels, ft, 1, false);
                    dec.stage_packet(&packets[0]).unwrap();
                    let per_channel = ft.samples(rate, channels) / channels as usize;
                    let len = dec.decode(DecodeOptions::default()).unwrap().len();
                    assert_eq!(len, per_channel * channels as usize, "{rate}Hz {channels}ch {ft}");
                    assert_eq!(dec.output_len(), len * 2);
                    assert_eq!(dec.last_packet_duration(), ft.duration());
                }
            }
        }
    }

    #[test]
    fn test_decode_loss_uses_last_duration() {
        let packets = encode_frames(16000, 1, FrameTime::Duration10ms, 1, false);
        let mut dec = BufferedDecoder::new(16000, 1).unwrap();
        dec.stage_packet(&packets[0]).unwrap();
        assert_eq!(dec.decode(DecodeOptions::default()).unwrap().len(), 160);

        dec.mark_lost().unwrap();
        assert_eq!(dec.decode(DecodeOptions::default()).unwrap().len(), 160);

        let opts = DecodeOptions {
            forward_error_correction: false,
            loss_duration: Some(Duration::from_millis(40)),
        };
        assert_eq!(dec.decode(opts).unwrap().len(), 640);
        assert_eq!(dec.last_packet_duration(), Duration::from_millis(40));
    }

    #[test]
    fn test_decode_fec_recovery() {
        let packets = encode_frames(16000, 1, FrameTime::Duration20ms, 3, true);
        let mut dec = BufferedDecoder::new(16000, 1).unwrap();
        dec.stage_packet(&packets[0]).unwrap();
        dec.decode(DecodeOptions::default()).unwrap();

        // packets[1] lost: recover it from packets[2], then decode packets[2].
        dec.stage_packet(&packets[2]).unwrap();
        let recovered = dec.decode(DecodeOptions::fec(dec.last_packet_duration())).unwrap();
        assert_eq!(recovered.len(), 320);
        let current = dec.decode(DecodeOptions::default()).unwrap();
        assert_eq!(current.len(), 320);
    }

    #[test]
    fn test_decode_fec_uses_loss_duration() {
        let packets = encode_frames(16000, 1, FrameTime::Duration20ms, 2, true);
        let mut dec = BufferedDecoder::new(16000, 1).unwrap();
        assert_eq!(dec.output_capacity() / 2, 1920);
        dec.stage_packet(&packets[1]).unwrap();

        let fec = DecodeOptions::fec(Duration::from_millis(10));
        assert_eq!(dec.decode(fec).unwrap().len(), 160);
        assert_eq!(dec.last_packet_duration(), Duration::from_millis(10));

        // Without a loss duration the last frame's duration is recovered.
        let fec = DecodeOptions {
            forward_error_correction: true,
            loss_duration: None,
        };
        assert_eq!(dec.decode(fec).unwrap().len(), 160);
        assert_eq!(dec.decode(DecodeOptions::default()).unwrap().len(), 320);
    }

    #[test]
    fn test_decode_float_soft_clip() {
        let mut enc = BufferedEncoder::new(48000, 2, Application::Audio).unwrap();
        let loud: Vec<f32> = (0..960 * 2).map(|i| ((i as f32) * 0.02).sin() * 1.9).collect();
        let packet = enc.encode_pcm(&loud).unwrap();

        let cfg = DecoderConfig {
            output_capacity: Some(4 * 11520),
            ..DecoderConfig::new(48000, 2)
        };
        let mut dec = BufferedDecoder::with_config(&cfg).unwrap();
        dec.stage_packet(packet.as_bytes()).unwrap();
        let pcm = dec.decode_float(DecodeOptions::default(), true).unwrap();
        assert_eq!(pcm.len(), 960 * 2);
        assert!(pcm.iter().all(|s| (-1.0..=1.0).contains(s)));
        assert_eq!(dec.output_len(), 960 * 2 * 4);
    }

    #[test]
    fn test_float_with_default_capacity() {
        // The 16-bit default holds exactly 60 ms of 48 kHz stereo floats.
        let packets = encode_frames(48000, 2, FrameTime::Duration60ms, 1, false);
        let mut dec = BufferedDecoder::new(48000, 2).unwrap();
        dec.stage_packet(&packets[0]).unwrap();
        assert_eq!(dec.decode_float(DecodeOptions::default(), false).unwrap().len(), 5760);

        dec.mark_lost().unwrap();
        let opts = DecodeOptions {
            forward_error_correction: false,
            loss_duration: Some(Duration::from_millis(120)),
        };
        // Clamped to what the region holds: 60 ms of float samples.
        assert_eq!(dec.decode_float(opts, false).unwrap().len(), 2880 * 2);
    }

    #[test]
    fn test_stage_packet_too_large() {
        let cfg = DecoderConfig {
            input_capacity: Some(4),
            ..DecoderConfig::default()
        };
        let mut dec = BufferedDecoder::with_config(&cfg).unwrap();
        assert!(matches!(
            dec.stage_packet(&[0u8; 5]),
            Err(Error::PacketTooLarge { len: 5, capacity: 4 })
        ));
        assert!(dec.stage_packet(&[0x48, 0, 0, 0]).is_ok());
        assert_eq!(dec.input_cursor(), 4);
    }

    #[test]
    fn test_decode_invalid_packet() {
        let mut dec = BufferedDecoder::new(16000, 1).unwrap();
        // Code 3 packet without a frame count byte.
        dec.stage_packet(&[0x4B]).unwrap();
        assert!(matches!(
            dec.decode(DecodeOptions::default()),
            Err(Error::CodecRuntime { code: ffi::OPUS_INVALID_PACKET, .. })
        ));
        // The session stays usable.
        dec.mark_lost().unwrap();
        assert!(dec.decode(DecodeOptions::default()).is_ok());
    }

    #[test]
    fn test_decode_packet_trait() {
        let packets = encode_frames(24000, 1, FrameTime::Duration5ms, 1, false);
        let mut dec = BufferedDecoder::new(24000, 1).unwrap();
        let pcm: Vec<f32> = dec.decode_packet(Some(&packets[0]), DecodeOptions::default()).unwrap();
        assert_eq!(pcm.len(), 120);
        let concealed: Vec<i16> = dec.decode_packet(None, DecodeOptions::default()).unwrap();
        assert_eq!(concealed.len(), 120);
        assert_eq!(samples_to_bytes(&concealed).len(), 240);
    }

    #[test]
    fn test_use_after_destroy() {
        let mut dec = BufferedDecoder::new(16000, 1).unwrap();
        dec.destroy();
        dec.destroy();
        assert!(dec.is_destroyed());
        assert!(matches!(dec.decode(DecodeOptions::default()), Err(Error::UseAfterDestroy)));
        assert!(matches!(
            dec.decode_float(DecodeOptions::default(), true),
            Err(Error::UseAfterDestroy)
        ));
        assert!(matches!(dec.stage_packet(&[0x48]), Err(Error::UseAfterDestroy)));
        assert!(matches!(dec.mark_lost(), Err(Error::UseAfterDestroy)));
        assert!(matches!(dec.set_input_cursor(1), Err(Error::UseAfterDestroy)));
        assert!(matches!(dec.input_mut(), Err(Error::UseAfterDestroy)));
        assert!(matches!(dec.output(), Err(Error::UseAfterDestroy)));
    }
}
