//! Session and stream adapter configuration.
//!
//! All config types implement `Default` and serde, so applications can load
//! them from JSON or YAML next to their own settings.

use std::os::raw::c_int;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ffi;
use crate::frame_time::FrameTime;

/// Opus application type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Application {
    /// Best quality for voice signals.
    #[default]
    #[serde(rename = "voip")]
    VoIP,
    /// Best quality for non-voice signals.
    Audio,
    /// Minimum possible coding delay.
    RestrictedLowdelay,
}

impl Application {
    pub(crate) fn to_ffi(self) -> c_int {
        match self {
            Self::VoIP => ffi::OPUS_APPLICATION_VOIP,
            Self::Audio => ffi::OPUS_APPLICATION_AUDIO,
            Self::RestrictedLowdelay => ffi::OPUS_APPLICATION_RESTRICTED_LOWDELAY,
        }
    }
}

pub(crate) fn validate_format(sample_rate: u32, channels: u8) -> Result<()> {
    if !(8000..=48000).contains(&sample_rate) {
        return Err(Error::config(format!(
            "sample rate {sample_rate} outside [8000, 48000]"
        )));
    }
    if !matches!(channels, 1 | 2) {
        return Err(Error::config(format!("unsupported channel count {channels}")));
    }
    Ok(())
}

pub(crate) fn validate_capacity(name: &str, capacity: Option<usize>) -> Result<()> {
    if capacity == Some(0) {
        return Err(Error::config(format!("{name} capacity must be positive")));
    }
    Ok(())
}

/// Encoder session configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    pub sample_rate: u32,
    pub channels: u8,
    pub application: Application,
    /// Input region size in bytes. Defaults to the float-width worst case
    /// of a 120 ms frame.
    pub input_capacity: Option<usize>,
    /// Output region size in bytes. Defaults to the maximum packet size.
    pub output_capacity: Option<usize>,
    /// Target bitrate in bits per second.
    pub bitrate: Option<i32>,
    /// Complexity (0-10).
    pub complexity: Option<i32>,
    /// Embed redundancy the decoder can use to recover one lost packet.
    pub inband_fec: bool,
    /// Expected packet loss in percent (0-100).
    pub packet_loss_percent: Option<i32>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            application: Application::VoIP,
            input_capacity: None,
            output_capacity: None,
            bitrate: None,
            complexity: None,
            inband_fec: false,
            packet_loss_percent: None,
        }
    }
}

impl EncoderConfig {
    /// Creates a config with the given format and defaults elsewhere.
    pub fn new(sample_rate: u32, channels: u8, application: Application) -> Self {
        Self {
            sample_rate,
            channels,
            application,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_format(self.sample_rate, self.channels)?;
        validate_capacity("input", self.input_capacity)?;
        validate_capacity("output", self.output_capacity)
    }
}

/// Decoder session configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    pub sample_rate: u32,
    pub channels: u8,
    /// Input region size in bytes. Defaults to the maximum packet size.
    pub input_capacity: Option<usize>,
    /// Output region size in bytes. Defaults to a 120 ms frame of 16-bit
    /// samples; float decoding of long frames needs an explicit, larger value.
    pub output_capacity: Option<usize>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            input_capacity: None,
            output_capacity: None,
        }
    }
}

impl DecoderConfig {
    /// Creates a config with the given format and default capacities.
    pub fn new(sample_rate: u32, channels: u8) -> Self {
        Self {
            sample_rate,
            channels,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_format(self.sample_rate, self.channels)?;
        validate_capacity("input", self.input_capacity)?;
        validate_capacity("output", self.output_capacity)
    }
}

/// Per-call decode options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecodeOptions {
    /// Decode the in-band redundancy of the staged packet to recover the
    /// preceding lost frame.
    pub forward_error_correction: bool,
    /// Duration of the lost audio. Defaults to the last decoded frame's
    /// duration.
    pub loss_duration: Option<Duration>,
}

impl DecodeOptions {
    /// Options for a recovery decode covering `loss_duration`.
    pub fn fec(loss_duration: Duration) -> Self {
        Self {
            forward_error_correction: true,
            loss_duration: Some(loss_duration),
        }
    }
}

/// Stream encoder adapter configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamEncoderConfig {
    /// Session settings. The input capacity is always derived from
    /// `frame_time` and overrides `encoder.input_capacity`.
    #[serde(flatten)]
    pub encoder: EncoderConfig,
    pub frame_time: FrameTime,
    /// Zero-pad a trailing partial frame instead of failing.
    pub fill_up_last_frame: bool,
}

impl StreamEncoderConfig {
    pub fn new(encoder: EncoderConfig, frame_time: FrameTime) -> Self {
        Self {
            encoder,
            frame_time,
            fill_up_last_frame: false,
        }
    }

    pub fn with_fill_up_last_frame(mut self, fill: bool) -> Self {
        self.fill_up_last_frame = fill;
        self
    }
}

/// Stream decoder adapter configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamDecoderConfig {
    #[serde(flatten)]
    pub decoder: DecoderConfig,
    /// Recover a single lost packet from the next packet's redundancy.
    pub forward_error_correction: bool,
    /// Soft-clip decoded float frames. Ignored for integer output.
    pub auto_soft_clip: bool,
}

impl StreamDecoderConfig {
    pub fn new(decoder: DecoderConfig) -> Self {
        Self {
            decoder,
            ..Self::default()
        }
    }

    pub fn with_forward_error_correction(mut self, fec: bool) -> Self {
        self.forward_error_correction = fec;
        self
    }

    pub fn with_auto_soft_clip(mut self, clip: bool) -> Self {
        self.auto_soft_clip = clip;
        self
    }
}
