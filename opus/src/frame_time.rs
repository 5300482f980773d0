//! Frame durations accepted by the encoder and buffer sizing helpers.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Largest number of bytes a single packet can occupy for any valid
/// encoder configuration.
pub const MAX_PACKET_SIZE: usize = 3 * 1275;

/// Longest frame duration the decoder can produce (120 ms).
pub const MAX_FRAME_DURATION_MS: usize = 120;

/// Duration of audio consumed by one encode call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub enum FrameTime {
    Duration2500us,
    Duration5ms,
    Duration10ms,
    Duration20ms,
    Duration40ms,
    Duration60ms,
}

impl FrameTime {
    /// All supported frame times, shortest first.
    pub const ALL: [FrameTime; 6] = [
        Self::Duration2500us,
        Self::Duration5ms,
        Self::Duration10ms,
        Self::Duration20ms,
        Self::Duration40ms,
        Self::Duration60ms,
    ];

    /// Returns the duration in microseconds.
    pub fn micros(&self) -> usize {
        match self {
            Self::Duration2500us => 2500,
            Self::Duration5ms => 5000,
            Self::Duration10ms => 10_000,
            Self::Duration20ms => 20_000,
            Self::Duration40ms => 40_000,
            Self::Duration60ms => 60_000,
        }
    }

    /// Returns the duration in (possibly fractional) milliseconds.
    pub fn millis(&self) -> f64 {
        self.micros() as f64 / 1000.0
    }

    /// Returns the duration as a Duration.
    pub fn duration(&self) -> Duration {
        Duration::from_micros(self.micros() as u64)
    }

    /// Parses a frame time from milliseconds.
    pub fn from_millis(ms: f64) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|ft| ft.millis() == ms)
            .ok_or_else(|| Error::config(format!("unsupported frame time {ms}ms")))
    }

    /// Returns the number of interleaved samples in one frame.
    pub fn samples(&self, sample_rate: u32, channels: u8) -> usize {
        samples_per_ms(sample_rate, channels) * self.micros() / 1000
    }

    /// Returns the number of bytes of one frame for a sample width.
    pub fn frame_bytes(&self, sample_rate: u32, channels: u8, sample_width: usize) -> usize {
        sample_width * self.samples(sample_rate, channels)
    }
}

impl TryFrom<f64> for FrameTime {
    type Error = Error;

    fn try_from(ms: f64) -> Result<Self> {
        Self::from_millis(ms)
    }
}

impl From<FrameTime> for f64 {
    fn from(ft: FrameTime) -> f64 {
        ft.millis()
    }
}

impl Default for FrameTime {
    fn default() -> Self {
        Self::Duration20ms
    }
}

impl fmt::Display for FrameTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Duration2500us => write!(f, "2.5ms"),
            Self::Duration5ms => write!(f, "5ms"),
            Self::Duration10ms => write!(f, "10ms"),
            Self::Duration20ms => write!(f, "20ms"),
            Self::Duration40ms => write!(f, "40ms"),
            Self::Duration60ms => write!(f, "60ms"),
        }
    }
}

/// Interleaved samples per millisecond (integer floor).
pub fn samples_per_ms(sample_rate: u32, channels: u8) -> usize {
    (channels as usize * sample_rate as usize) / 1000
}

/// Interleaved samples of the longest decodable frame.
pub(crate) fn max_frame_samples(sample_rate: u32, channels: u8) -> usize {
    (sample_rate as usize * channels as usize * MAX_FRAME_DURATION_MS).div_ceil(1000)
}

/// Samples per channel covering `duration` at `sample_rate`.
pub(crate) fn duration_to_samples(duration: Duration, sample_rate: u32) -> usize {
    (duration.as_micros() * sample_rate as u128 / 1_000_000) as usize
}

/// Duration of `samples` samples per channel at `sample_rate`.
pub(crate) fn samples_to_duration(samples: usize, sample_rate: u32) -> Duration {
    Duration::from_micros((samples as u64 * 1_000_000) / sample_rate as u64)
}
