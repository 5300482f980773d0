//! Compressed packets and native packet introspection.
//!
//! Packets are opaque to this crate; everything reported here comes from the
//! libopus packet queries.

use std::fmt;
use std::os::raw::c_int;
use std::time::Duration;

use crate::error::{Error, Result, check};
use crate::ffi;
use crate::frame_time::samples_to_duration;

/// Audio bandwidth of a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bandwidth {
    /// Narrowband (4 kHz audio, 8 kHz sample rate)
    NB,
    /// Medium-band (6 kHz audio, 12 kHz sample rate)
    MB,
    /// Wideband (8 kHz audio, 16 kHz sample rate)
    WB,
    /// Super-wideband (12 kHz audio, 24 kHz sample rate)
    SWB,
    /// Fullband (20 kHz audio, 48 kHz sample rate)
    FB,
}

impl Bandwidth {
    fn from_ffi(value: c_int) -> Result<Self> {
        match value {
            ffi::OPUS_BANDWIDTH_NARROWBAND => Ok(Self::NB),
            ffi::OPUS_BANDWIDTH_MEDIUMBAND => Ok(Self::MB),
            ffi::OPUS_BANDWIDTH_WIDEBAND => Ok(Self::WB),
            ffi::OPUS_BANDWIDTH_SUPERWIDEBAND => Ok(Self::SWB),
            ffi::OPUS_BANDWIDTH_FULLBAND => Ok(Self::FB),
            code if code < 0 => Err(Error::runtime(code)),
            _ => Err(Error::runtime(ffi::OPUS_INVALID_PACKET)),
        }
    }

    /// Returns the effective sample rate for this bandwidth.
    pub fn sample_rate(&self) -> u32 {
        match self {
            Self::NB => 8000,
            Self::MB => 12000,
            Self::WB => 16000,
            Self::SWB => 24000,
            Self::FB => 48000,
        }
    }
}

impl fmt::Display for Bandwidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NB => write!(f, "NB"),
            Self::MB => write!(f, "MB"),
            Self::WB => write!(f, "WB"),
            Self::SWB => write!(f, "SWB"),
            Self::FB => write!(f, "FB"),
        }
    }
}

fn non_empty(data: &[u8]) -> Result<()> {
    if data.is_empty() {
        return Err(Error::runtime(ffi::OPUS_BAD_ARG));
    }
    Ok(())
}

/// Returns the total number of samples per channel in a packet.
pub fn samples(data: &[u8], sample_rate: u32) -> Result<usize> {
    non_empty(data)?;
    check(unsafe {
        ffi::opus_packet_get_nb_samples(data.as_ptr(), data.len() as i32, sample_rate as i32)
    })
}

/// Returns the number of frames in a packet.
pub fn frames(data: &[u8]) -> Result<usize> {
    non_empty(data)?;
    check(unsafe { ffi::opus_packet_get_nb_frames(data.as_ptr(), data.len() as i32) })
}

/// Returns the number of samples per channel of each frame in a packet.
pub fn samples_per_frame(data: &[u8], sample_rate: u32) -> Result<usize> {
    non_empty(data)?;
    check(unsafe { ffi::opus_packet_get_samples_per_frame(data.as_ptr(), sample_rate as i32) })
}

/// Returns the number of channels coded in a packet.
pub fn channels(data: &[u8]) -> Result<usize> {
    non_empty(data)?;
    check(unsafe { ffi::opus_packet_get_nb_channels(data.as_ptr()) })
}

/// Returns the bandwidth of a packet.
pub fn bandwidth(data: &[u8]) -> Result<Bandwidth> {
    non_empty(data)?;
    Bandwidth::from_ffi(unsafe { ffi::opus_packet_get_bandwidth(data.as_ptr()) })
}

/// Owned compressed packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet(pub Vec<u8>);

impl Packet {
    /// Creates a new packet from bytes.
    pub fn new(data: Vec<u8>) -> Self {
        Self(data)
    }

    /// Creates a packet from a byte slice.
    pub fn from_slice(data: &[u8]) -> Self {
        Self(data.to_vec())
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the packet is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of samples per channel at `sample_rate`.
    pub fn samples(&self, sample_rate: u32) -> Result<usize> {
        samples(&self.0, sample_rate)
    }

    /// Returns the number of frames.
    pub fn frames(&self) -> Result<usize> {
        frames(&self.0)
    }

    /// Returns the number of samples per channel of each frame.
    pub fn samples_per_frame(&self, sample_rate: u32) -> Result<usize> {
        samples_per_frame(&self.0, sample_rate)
    }

    /// Returns the number of coded channels.
    pub fn channels(&self) -> Result<usize> {
        channels(&self.0)
    }

    /// Returns the coded bandwidth.
    pub fn bandwidth(&self) -> Result<Bandwidth> {
        bandwidth(&self.0)
    }

    /// Returns the total duration of audio in this packet.
    pub fn duration(&self) -> Result<Duration> {
        // 48 kHz is exact for every frame size the codec produces.
        Ok(samples_to_duration(self.samples(48000)?, 48000))
    }

    /// Consumes the packet, returning the bytes.
    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

impl AsRef<[u8]> for Packet {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Packet {
    fn from(data: Vec<u8>) -> Self {
        Self(data)
    }
}

impl From<&[u8]> for Packet {
    fn from(data: &[u8]) -> Self {
        Self(data.to_vec())
    }
}

impl From<Packet> for Vec<u8> {
    fn from(packet: Packet) -> Self {
        packet.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // TOC byte 0x48 = config 9 (SILK WB 20ms), mono, one frame
    const SILK_WB_20MS: [u8; 3] = [0x48, 0x00, 0x00];
    // TOC byte 0xfc = config 31 (CELT FB 20ms), stereo, one frame
    const CELT_FB_20MS_STEREO: [u8; 3] = [0xfc, 0xff, 0xfe];

    #[test]
    fn test_samples() {
        assert_eq!(samples(&SILK_WB_20MS, 16000).unwrap(), 320);
        assert_eq!(samples(&SILK_WB_20MS, 48000).unwrap(), 960);
        assert_eq!(samples_per_frame(&SILK_WB_20MS, 8000).unwrap(), 160);
    }

    #[test]
    fn test_frames() {
        assert_eq!(frames(&SILK_WB_20MS).unwrap(), 1);
        // Code 1: two equal frames
        assert_eq!(frames(&[0x49, 0x00, 0x00]).unwrap(), 2);
        // Code 3: frame count in the second byte
        assert_eq!(frames(&[0x4B, 0x03]).unwrap(), 3);
    }

    #[test]
    fn test_frames_invalid() {
        // Code 3 without the frame count byte
        assert!(matches!(
            frames(&[0x4B]),
            Err(Error::CodecRuntime { code: ffi::OPUS_INVALID_PACKET, .. })
        ));
    }

    #[test]
    fn test_channels() {
        assert_eq!(channels(&SILK_WB_20MS).unwrap(), 1);
        assert_eq!(channels(&CELT_FB_20MS_STEREO).unwrap(), 2);
    }

    #[test]
    fn test_bandwidth() {
        assert_eq!(bandwidth(&SILK_WB_20MS).unwrap(), Bandwidth::WB);
        assert_eq!(bandwidth(&CELT_FB_20MS_STEREO).unwrap(), Bandwidth::FB);
        assert_eq!(Bandwidth::WB.sample_rate(), 16000);
        assert_eq!(Bandwidth::SWB.to_string(), "SWB");
    }

    #[test]
    fn test_empty_rejected() {
        assert!(matches!(
            samples(&[], 16000),
            Err(Error::CodecRuntime { code: ffi::OPUS_BAD_ARG, .. })
        ));
        assert!(frames(&[]).is_err());
        assert!(channels(&[]).is_err());
        assert!(bandwidth(&[]).is_err());
        assert!(samples_per_frame(&[], 16000).is_err());
    }

    #[test]
    fn test_packet_methods() {
        let packet = Packet::from_slice(&SILK_WB_20MS);
        assert_eq!(packet.len(), 3);
        assert!(!packet.is_empty());
        assert_eq!(packet.as_bytes(), &SILK_WB_20MS);
        assert_eq!(packet.samples(16000).unwrap(), 320);
        assert_eq!(packet.frames().unwrap(), 1);
        assert_eq!(packet.channels().unwrap(), 1);
        assert_eq!(packet.bandwidth().unwrap(), Bandwidth::WB);
        assert_eq!(packet.duration().unwrap(), Duration::from_millis(20));
    }

    #[test]
    fn test_packet_conversions() {
        let data = vec![0x48, 0x01, 0x02];
        let packet: Packet = data.clone().into();
        assert_eq!(packet.as_ref(), &data[..]);
        let back: Vec<u8> = packet.clone().into();
        assert_eq!(back, data);
        assert_eq!(packet.into_inner(), data);
        let packet: Packet = data.as_slice().into();
        assert_eq!(packet, Packet::new(data));
    }
}
