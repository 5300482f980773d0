//! Decoding a packet stream with loss markers into PCM frames.

use std::marker::PhantomData;
use std::pin::pin;

use async_stream::try_stream;
use futures::{Stream, StreamExt};
use tracing::{debug, trace};

use crate::config::{DecodeOptions, StreamDecoderConfig};
use crate::error::Result;
use crate::sample::Sample;
use crate::session::{BufferedDecoder, CodecSession, PcmDecoder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LossState {
    None,
    Single,
    Multiple,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Idle,
    RecoverThenCurrent,
    Current,
}

/// Pull-based frame decoder over one packet stream.
///
/// Feed each element with [`push`](Self::push), where `None` (or an empty
/// packet) marks a lost packet, then drain the resulting frames with
/// [`next_frame`](Self::next_frame) until it returns `None`.
///
/// Without FEC a lost packet is concealed inside the codec and produces no
/// frame. With FEC a single lost packet is held back and recovered from the
/// redundancy of the following packet, which then yields two frames. A
/// second consecutive loss is concealed right away and nothing is recovered
/// for that gap.
///
/// Frames are views into the session's output region and are only valid
/// until the next call.
pub struct FrameDecoder<S: Sample> {
    session: BufferedDecoder,
    forward_error_correction: bool,
    auto_soft_clip: bool,
    loss: LossState,
    pending: Pending,
    _sample: PhantomData<S>,
}

impl<S: Sample> FrameDecoder<S> {
    pub fn new(config: &StreamDecoderConfig) -> Result<Self> {
        let session = BufferedDecoder::with_config(&config.decoder)?;
        debug!(
            "opus: frame decoder ready ({}, fec={}, soft_clip={})",
            S::FORMAT,
            config.forward_error_correction,
            config.auto_soft_clip
        );
        Ok(Self {
            session,
            forward_error_correction: config.forward_error_correction,
            auto_soft_clip: config.auto_soft_clip,
            loss: LossState::None,
            pending: Pending::Idle,
            _sample: PhantomData,
        })
    }

    /// Feeds the next packet, or a loss marker.
    ///
    /// Frames from a previous push that were not drained are dropped.
    pub fn push(&mut self, packet: Option<&[u8]>) -> Result<()> {
        self.pending = Pending::Idle;
        match packet.filter(|p| !p.is_empty()) {
            Some(packet) => {
                self.session.stage_packet(packet)?;
                self.pending = if self.forward_error_correction && self.loss == LossState::Single {
                    Pending::RecoverThenCurrent
                } else {
                    Pending::Current
                };
                self.loss = LossState::None;
                Ok(())
            }
            None => self.lost(),
        }
    }

    fn lost(&mut self) -> Result<()> {
        let previous = self.loss;
        self.loss = match previous {
            LossState::None => LossState::Single,
            LossState::Single | LossState::Multiple => LossState::Multiple,
        };
        if previous == LossState::None {
            if self.forward_error_correction {
                trace!("opus: packet lost, waiting for redundancy");
                return Ok(());
            }
        } else {
            debug!("opus: consecutive packets lost, concealing");
        }
        self.session.mark_lost()?;
        self.session
            .decode_as::<S>(DecodeOptions::default(), self.auto_soft_clip)?;
        Ok(())
    }

    /// Returns the next decoded frame of the last push, if any.
    pub fn next_frame(&mut self) -> Result<Option<&[S]>> {
        let options = match self.pending {
            Pending::Idle => return Ok(None),
            Pending::RecoverThenCurrent => {
                self.pending = Pending::Current;
                debug!("opus: recovering lost packet from redundancy");
                DecodeOptions::fec(self.session.last_packet_duration())
            }
            Pending::Current => {
                self.pending = Pending::Idle;
                DecodeOptions::default()
            }
        };
        self.session
            .decode_as::<S>(options, self.auto_soft_clip)
            .map(Some)
    }

    /// Releases the native decoder. Further calls fail with `UseAfterDestroy`.
    pub fn close(&mut self) {
        self.session.destroy();
    }

    pub fn is_closed(&self) -> bool {
        self.session.is_destroyed()
    }
}

/// Blocking adapter decoding an iterator of packets (`None` for a loss) into
/// owned frames.
///
/// Terminates after the first error. The session is released when the input
/// ends, on error, or when the iterator is dropped.
pub struct DecodeIter<S: Sample, I> {
    decoder: Option<FrameDecoder<S>>,
    input: I,
}

impl<S, I, P> DecodeIter<S, I>
where
    S: Sample,
    I: Iterator<Item = Option<P>>,
    P: AsRef<[u8]>,
{
    pub fn new(input: I, config: &StreamDecoderConfig) -> Result<Self> {
        Ok(Self {
            decoder: Some(FrameDecoder::new(config)?),
            input,
        })
    }
}

impl<S, I, P> Iterator for DecodeIter<S, I>
where
    S: Sample,
    I: Iterator<Item = Option<P>>,
    P: AsRef<[u8]>,
{
    type Item = Result<Vec<S>>;

    fn next(&mut self) -> Option<Self::Item> {
        let decoder = self.decoder.as_mut()?;
        loop {
            match decoder.next_frame().map(|f| f.map(<[S]>::to_vec)) {
                Ok(Some(frame)) => return Some(Ok(frame)),
                Ok(None) => {}
                Err(e) => {
                    self.decoder = None;
                    return Some(Err(e));
                }
            }

            let Some(packet) = self.input.next() else {
                self.decoder = None;
                return None;
            };
            if let Err(e) = decoder.push(packet.as_ref().map(|p| p.as_ref())) {
                self.decoder = None;
                return Some(Err(e));
            }
        }
    }
}

/// Decodes a stream of packets (`None` for a loss) into a stream of frames.
///
/// The returned stream ends with the first error. Dropping it drops `input`
/// and releases the native decoder.
pub fn decode_stream<S, St, P>(
    input: St,
    config: StreamDecoderConfig,
) -> impl Stream<Item = Result<Vec<S>>>
where
    S: Sample,
    St: Stream<Item = Option<P>>,
    P: AsRef<[u8]>,
{
    try_stream! {
        let mut decoder = FrameDecoder::<S>::new(&config)?;
        let mut input = pin!(input);

        while let Some(packet) = input.next().await {
            decoder.push(packet.as_ref().map(|p| p.as_ref()))?;
            loop {
                let frame = match decoder.next_frame()? {
                    Some(f) => f.to_vec(),
                    None => break,
                };
                yield frame;
            }
        }
        decoder.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Application, DecoderConfig, EncoderConfig};
    use crate::error::Error;
    use crate::session::{BufferedEncoder, PcmEncoder};
    use crate::stream::testutil::{DropFlagged, is_set};
    use futures::stream;

    fn encode(rate: u32, channels: u8, samples: usize, count: usize) -> Vec<Vec<u8>> {
        let cfg = EncoderConfig {
            inband_fec: true,
            packet_loss_percent: Some(20),
            ..EncoderConfig::new(rate, channels, Application::VoIP)
        };
        let mut enc = BufferedEncoder::with_config(&cfg).unwrap();
        (0..count)
            .map(|n| {
                let pcm: Vec<i16> = (0..samples)
                    .map(|i| (((n * samples + i) as f32 * 0.03).sin() * 9000.0) as i16)
                    .collect();
                enc.encode_pcm(&pcm).unwrap().into_inner()
            })
            .collect()
    }

    fn config(fec: bool) -> StreamDecoderConfig {
        StreamDecoderConfig::new(DecoderConfig::new(16000, 1)).with_forward_error_correction(fec)
    }

    fn drain<S: Sample>(dec: &mut FrameDecoder<S>) -> Vec<Vec<S>> {
        let mut frames = Vec::new();
        while let Some(frame) = dec.next_frame().unwrap() {
            frames.push(frame.to_vec());
        }
        frames
    }

    #[test]
    fn test_one_frame_per_packet() {
        let packets = encode(16000, 1, 320, 3);
        let mut dec = FrameDecoder::<i16>::new(&config(false)).unwrap();
        for packet in &packets {
            dec.push(Some(packet.as_slice())).unwrap();
            let frames = drain(&mut dec);
            assert_eq!(frames.len(), 1);
            assert_eq!(frames[0].len(), 320);
        }
    }

    #[test]
    fn test_loss_without_fec() {
        let packets = encode(16000, 1, 320, 2);
        let mut dec = FrameDecoder::<i16>::new(&config(false)).unwrap();
        dec.push(Some(&packets[0][..])).unwrap();
        assert_eq!(drain(&mut dec).len(), 1);
        dec.push(None).unwrap();
        assert!(drain(&mut dec).is_empty());
        dec.push(Some(&[0u8; 0][..])).unwrap();
        assert!(drain(&mut dec).is_empty());
        dec.push(Some(&packets[1][..])).unwrap();
        assert_eq!(drain(&mut dec).len(), 1);
    }

    #[test]
    fn test_single_loss_recovered_with_fec() {
        let packets = encode(16000, 1, 320, 3);
        let mut dec = FrameDecoder::<i16>::new(&config(true)).unwrap();
        dec.push(Some(&packets[0][..])).unwrap();
        assert_eq!(drain(&mut dec).len(), 1);
        dec.push(None).unwrap();
        assert!(drain(&mut dec).is_empty());
        dec.push(Some(&packets[2][..])).unwrap();
        let frames = drain(&mut dec);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].len(), 320);
        assert_eq!(frames[1].len(), 320);
    }

    #[test]
    fn test_double_loss_not_recovered() {
        let packets = encode(16000, 1, 320, 4);
        let mut dec = FrameDecoder::<i16>::new(&config(true)).unwrap();
        dec.push(Some(&packets[0][..])).unwrap();
        assert_eq!(drain(&mut dec).len(), 1);
        dec.push(None).unwrap();
        dec.push(None).unwrap();
        assert!(drain(&mut dec).is_empty());
        dec.push(Some(&packets[3][..])).unwrap();
        assert_eq!(drain(&mut dec).len(), 1);
    }

    #[test]
    fn test_loss_before_first_packet() {
        let packets = encode(16000, 1, 320, 1);
        let mut dec = FrameDecoder::<f32>::new(&config(true).with_auto_soft_clip(true)).unwrap();
        dec.push(None).unwrap();
        dec.push(Some(&packets[0][..])).unwrap();
        let frames = drain(&mut dec);
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().flatten().all(|s| (-1.0..=1.0).contains(s)));
    }

    #[test]
    fn test_loss_state_counts_consecutive_losses() {
        let packets = encode(16000, 1, 320, 2);
        for fec in [false, true] {
            let mut dec = FrameDecoder::<i16>::new(&config(fec)).unwrap();
            dec.push(Some(&packets[0][..])).unwrap();
            drain(&mut dec);
            assert_eq!(dec.loss, LossState::None);
            dec.push(None).unwrap();
            assert_eq!(dec.loss, LossState::Single);
            dec.push(Some(&packets[1][..])).unwrap();
            drain(&mut dec);
            assert_eq!(dec.loss, LossState::None);
            dec.push(None).unwrap();
            assert_eq!(dec.loss, LossState::Single, "fec={fec}");
            dec.push(None).unwrap();
            assert_eq!(dec.loss, LossState::Multiple);
            dec.push(None).unwrap();
            assert_eq!(dec.loss, LossState::Multiple);
        }
    }

    #[test]
    fn test_oversized_packet() {
        let cfg = StreamDecoderConfig::new(DecoderConfig {
            input_capacity: Some(4),
            ..DecoderConfig::new(16000, 1)
        });
        let mut dec = FrameDecoder::<i16>::new(&cfg).unwrap();
        assert!(matches!(
            dec.push(Some(&[0u8; 5][..])),
            Err(Error::PacketTooLarge { len: 5, capacity: 4 })
        ));
    }

    #[test]
    fn test_close() {
        let mut dec = FrameDecoder::<i16>::new(&config(false)).unwrap();
        dec.close();
        assert!(dec.is_closed());
        assert!(matches!(dec.push(Some(&[0x08][..])), Err(Error::UseAfterDestroy)));
    }

    #[test]
    fn test_iter() {
        let packets = encode(16000, 1, 320, 5);
        let input = vec![
            Some(packets[0].clone()),
            None,
            Some(packets[2].clone()),
            None,
            None,
            Some(packets[4].clone()),
        ];

        let frames: Vec<Vec<i16>> = DecodeIter::<i16, _>::new(input.clone().into_iter(), &config(true))
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(frames.len(), 4);

        let frames: Vec<Vec<i16>> = DecodeIter::<i16, _>::new(input.into_iter(), &config(false))
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(frames.len(), 3);
    }

    #[test]
    fn test_iter_stops_on_error() {
        let input = vec![Some(vec![0xff, 0xff, 0xff]), Some(vec![0x08])];
        let mut iter = DecodeIter::<i16, _>::new(input.into_iter(), &config(false)).unwrap();
        assert!(matches!(iter.next(), Some(Err(Error::CodecRuntime { .. }))));
        assert!(iter.next().is_none());
    }

    #[tokio::test]
    async fn test_stream_with_fec() {
        let packets = encode(16000, 1, 320, 3);
        let input = stream::iter(vec![Some(packets[0].clone()), None, Some(packets[2].clone())]);
        let frames: Vec<Result<Vec<i16>>> = decode_stream::<i16, _, _>(input, config(true)).collect().await;
        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| f.as_ref().is_ok_and(|f| f.len() == 320)));
    }

    #[tokio::test]
    async fn test_stream_without_fec() {
        let packets = encode(16000, 1, 320, 3);
        let input = stream::iter(vec![Some(packets[0].clone()), None, Some(packets[2].clone())]);
        let frames: Vec<Result<Vec<f32>>> = decode_stream::<f32, _, _>(input, config(false)).collect().await;
        assert_eq!(frames.len(), 2);
    }

    #[tokio::test]
    async fn test_stream_config_error() {
        let input = stream::iter(vec![Some(vec![0x08u8])]);
        let cfg = StreamDecoderConfig::new(DecoderConfig::new(16000, 3));
        let frames: Vec<Result<Vec<i16>>> = decode_stream::<i16, _, _>(input, cfg).collect().await;
        assert_eq!(frames.len(), 1);
        assert!(matches!(frames[0], Err(Error::Configuration(_))));
    }

    #[tokio::test]
    async fn test_stream_drop_releases_input() {
        let packets = encode(16000, 1, 320, 1);
        let (input, dropped) =
            DropFlagged::new(stream::iter((0..100).map(move |_| Some(packets[0].clone()))));
        let mut out = Box::pin(decode_stream::<i16, _, _>(input, config(false)));
        assert_eq!(out.next().await.unwrap().unwrap().len(), 320);
        assert!(!is_set(&dropped));
        drop(out);
        assert!(is_set(&dropped));
    }

    #[tokio::test]
    async fn test_stream_error_releases_input() {
        let (input, dropped) = DropFlagged::new(stream::iter(vec![
            Some(vec![0xffu8, 0xff, 0xff]),
            Some(vec![0x08]),
        ]));
        let mut out = Box::pin(decode_stream::<i16, _, _>(input, config(false)));
        assert!(matches!(out.next().await, Some(Err(Error::CodecRuntime { .. }))));
        assert!(out.next().await.is_none());
        assert!(is_set(&dropped));
    }

    #[test]
    fn test_iter_drop_releases_input() {
        let packets = encode(16000, 1, 320, 1);
        let (input, dropped) = DropFlagged::new((0..100).map(move |_| Some(packets[0].clone())));
        let mut iter = DecodeIter::<i16, _>::new(input, &config(true)).unwrap();
        assert!(iter.next().unwrap().is_ok());
        assert!(!is_set(&dropped));
        drop(iter);
        assert!(is_set(&dropped));
    }
}
