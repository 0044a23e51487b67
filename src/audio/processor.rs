//! `OpusTranscoder`: source → demux → decode → stereo → resample → Opus.
//!
//! The loader only sees the [`EncoderFactory`] / [`FrameEncoder`] pair, so
//! tests can swap in a synthetic encoder and the real transcoder stays a
//! plain blocking iterator over frames.

use symphonia::core::{audio::SampleBuffer, codecs::Decoder, errors::Error, formats::FormatReader};
use tracing::{debug, info, warn};

use crate::{
    audio::{
        codec::OpusFrameEncoder,
        constants::{FRAME_SIZE_SAMPLES, OUTPUT_CHANNELS, TARGET_SAMPLE_RATE},
        demux::open_format,
        frame::EncodedFrame,
        resample::{Resampler, to_stereo},
    },
    common::errors::{PlaybackError, PlaybackResult},
    configs::EncoderConfig,
    sources::AudioStream,
};

/// Pull-based producer of encoded frames for one track.
///
/// `next_frame` may block on I/O or CPU work; callers run it on a blocking
/// thread. `Ok(None)` means end of stream.
pub trait FrameEncoder: Send {
    fn next_frame(&mut self) -> PlaybackResult<Option<EncodedFrame>>;
}

/// Builds a [`FrameEncoder`] for a freshly downloaded stream.
pub trait EncoderFactory: Send + Sync {
    fn open(&self, stream: AudioStream) -> PlaybackResult<Box<dyn FrameEncoder>>;
}

/// Factory for the fixed 48 kHz stereo Opus profile.
#[derive(Debug, Clone, Default)]
pub struct OpusTranscoderFactory {
    config: EncoderConfig,
}

impl OpusTranscoderFactory {
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }
}

impl EncoderFactory for OpusTranscoderFactory {
    fn open(&self, stream: AudioStream) -> PlaybackResult<Box<dyn FrameEncoder>> {
        Ok(Box::new(OpusTranscoder::open(stream, &self.config)?))
    }
}

pub struct OpusTranscoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    resampler: Resampler,
    encoder: OpusFrameEncoder,
    sample_buf: Option<SampleBuffer<i16>>,
    stereo: Vec<i16>,
    /// Resampled PCM not yet encoded.
    pending: Vec<i16>,
    eof: bool,
}

impl OpusTranscoder {
    pub fn open(stream: AudioStream, config: &EncoderConfig) -> PlaybackResult<Self> {
        let opened = open_format(stream.source, Some(stream.format))
            .map_err(|e| PlaybackError::EncodeFailed(format!("probe: {e}")))?;

        info!(
            "opened stream: {}Hz {}ch -> {}Hz",
            opened.sample_rate, opened.channels, TARGET_SAMPLE_RATE
        );

        let encoder = OpusFrameEncoder::new(config)
            .map_err(|e| PlaybackError::EncodeFailed(format!("opus init: {e}")))?;

        Ok(Self {
            format: opened.format,
            decoder: opened.decoder,
            track_id: opened.track_id,
            resampler: Resampler::new(
                config.resampler,
                opened.sample_rate,
                TARGET_SAMPLE_RATE,
                OUTPUT_CHANNELS,
            ),
            encoder,
            sample_buf: None,
            stereo: Vec::new(),
            pending: Vec::with_capacity(FRAME_SIZE_SAMPLES * 4),
            eof: false,
        })
    }

    /// Decode one packet into `pending`. Returns `false` at end of stream.
    fn decode_packet(&mut self) -> PlaybackResult<bool> {
        let packet = match self.format.next_packet() {
            Ok(p) => p,
            Err(Error::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(false);
            }
            Err(e) => return Err(PlaybackError::EncodeFailed(format!("read: {e}"))),
        };

        if packet.track_id() != self.track_id {
            return Ok(true);
        }

        match self.decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                let mut buf = match self.sample_buf.take() {
                    Some(buf) if buf.capacity() >= decoded.capacity() * spec.channels.count() => buf,
                    _ => SampleBuffer::<i16>::new(decoded.capacity() as u64, spec),
                };
                buf.copy_interleaved_ref(decoded);

                self.stereo.clear();
                to_stereo(buf.samples(), spec.channels.count(), &mut self.stereo);
                self.resampler.process(&self.stereo, &mut self.pending);

                self.sample_buf = Some(buf);
                Ok(true)
            }
            Err(Error::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
            Err(Error::DecodeError(e)) => {
                warn!("decode error (recoverable): {e}");
                Ok(true)
            }
            Err(e) => Err(PlaybackError::EncodeFailed(format!("decode: {e}"))),
        }
    }
}

impl FrameEncoder for OpusTranscoder {
    fn next_frame(&mut self) -> PlaybackResult<Option<EncodedFrame>> {
        while !self.eof && self.pending.len() < FRAME_SIZE_SAMPLES {
            if !self.decode_packet()? {
                debug!("transcode reached end of stream");
                self.eof = true;
            }
        }

        if self.pending.is_empty() {
            return Ok(None);
        }
        if self.pending.len() < FRAME_SIZE_SAMPLES {
            // Pad the tail so the last frame is still a full 20 ms.
            self.pending.resize(FRAME_SIZE_SAMPLES, 0);
        }

        let packet = self
            .encoder
            .encode(&self.pending[..FRAME_SIZE_SAMPLES])
            .map_err(|e| PlaybackError::EncodeFailed(format!("opus: {e}")))?;
        let frame = EncodedFrame::new(bytes::Bytes::copy_from_slice(packet));
        self.pending.drain(..FRAME_SIZE_SAMPLES);
        Ok(Some(frame))
    }
}
