//! Demux layer: container probing and decoder selection.

pub mod format;

pub use format::detect_format;
use symphonia::core::{
    codecs::{CODEC_TYPE_NULL, CODEC_TYPE_OPUS, Decoder, DecoderOptions},
    errors::Error,
    formats::{FormatOptions, FormatReader},
    io::{MediaSource, MediaSourceStream},
    meta::MetadataOptions,
    probe::Hint,
};

use crate::audio::constants::{OUTPUT_CHANNELS, TARGET_SAMPLE_RATE};
pub use crate::common::types::AudioFormat;

/// A probed container with the decoder for its first audio track.
pub struct OpenedStream {
    pub format: Box<dyn FormatReader>,
    pub decoder: Box<dyn Decoder>,
    pub track_id: u32,
    pub sample_rate: u32,
    pub channels: usize,
}

impl std::fmt::Debug for OpenedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedStream")
            .field("track_id", &self.track_id)
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .finish()
    }
}

/// Probe `source` and build a decoder for its first decodable track.
///
/// `kind` is only a hint; symphonia still sniffs the stream.
pub fn open_format(source: Box<dyn MediaSource>, kind: Option<AudioFormat>) -> Result<OpenedStream, Error> {
    let mss = MediaSourceStream::new(source, Default::default());

    let mut hint = Hint::new();
    if let Some(k) = kind {
        let ext = k.as_ext();
        if !ext.is_empty() {
            hint.with_extension(ext);
        }
        if let Some(mime) = k.as_mime() {
            hint.mime_type(mime);
        }
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    let format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(Error::Unsupported("no audio track found"))?;

    // symphonia ships no Opus decoder; Opus-in-WebM/Ogg sources are rejected here.
    if track.codec_params.codec == CODEC_TYPE_OPUS {
        return Err(Error::Unsupported("opus input"));
    }

    let track_id = track.id;
    let sample_rate = track.codec_params.sample_rate.unwrap_or(TARGET_SAMPLE_RATE);
    let channels = track
        .codec_params
        .channels
        .map(|c| c.count())
        .unwrap_or(OUTPUT_CHANNELS);
    let decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    Ok(OpenedStream {
        format,
        decoder,
        track_id,
        sample_rate,
        channels,
    })
}
