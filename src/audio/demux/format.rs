//! Container sniffing for streams that arrive without a usable extension or
//! `Content-Type`.

use crate::common::types::AudioFormat;

/// Bytes [`detect_format`] wants to see to make a decision.
pub const SNIFF_LEN: usize = 12;

/// Guess the container from the first bytes of a stream.
pub fn detect_format(header: &[u8]) -> AudioFormat {
    if header.len() < 4 {
        return AudioFormat::Unknown;
    }

    match header {
        [0x1A, 0x45, 0xDF, 0xA3, ..] => AudioFormat::Webm,
        [_, _, _, _, b'f', b't', b'y', b'p', ..] => AudioFormat::Mp4,
        [b'O', b'g', b'g', b'S', ..] => AudioFormat::Ogg,
        [b'f', b'L', b'a', b'C', ..] => AudioFormat::Flac,
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'A', b'V', b'E', ..] => AudioFormat::Wav,
        [b'I', b'D', b'3', ..] => AudioFormat::Mp3,
        // ADTS shares the frame-sync bits with MPEG audio; layer bits are zero.
        [0xFF, b, ..] if b & 0xF6 == 0xF0 => AudioFormat::Aac,
        [0xFF, b, ..] if b & 0xE0 == 0xE0 => AudioFormat::Mp3,
        _ => AudioFormat::Unknown,
    }
}
