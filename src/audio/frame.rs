use bytes::Bytes;

use crate::audio::constants::FRAME_DURATION_MS;

/// One 20 ms chunk of Opus audio, ready to hand to a voice sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame(Bytes);

impl EncodedFrame {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self(data.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Playback time represented by `frames` encoded frames.
pub fn frames_to_ms(frames: u64) -> u64 {
    frames.saturating_mul(FRAME_DURATION_MS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_count_maps_to_elapsed_time() {
        assert_eq!(frames_to_ms(0), 0);
        assert_eq!(frames_to_ms(50), 1_000);
        assert_eq!(frames_to_ms(3_000), 60_000);
    }
}
