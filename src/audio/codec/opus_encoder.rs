use audiopus::{Bitrate, Channels, SampleRate, coder::Encoder as OpusEncoder};

use crate::{
    audio::constants::{FRAME_SIZE_SAMPLES, MAX_OPUS_PACKET},
    configs::EncoderConfig,
};

/// PCM i16 → Opus packets, one 20 ms 48 kHz stereo frame at a time.
pub struct OpusFrameEncoder {
    encoder: OpusEncoder,
    packet: Vec<u8>,
}

impl OpusFrameEncoder {
    pub fn new(config: &EncoderConfig) -> Result<Self, audiopus::Error> {
        let mut encoder =
            OpusEncoder::new(SampleRate::Hz48000, Channels::Stereo, config.application.into())?;
        encoder.set_bitrate(Bitrate::BitsPerSecond(config.bitrate))?;
        Ok(Self {
            encoder,
            packet: vec![0u8; MAX_OPUS_PACKET],
        })
    }

    /// Encode exactly one frame of interleaved PCM and return the packet bytes.
    pub fn encode(&mut self, pcm: &[i16]) -> Result<&[u8], audiopus::Error> {
        debug_assert_eq!(pcm.len(), FRAME_SIZE_SAMPLES);
        let len = self.encoder.encode(pcm, &mut self.packet)?;
        Ok(&self.packet[..len])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_silence_into_a_small_packet() {
        let mut enc = OpusFrameEncoder::new(&EncoderConfig::default()).unwrap();
        let packet = enc.encode(&[0i16; FRAME_SIZE_SAMPLES]).unwrap();
        assert!(!packet.is_empty());
        assert!(packet.len() < 64);
    }
}
