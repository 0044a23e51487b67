//! PCM sample-rate conversion to the 48 kHz output clock.
//!
//! | Quality | Kernel | CPU Cost |
//! |---|---|---|
//! | [`ResamplerQuality::Linear`] | two-point | Very low |
//! | [`ResamplerQuality::Hermite`] | four-point Catmull-Rom | Low |

pub mod kernel;

use crate::configs::ResamplerQuality;

/// Frames of history carried between blocks; enough for the Hermite kernel.
const HISTORY_FRAMES: usize = 3;

/// Streaming resampler over interleaved i16 PCM.
pub struct Resampler {
    quality: ResamplerQuality,
    /// Input frames advanced per output frame.
    step: f64,
    /// Read head, in frames, relative to the start of `carry`.
    pos: f64,
    channels: usize,
    /// Tail of the previous block, prepended to the next one.
    carry: Vec<i16>,
    work: Vec<i16>,
}

impl Resampler {
    pub fn new(quality: ResamplerQuality, source_rate: u32, target_rate: u32, channels: usize) -> Self {
        let channels = channels.max(1);
        Self {
            quality,
            step: source_rate as f64 / target_rate.max(1) as f64,
            // Start on the first real sample, one frame in from the zeroed history.
            pos: 1.0,
            channels,
            carry: vec![0; channels],
            work: Vec::new(),
        }
    }

    pub fn is_passthrough(&self) -> bool {
        (self.step - 1.0).abs() < f64::EPSILON
    }

    /// Resample `input` and **append** the result to `output`.
    pub fn process(&mut self, input: &[i16], output: &mut Vec<i16>) {
        if self.is_passthrough() {
            output.extend_from_slice(input);
            return;
        }

        let ch = self.channels;
        self.work.clear();
        self.work.extend_from_slice(&self.carry);
        self.work.extend_from_slice(&input[..input.len() - input.len() % ch]);
        let frames = self.work.len() / ch;

        // The Hermite kernel needs one frame behind and two ahead of the head.
        while (self.pos as usize) + 2 < frames {
            let base = self.pos as usize;
            let t = (self.pos - base as f64) as f32;
            for c in 0..ch {
                let at = |i: usize| self.work[i * ch + c] as f32;
                let sample = match self.quality {
                    ResamplerQuality::Linear => kernel::linear(at(base), at(base + 1), t),
                    ResamplerQuality::Hermite => kernel::hermite(
                        [at(base.saturating_sub(1)), at(base), at(base + 1), at(base + 2)],
                        t,
                    ),
                };
                output.push(kernel::to_i16(sample));
            }
            self.pos += self.step;
        }

        let keep = frames.min(HISTORY_FRAMES);
        let dropped = frames - keep;
        self.carry.clear();
        self.carry.extend_from_slice(&self.work[dropped * ch..]);
        self.pos -= dropped as f64;
    }
}

/// Fold any channel layout down (or up) to interleaved stereo.
pub fn to_stereo(input: &[i16], channels: usize, output: &mut Vec<i16>) {
    match channels {
        0 => {}
        1 => {
            for &s in input {
                output.push(s);
                output.push(s);
            }
        }
        2 => output.extend_from_slice(input),
        n => {
            // Keep front left/right, drop the rest.
            for frame in input.chunks_exact(n) {
                output.push(frame[0]);
                output.push(frame[1]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_copies_input() {
        let mut r = Resampler::new(ResamplerQuality::Hermite, 48_000, 48_000, 2);
        let mut out = Vec::new();
        r.process(&[1, 2, 3, 4], &mut out);
        assert_eq!(out, vec![1, 2, 3, 4]);
    }

    #[test]
    fn upsampling_produces_proportionally_more_frames() {
        for quality in [ResamplerQuality::Linear, ResamplerQuality::Hermite] {
            let mut r = Resampler::new(quality, 24_000, 48_000, 1);
            let mut out = Vec::new();
            for _ in 0..10 {
                r.process(&[1000; 480], &mut out);
            }
            // 4800 input frames at 2x, minus the kernel's lookahead.
            assert!((9_590..=9_600).contains(&out.len()), "{} -> {}", quality as u8, out.len());
        }
    }

    #[test]
    fn constant_signal_stays_constant() {
        let mut r = Resampler::new(ResamplerQuality::Hermite, 44_100, 48_000, 2);
        let mut out = Vec::new();
        r.process(&[500; 2 * 441], &mut out);
        r.process(&[500; 2 * 441], &mut out);
        // Skip the ramp in from the zeroed history.
        assert!(out[8..].iter().all(|&s| (499..=501).contains(&s)));
    }

    #[test]
    fn mono_is_duplicated_to_stereo() {
        let mut out = Vec::new();
        to_stereo(&[7, 9], 1, &mut out);
        assert_eq!(out, vec![7, 7, 9, 9]);

        out.clear();
        to_stereo(&[1, 2, 3, 4, 5, 6], 3, &mut out);
        assert_eq!(out, vec![1, 2, 4, 5]);
    }
}
