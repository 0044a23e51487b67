//! Central constants for the audio pipeline.
//!
//! Every number the encode profile or the real-time path depends on lives
//! here so the loader, the player and the sinks agree on them.

use std::time::Duration;

// ── Encode profile ───────────────────────────────────────────────────────────

/// Output sample rate handed to the voice sink (Hz).
pub const TARGET_SAMPLE_RATE: u32 = 48_000;

/// Stereo output.
pub const OUTPUT_CHANNELS: usize = 2;

/// Duration of a single encoded frame.
pub const FRAME_DURATION_MS: u64 = 20;

pub const FRAME_DURATION: Duration = Duration::from_millis(FRAME_DURATION_MS);

/// Samples per channel in one 20 ms frame at 48 kHz.
pub const SAMPLES_PER_CHANNEL: usize = 960;

/// Interleaved samples per 20 ms stereo frame (960 × 2).
pub const FRAME_SIZE_SAMPLES: usize = SAMPLES_PER_CHANNEL * OUTPUT_CHANNELS;

/// Default Opus bitrate (bits per second).
pub const DEFAULT_BITRATE: i32 = 64_000;

/// Upper bound for one encoded Opus packet.
pub const MAX_OPUS_PACKET: usize = 4_000;

// ── Real-time delivery ───────────────────────────────────────────────────────

/// Frames buffered between the encoder and the player: one minute of audio.
pub const FRAME_BUFFER_CAPACITY: usize = 3_000;

/// How long the sink may hold on to one frame before the track is abandoned.
pub const SINK_SEND_TIMEOUT_MS: u64 = 10_000;

/// How often a blocked encoder re-checks its cancellation token.
pub const ENCODER_PUSH_POLL: Duration = Duration::from_millis(100);

/// Opus silence frame, sent a few times when the sink stops speaking.
pub const SILENCE_FRAME: [u8; 3] = [0xF8, 0xFF, 0xFE];

/// Silence frames flushed after the last real frame.
pub const SILENCE_FRAME_COUNT: usize = 5;

// ── i16 PCM ──────────────────────────────────────────────────────────────────

pub const INT16_MAX_F: f32 = 32_767.0;
pub const INT16_MIN_F: f32 = -32_768.0;
