use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::audio::constants::{FRAME_BUFFER_CAPACITY, SINK_SEND_TIMEOUT_MS};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PlayerConfig {
    /// Encoded frames buffered ahead of the player (3000 ≈ one minute).
    #[serde(default = "default_frame_buffer_capacity")]
    pub frame_buffer_capacity: usize,
    /// How long the sink may sit on a single frame before the track is abandoned.
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
    /// Upper bound on waiting for worker loops to exit during leave.
    #[serde(default = "default_leave_timeout_ms")]
    pub leave_timeout_ms: u64,
}

impl PlayerConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn leave_timeout(&self) -> Duration {
        Duration::from_millis(self.leave_timeout_ms)
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            frame_buffer_capacity: default_frame_buffer_capacity(),
            send_timeout_ms: default_send_timeout_ms(),
            leave_timeout_ms: default_leave_timeout_ms(),
        }
    }
}

fn default_frame_buffer_capacity() -> usize {
    FRAME_BUFFER_CAPACITY
}

fn default_send_timeout_ms() -> u64 {
    SINK_SEND_TIMEOUT_MS
}

fn default_leave_timeout_ms() -> u64 {
    2_000
}
