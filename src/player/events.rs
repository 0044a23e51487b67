use serde::Serialize;

use crate::{
    audio::frame::frames_to_ms,
    common::{Severity, errors::PlaybackError, types::GuildId},
    player::{state::PlayState, track::AuthoredTrack},
};

/// Events emitted by the dispatch loop.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PlaybackEvent {
    #[serde(rename = "TrackStartEvent", rename_all = "camelCase")]
    TrackStart {
        guild_id: GuildId,
        entry: AuthoredTrack,
    },

    #[serde(rename = "TrackEndEvent", rename_all = "camelCase")]
    TrackEnd {
        guild_id: GuildId,
        entry: AuthoredTrack,
        reason: TrackEndReason,
        frames: u64,
    },

    #[serde(rename = "TrackExceptionEvent", rename_all = "camelCase")]
    TrackException {
        guild_id: GuildId,
        entry: AuthoredTrack,
        exception: TrackException,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TrackEndReason {
    Finished,
    LoadFailed,
    /// Skipped with `Next`.
    Stopped,
    /// The sink stopped accepting frames.
    Stuck,
    /// The session left, or the sink went away.
    Cleanup,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackException {
    pub message: String,
    pub severity: Severity,
}

impl From<&PlaybackError> for TrackException {
    fn from(e: &PlaybackError) -> Self {
        Self {
            message: e.to_string(),
            severity: e.severity(),
        }
    }
}

/// The front of the queue with its progress, for status display.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NowPlaying {
    pub entry: AuthoredTrack,
    pub state: PlayState,
    pub elapsed_ms: u64,
    /// 0 when the service did not report a length.
    pub total_ms: u64,
}

impl NowPlaying {
    pub fn new(entry: AuthoredTrack, state: PlayState, frames: u64) -> Self {
        let total_ms = entry.track.duration_ms;
        let elapsed_ms = match total_ms {
            0 => frames_to_ms(frames),
            total => frames_to_ms(frames).min(total),
        };
        Self {
            entry,
            state,
            elapsed_ms,
            total_ms,
        }
    }
}
