//! Play/pause/skip state machine driven by the command actor.

use serde::{Deserialize, Serialize};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlayState {
    /// No track is playing (idle, or between tracks).
    Stopped = 0,
    Playing = 1,
    Paused = 2,
}

impl PlayState {
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Playing,
            2 => Self::Paused,
            _ => Self::Stopped,
        }
    }
}

/// In-band intents accepted by a session. Teardown is `leave`, not a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Command {
    Play,
    Pause,
    Next,
}

/// What the actor has to do to carry out a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Already in the requested state.
    Stay,
    /// `Play` with nothing playing; tracks start out playing anyway.
    Latent,
    /// Pause half of the rendezvous.
    Pause,
    /// Resume half of the rendezvous.
    Resume,
    /// Abandon the current track.
    Skip,
    /// `Next` with no current track.
    NothingToSkip,
}

impl Step {
    /// State once the step has completed. Skips leave the state alone; the
    /// dispatch loop resets it when the track actually ends.
    pub fn resulting_state(self, from: PlayState) -> PlayState {
        match self {
            Self::Pause => PlayState::Paused,
            Self::Resume => PlayState::Playing,
            Self::Stay | Self::Latent | Self::Skip | Self::NothingToSkip => from,
        }
    }
}

/// The transition table. `has_track` is true while a track is loading or playing.
pub fn transition(state: PlayState, cmd: Command, has_track: bool) -> Step {
    use PlayState::*;

    match (cmd, state) {
        (Command::Play, Playing) => Step::Stay,
        (Command::Play, Paused) => Step::Resume,
        (Command::Play, Stopped) => Step::Latent,
        (Command::Pause, Playing) => Step::Pause,
        (Command::Pause, Paused | Stopped) => Step::Stay,
        (Command::Next, _) if has_track => Step::Skip,
        (Command::Next, _) => Step::NothingToSkip,
    }
}

/// Reply to a command, sent once the actor has finished carrying it out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CommandOutcome {
    /// The state changed to the given value.
    Changed(PlayState),
    /// Nothing to do; the state was already the given value.
    Unchanged(PlayState),
    /// `Play` while stopped; remembered as "ready to play".
    Latent,
    /// The current (or about-to-load) track is being abandoned.
    Skipped,
}
