use serde::{Deserialize, Serialize};

use crate::common::types::{GuildId, UserId};

/// Exception severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    /// Caused by the caller or by a single bad track.
    Common,
    /// Probably an upstream hiccup (network, remote service).
    Suspicious,
    /// A bug or a broken local resource.
    Fault,
}

/// Every failure the playback engine surfaces.
#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("no playback session for guild {0}")]
    NoSuchSession(GuildId),

    #[error("playback session for guild {0} has been torn down")]
    SessionClosed(GuildId),

    #[error("not connected to a voice channel")]
    NotConnected,

    #[error("user {requester} cannot skip a track queued by {author}")]
    NotAuthor { requester: UserId, author: UserId },

    #[error("the queue is empty")]
    QueueEmpty,

    #[error("download failed: {0}")]
    DownloadFailed(String),

    #[error("encode failed: {0}")]
    EncodeFailed(String),

    #[error("voice sink did not accept a frame within {0} ms")]
    SinkStalled(u64),

    #[error("voice sink closed: {0}")]
    SinkClosed(String),

    #[error("failed to connect voice sink: {0}")]
    SinkConnect(String),

    #[error("failed to disconnect voice sink: {0}")]
    Disconnect(String),

    #[error("worker scope already closed")]
    ScopeClosed,

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),
}

impl PlaybackError {
    pub fn severity(&self) -> Severity {
        match self {
            Self::NoSuchSession(_)
            | Self::SessionClosed(_)
            | Self::NotConnected
            | Self::NotAuthor { .. }
            | Self::QueueEmpty
            | Self::Unsupported(_)
            | Self::EncodeFailed(_) => Severity::Common,
            Self::DownloadFailed(_)
            | Self::SinkStalled(_)
            | Self::SinkClosed(_)
            | Self::SinkConnect(_) => Severity::Suspicious,
            Self::Disconnect(_) | Self::ScopeClosed | Self::Io(_) | Self::Config(_) => {
                Severity::Fault
            }
        }
    }

    /// Errors that end the current track but leave the session running.
    pub fn is_track_fatal(&self) -> bool {
        matches!(
            self,
            Self::DownloadFailed(_)
                | Self::EncodeFailed(_)
                | Self::SinkStalled(_)
                | Self::SinkClosed(_)
        )
    }
}

pub type PlaybackResult<T> = std::result::Result<T, PlaybackError>;
