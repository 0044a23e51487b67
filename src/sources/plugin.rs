use std::sync::Arc;

use async_trait::async_trait;
use symphonia::core::io::MediaSource;

use crate::{
    common::{errors::PlaybackResult, types::AudioFormat},
    player::track::TrackRef,
};

/// Raw, still-encoded audio for one track, ready for the transcoder.
pub struct AudioStream {
    pub source: Box<dyn MediaSource>,
    /// Container hint; `Unknown` leaves detection to the prober.
    pub format: AudioFormat,
}

impl std::fmt::Debug for AudioStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioStream")
            .field("format", &self.format)
            .field("byte_len", &self.source.byte_len())
            .finish()
    }
}

/// The external music service as the engine sees it.
///
/// Search results are opaque candidates; a failed download is final for that
/// track and is never retried here.
#[async_trait]
pub trait MusicService: Send + Sync {
    /// Unique identifier for this service (e.g. "local", "http").
    fn name(&self) -> &str;

    /// Whether `identifier` is a direct reference this service resolves
    /// without searching (a path, a URL).
    fn can_handle(&self, identifier: &str) -> bool;

    async fn search(&self, query: &str, limit: usize) -> PlaybackResult<Vec<TrackRef>>;

    async fn download(&self, track: &TrackRef) -> PlaybackResult<AudioStream>;
}

pub type BoxedService = Arc<dyn MusicService>;
