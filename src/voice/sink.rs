use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    audio::frame::EncodedFrame,
    common::{
        errors::PlaybackResult,
        types::{ChannelId, GuildId},
    },
};

/// A live, ordered real-time audio output, e.g. a voice-channel connection.
#[async_trait]
pub trait VoiceSink: Send + Sync {
    /// Deliver one frame. The sink paces itself to its frame cadence, so this
    /// call is what keeps playback in real time.
    async fn send(&self, frame: EncodedFrame) -> PlaybackResult<()>;

    async fn set_speaking(&self, speaking: bool) -> PlaybackResult<()>;

    /// Release the connection. Calling it twice is not an error.
    async fn disconnect(&self) -> PlaybackResult<()>;

    fn is_connected(&self) -> bool;

    fn is_speaking(&self) -> bool;

    fn channel(&self) -> ChannelId;
}

pub type BoxedSink = Arc<dyn VoiceSink>;

/// Acquires sinks for voice channels.
#[async_trait]
pub trait SinkConnector: Send + Sync {
    async fn connect(&self, guild: &GuildId, channel: ChannelId) -> PlaybackResult<BoxedSink>;
}

/// The session's current sink, swappable while the player runs. The player
/// re-reads it for every frame.
#[derive(Clone, Default)]
pub struct SinkSlot(Arc<parking_lot::RwLock<Option<BoxedSink>>>);

impl SinkSlot {
    pub fn get(&self) -> Option<BoxedSink> {
        self.0.read().clone()
    }

    pub fn replace(&self, sink: BoxedSink) -> Option<BoxedSink> {
        self.0.write().replace(sink)
    }

    pub fn take(&self) -> Option<BoxedSink> {
        self.0.write().take()
    }

    /// A sink is present and still connected.
    pub fn is_live(&self) -> bool {
        self.0.read().as_ref().is_some_and(|s| s.is_connected())
    }
}
