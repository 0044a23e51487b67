//! Guild id to playback session map shared by request handlers.

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::{
    common::{
        errors::{PlaybackError, PlaybackResult},
        types::{ChannelId, GuildId, UserId},
    },
    player::{
        AuthoredTrack, Command, CommandOutcome, JoinOutcome, NowPlaying, PlaybackSession,
        SessionDeps, TrackRef,
    },
};

/// Owns every live [`PlaybackSession`].
///
/// Lookups clone the session `Arc` out of the map before awaiting, so no map
/// shard stays locked across a suspension point.
pub struct SessionRegistry {
    sessions: DashMap<GuildId, Arc<PlaybackSession>>,
    deps: SessionDeps,
}

impl SessionRegistry {
    pub fn new(deps: SessionDeps) -> Self {
        Self {
            sessions: DashMap::new(),
            deps,
        }
    }

    /// The guild's session, created (disconnected) if there is none.
    pub fn open(&self, guild: &GuildId) -> Arc<PlaybackSession> {
        self.sessions
            .entry(guild.clone())
            .or_insert_with(|| {
                debug!("creating session for guild {}", guild);
                Arc::new(PlaybackSession::new(guild.clone(), self.deps.clone()))
            })
            .clone()
    }

    pub fn get(&self, guild: &GuildId) -> PlaybackResult<Arc<PlaybackSession>> {
        self.sessions
            .get(guild)
            .map(|s| s.value().clone())
            .ok_or_else(|| PlaybackError::NoSuchSession(guild.clone()))
    }

    pub async fn join(&self, guild: &GuildId, channel: ChannelId) -> PlaybackResult<JoinOutcome> {
        self.open(guild).join(channel).await
    }

    /// Tear down and forget the guild's session. `Ok(false)` when there was none.
    pub async fn leave(&self, guild: &GuildId) -> PlaybackResult<bool> {
        let Some((_, session)) = self.sessions.remove(guild) else {
            return Ok(false);
        };
        session.leave().await?;
        info!("session for guild {} removed", guild);
        Ok(true)
    }

    pub fn enqueue(
        &self,
        guild: &GuildId,
        track: TrackRef,
        author_id: UserId,
        author_name: impl Into<String>,
    ) -> PlaybackResult<AuthoredTrack> {
        self.get(guild)?.enqueue(track, author_id, author_name)
    }

    pub async fn command(&self, guild: &GuildId, cmd: Command) -> PlaybackResult<CommandOutcome> {
        self.get(guild)?.command(cmd).await
    }

    pub async fn skip(&self, guild: &GuildId, user: UserId) -> PlaybackResult<CommandOutcome> {
        self.get(guild)?.skip(user).await
    }

    pub fn queue_snapshot(&self, guild: &GuildId) -> PlaybackResult<Vec<AuthoredTrack>> {
        Ok(self.get(guild)?.queue_snapshot())
    }

    pub fn frames_processed(&self, guild: &GuildId) -> PlaybackResult<u64> {
        Ok(self.get(guild)?.frames_processed())
    }

    pub fn now_playing(&self, guild: &GuildId) -> PlaybackResult<Option<NowPlaying>> {
        Ok(self.get(guild)?.now_playing())
    }

    /// Search the configured music services.
    pub async fn search(&self, query: &str, limit: usize) -> PlaybackResult<Vec<TrackRef>> {
        self.deps.service.search(query, limit).await
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Leave every guild concurrently, e.g. on shutdown. Returns how many
    /// sessions were closed.
    pub async fn shutdown(&self) -> usize {
        let guilds: Vec<GuildId> = self.sessions.iter().map(|s| s.key().clone()).collect();
        let results = join_all(guilds.iter().map(|guild| self.leave(guild))).await;

        guilds
            .iter()
            .zip(results)
            .filter(|(guild, result)| match result {
                Ok(closed) => *closed,
                Err(e) => {
                    warn!("guild {}: leave failed during shutdown: {}", guild, e);
                    true
                }
            })
            .count()
    }
}
