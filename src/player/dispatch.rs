//! The dispatch loop: takes the queue front, loads it, plays it, dequeues it.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    common::{errors::PlaybackError, types::GuildId},
    player::{
        actor::{ActorHandle, ActorMsg},
        events::{PlaybackEvent, TrackEndReason, TrackException},
        frame_player::{FramePlayer, PlayerExit},
        loader::Loader,
        queue::TrackQueue,
        track::AuthoredTrack,
    },
    voice::SinkSlot,
};

pub(crate) struct DispatchLoop {
    pub(crate) guild: GuildId,
    pub(crate) queue: Arc<TrackQueue>,
    pub(crate) loader: Loader,
    pub(crate) player: FramePlayer,
    pub(crate) sink: SinkSlot,
    pub(crate) actor: ActorHandle,
    pub(crate) frames_processed: Arc<AtomicU64>,
    pub(crate) scope: CancellationToken,
    pub(crate) send_timeout_ms: u64,
    pub(crate) events: Option<flume::Sender<PlaybackEvent>>,
}

impl DispatchLoop {
    pub(crate) async fn run(self) {
        debug!("dispatch loop started");
        loop {
            let entry = tokio::select! {
                biased;
                _ = self.scope.cancelled() => break,
                entry = self.queue.next_ready() => entry,
            };

            let reason = self.play_entry(&entry).await;

            info!("track '{}' ended: {:?}", entry.track.title, reason);
            self.emit(PlaybackEvent::TrackEnd {
                guild_id: self.guild.clone(),
                frames: self.frames_processed.load(Ordering::Relaxed),
                entry,
                reason,
            });
        }
        debug!("dispatch loop stopped");
    }

    async fn play_entry(&self, entry: &AuthoredTrack) -> TrackEndReason {
        let token = self.scope.child_token();
        self.actor.notify(ActorMsg::TrackLoading {
            entry_id: entry.id,
            token: token.clone(),
        });
        self.frames_processed.store(0, Ordering::Relaxed);

        let reason = self.load_and_play(entry, &token).await;

        token.cancel();
        // Dequeue first so a skip can no longer name this entry as the front.
        self.queue.dequeue_if_front(entry.id);
        self.actor.notify(ActorMsg::TrackEnded { entry_id: entry.id });
        reason
    }

    async fn load_and_play(&self, entry: &AuthoredTrack, token: &CancellationToken) -> TrackEndReason {
        if !self.sink.is_live() {
            warn!("no connected sink, discarding '{}'", entry.track.title);
            return TrackEndReason::Cleanup;
        }

        info!(
            "loading '{}' queued by {} ({})",
            entry.track.title, entry.author_name, entry.author_id
        );
        let stream = match self.loader.load(entry, token.clone()).await {
            Ok(stream) => stream,
            Err(_) if token.is_cancelled() => return self.cancelled_reason(),
            Err(e) => {
                self.exception(entry, &e);
                return TrackEndReason::LoadFailed;
            }
        };

        self.actor.notify(ActorMsg::TrackStarted { entry_id: entry.id });
        self.emit(PlaybackEvent::TrackStart {
            guild_id: self.guild.clone(),
            entry: entry.clone(),
        });

        let exit = self.player.play(&stream.frames, token).await;
        token.cancel();
        let encoded = stream.finish().await;

        match exit {
            _ if self.scope.is_cancelled() => TrackEndReason::Cleanup,
            PlayerExit::Cancelled => TrackEndReason::Stopped,
            PlayerExit::Stalled => {
                self.exception(entry, &PlaybackError::SinkStalled(self.send_timeout_ms));
                TrackEndReason::Stuck
            }
            PlayerExit::SinkGone(reason) => {
                self.exception(entry, &PlaybackError::SinkClosed(reason));
                TrackEndReason::Cleanup
            }
            PlayerExit::Finished => match encoded {
                Ok(frames) => {
                    debug!("encoder produced {} frames", frames);
                    TrackEndReason::Finished
                }
                Err(e) => {
                    self.exception(entry, &e);
                    TrackEndReason::LoadFailed
                }
            },
        }
    }

    fn cancelled_reason(&self) -> TrackEndReason {
        if self.scope.is_cancelled() {
            TrackEndReason::Cleanup
        } else {
            TrackEndReason::Stopped
        }
    }

    fn exception(&self, entry: &AuthoredTrack, error: &PlaybackError) {
        warn!("track '{}' failed: {}", entry.track.title, error);
        self.emit(PlaybackEvent::TrackException {
            guild_id: self.guild.clone(),
            entry: entry.clone(),
            exception: TrackException::from(error),
        });
    }

    fn emit(&self, event: PlaybackEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}
