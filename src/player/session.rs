//! Per-guild playback session: one sink, one queue, two worker loops.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering},
    },
    time::Duration,
};

use tokio::{sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::{
    audio::processor::EncoderFactory,
    common::{
        errors::{PlaybackError, PlaybackResult},
        types::{ChannelId, GuildId, UserId},
    },
    configs::PlayerConfig,
    player::{
        actor::{ActorHandle, CommandActor},
        dispatch::DispatchLoop,
        events::{NowPlaying, PlaybackEvent},
        frame_player::FramePlayer,
        loader::Loader,
        queue::TrackQueue,
        state::{Command, CommandOutcome, PlayState},
        track::{AuthoredTrack, TrackRef},
    },
    sources::BoxedService,
    voice::{BoxedSink, SinkConnector, SinkSlot},
};

/// Collaborators shared by every session of a registry.
#[derive(Clone)]
pub struct SessionDeps {
    pub service: BoxedService,
    pub encoders: Arc<dyn EncoderFactory>,
    pub connector: Arc<dyn SinkConnector>,
    pub config: PlayerConfig,
    pub events: Option<flume::Sender<PlaybackEvent>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Connected and worker loops started.
    Joined,
    /// Already connected to that channel; nothing changed.
    AlreadyJoined,
    /// Moved from another channel; playback continues on the new sink.
    Switched,
}

struct Workers {
    scope: CancellationToken,
    actor: ActorHandle,
    tasks: Vec<JoinHandle<()>>,
}

pub struct PlaybackSession {
    guild: GuildId,
    deps: SessionDeps,
    queue: Arc<TrackQueue>,
    sink: SinkSlot,
    frames_processed: Arc<AtomicU64>,
    state: Arc<AtomicU8>,
    /// Lifecycle lock: join and leave are serialized through it.
    workers: Mutex<Option<Workers>>,
    closed: AtomicBool,
}

impl PlaybackSession {
    pub fn new(guild: GuildId, deps: SessionDeps) -> Self {
        Self {
            guild,
            deps,
            queue: Arc::new(TrackQueue::new()),
            sink: SinkSlot::default(),
            frames_processed: Arc::new(AtomicU64::new(0)),
            state: Arc::new(AtomicU8::new(PlayState::Stopped as u8)),
            workers: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    pub fn guild(&self) -> &GuildId {
        &self.guild
    }

    fn ensure_open(&self) -> PlaybackResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(PlaybackError::SessionClosed(self.guild.clone()))
        } else {
            Ok(())
        }
    }

    /// Connect to `channel` and start the worker loops if they are not running.
    pub async fn join(&self, channel: ChannelId) -> PlaybackResult<JoinOutcome> {
        self.ensure_open()?;
        let mut workers = self.workers.lock().await;
        self.ensure_open()?;

        if let Some(current) = self.sink.get() {
            if current.is_connected() && current.channel() == channel {
                debug!("guild {} already in channel {}", self.guild, channel);
                return Ok(JoinOutcome::AlreadyJoined);
            }
        }

        let sink = self.deps.connector.connect(&self.guild, channel).await?;
        info!("guild {} joined channel {}", self.guild, channel);

        match workers.as_ref() {
            Some(running) => {
                self.switch_sink(&running.actor, sink).await;
                Ok(JoinOutcome::Switched)
            }
            None => {
                self.sink.replace(sink);
                *workers = Some(self.spawn_workers());
                Ok(JoinOutcome::Joined)
            }
        }
    }

    /// Pause, swap the sink, release the old one, then resume if we paused.
    async fn switch_sink(&self, actor: &ActorHandle, sink: BoxedSink) {
        let paused = matches!(
            actor.command(Command::Pause, None).await,
            Ok(CommandOutcome::Changed(PlayState::Paused))
        );

        if let Some(old) = self.sink.replace(sink) {
            if old.is_speaking() {
                if let Err(e) = old.set_speaking(false).await {
                    warn!("old sink: failed to clear speaking: {}", e);
                }
            }
            if let Err(e) = old.disconnect().await {
                warn!("old sink: disconnect failed: {}", e);
            }
        }

        if paused {
            if let Err(e) = actor.command(Command::Play, None).await {
                warn!("failed to resume after switching sinks: {}", e);
            }
        }
    }

    fn spawn_workers(&self) -> Workers {
        let scope = CancellationToken::new();
        let (actor_tx, actor_rx) = flume::unbounded();
        let (rendezvous_tx, rendezvous_rx) = flume::bounded(0);
        let actor = ActorHandle::new(actor_tx);

        let command_actor =
            CommandActor::new(actor_rx, rendezvous_tx, scope.clone(), self.state.clone());

        let config = &self.deps.config;
        let dispatch = DispatchLoop {
            guild: self.guild.clone(),
            queue: self.queue.clone(),
            loader: Loader::new(
                self.deps.service.clone(),
                self.deps.encoders.clone(),
                config.frame_buffer_capacity,
            ),
            player: FramePlayer::new(
                self.sink.clone(),
                rendezvous_rx,
                self.frames_processed.clone(),
                config.send_timeout(),
            ),
            sink: self.sink.clone(),
            actor: actor.clone(),
            frames_processed: self.frames_processed.clone(),
            scope: scope.clone(),
            send_timeout_ms: config.send_timeout_ms,
            events: self.deps.events.clone(),
        };

        let guild = self.guild.to_string();
        let tasks = vec![
            tokio::spawn(command_actor.run().instrument(info_span!("actor", guild = %guild))),
            tokio::spawn(dispatch.run().instrument(info_span!("dispatch", guild = %guild))),
        ];

        Workers {
            scope,
            actor,
            tasks,
        }
    }

    /// Tear the session down: stop both loops and the encoder, release the
    /// sink, drop the queue. Safe to call more than once.
    pub async fn leave(&self) -> PlaybackResult<()> {
        let mut workers = self.workers.lock().await;
        let already_closed = self.closed.swap(true, Ordering::AcqRel);

        if let Some(running) = workers.take() {
            running.scope.cancel();
            self.await_tasks(running.tasks, self.deps.config.leave_timeout()).await;
        }

        self.queue.clear();
        self.frames_processed.store(0, Ordering::Relaxed);
        self.state.store(PlayState::Stopped as u8, Ordering::Release);

        let Some(sink) = self.sink.take() else {
            if !already_closed {
                info!("guild {} left", self.guild);
            }
            return Ok(());
        };

        if sink.is_speaking() {
            if let Err(e) = sink.set_speaking(false).await {
                warn!("failed to clear speaking on leave: {}", e);
            }
        }
        let result = sink
            .disconnect()
            .await
            .map_err(|e| PlaybackError::Disconnect(e.to_string()));
        info!("guild {} left channel {}", self.guild, sink.channel());
        result
    }

    async fn await_tasks(&self, tasks: Vec<JoinHandle<()>>, limit: Duration) {
        for mut task in tasks {
            match tokio::time::timeout(limit, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("guild {}: worker ended abnormally: {}", self.guild, e),
                Err(_) => {
                    warn!("guild {}: worker did not stop in time, aborting", self.guild);
                    task.abort();
                }
            }
        }
    }

    /// Append a track. Works whether or not the session is connected.
    pub fn enqueue(
        &self,
        track: TrackRef,
        author_id: UserId,
        author_name: impl Into<String>,
    ) -> PlaybackResult<AuthoredTrack> {
        self.ensure_open()?;
        let entry = self.queue.enqueue(track, author_id, author_name);
        debug!(
            "guild {}: queued '{}' at position {}",
            self.guild,
            entry.track.title,
            self.queue.len()
        );
        Ok(entry)
    }

    async fn actor(&self) -> PlaybackResult<ActorHandle> {
        self.ensure_open()?;
        self.workers
            .lock()
            .await
            .as_ref()
            .map(|w| w.actor.clone())
            .ok_or(PlaybackError::NotConnected)
    }

    /// Send `Play` or `Pause` to the actor and wait until it has been carried
    /// out. `Next` is refused here: skips go through [`Self::skip`], which
    /// checks who queued the track.
    pub async fn command(&self, cmd: Command) -> PlaybackResult<CommandOutcome> {
        if cmd == Command::Next {
            return Err(PlaybackError::Unsupported(
                "Next needs a requester; use skip".into(),
            ));
        }
        self.actor().await?.command(cmd, None).await
    }

    /// Skip the current track on behalf of `requester`, who must have queued it.
    pub async fn skip(&self, requester: UserId) -> PlaybackResult<CommandOutcome> {
        let actor = self.actor().await?;
        let front = self.queue.front().ok_or(PlaybackError::QueueEmpty)?;
        if front.author_id != requester {
            return Err(PlaybackError::NotAuthor {
                requester,
                author: front.author_id,
            });
        }
        actor.command(Command::Next, Some(front.id)).await
    }

    pub fn queue_snapshot(&self) -> Vec<AuthoredTrack> {
        self.queue.snapshot()
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed.load(Ordering::Relaxed)
    }

    pub fn play_state(&self) -> PlayState {
        PlayState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn now_playing(&self) -> Option<NowPlaying> {
        let entry = self.queue.front()?;
        Some(NowPlaying::new(entry, self.play_state(), self.frames_processed()))
    }

    pub fn is_connected(&self) -> bool {
        self.sink.is_live()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{TestRig, eventually, track};
    use crate::voice::sink::VoiceSink;

    fn session(rig: &TestRig) -> PlaybackSession {
        PlaybackSession::new(GuildId::from("g"), rig.deps.clone())
    }

    #[tokio::test]
    async fn commands_need_a_connection() {
        let rig = TestRig::new(10);
        let session = session(&rig);

        assert!(matches!(
            session.command(Command::Play).await,
            Err(PlaybackError::NotConnected)
        ));
        assert!(matches!(
            session.skip(UserId(1)).await,
            Err(PlaybackError::NotConnected)
        ));
        assert!(!session.is_connected());
        assert!(session.now_playing().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn next_is_only_reachable_through_skip() {
        let rig = TestRig::new(10_000);
        let session = session(&rig);
        session.join(ChannelId(3)).await.unwrap();
        session.enqueue(track("a"), UserId(1), "alice").unwrap();
        eventually(|| session.frames_processed() > 0).await;

        assert!(matches!(
            session.command(Command::Next).await,
            Err(PlaybackError::Unsupported(_))
        ));
        let before = session.frames_processed();
        eventually(|| session.frames_processed() > before).await;
        assert_eq!(session.queue_snapshot()[0].track.identifier, "a");
        assert_eq!(session.play_state(), PlayState::Playing);
        assert!(!rig.events.try_iter().any(|e| matches!(e, PlaybackEvent::TrackEnd { .. })));
        session.leave().await.unwrap();
    }

    #[tokio::test]
    async fn skip_on_an_empty_queue_is_rejected() {
        let rig = TestRig::new(10);
        let session = session(&rig);
        session.join(ChannelId(3)).await.unwrap();

        assert!(matches!(
            session.skip(UserId(1)).await,
            Err(PlaybackError::QueueEmpty)
        ));
        assert_eq!(
            session.command(Command::Play).await.unwrap(),
            CommandOutcome::Latent
        );
        session.leave().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn now_playing_reports_progress() {
        let rig = TestRig::new(10_000);
        let session = session(&rig);
        session.join(ChannelId(3)).await.unwrap();
        session
            .enqueue(track("a").with_duration_ms(60_000), UserId(1), "alice")
            .unwrap();

        eventually(|| session.frames_processed() >= 5).await;
        let now = session.now_playing().unwrap();
        assert_eq!(now.entry.track.identifier, "a");
        assert_eq!(now.total_ms, 60_000);
        assert!(now.elapsed_ms >= 100);
        session.leave().await.unwrap();
    }

    #[tokio::test]
    async fn closed_sessions_reject_everything() {
        let rig = TestRig::new(10);
        let session = session(&rig);
        session.join(ChannelId(3)).await.unwrap();
        session.leave().await.unwrap();
        session.leave().await.unwrap();

        assert!(session.is_closed());
        assert!(matches!(
            session.join(ChannelId(3)).await,
            Err(PlaybackError::SessionClosed(_))
        ));
        assert!(matches!(
            session.command(Command::Pause).await,
            Err(PlaybackError::SessionClosed(_))
        ));
        let sink = rig.connector.last().unwrap();
        assert!(!sink.is_connected());
        assert_eq!(sink.disconnects(), 1);
    }
}
