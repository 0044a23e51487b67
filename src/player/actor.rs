//! The command actor: the single owner of a session's [`PlayState`].
//!
//! User commands and the dispatch loop's track lifecycle notifications arrive
//! on one channel, so every state change happens in arrival order on one task.

use std::sync::{
    Arc,
    atomic::{AtomicU8, Ordering},
};

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::{
    common::errors::{PlaybackError, PlaybackResult},
    player::state::{Command, CommandOutcome, PlayState, Step, transition},
};

pub(crate) type Reply = flume::Sender<PlaybackResult<CommandOutcome>>;

pub(crate) enum ActorMsg {
    Command {
        cmd: Command,
        /// For skips: the queue entry the requester meant to abort.
        expect: Option<u64>,
        reply: Reply,
    },
    /// Dispatch picked up `entry_id`; `token` aborts it.
    TrackLoading {
        entry_id: u64,
        token: CancellationToken,
    },
    /// Frames for `entry_id` are about to flow.
    TrackStarted { entry_id: u64 },
    TrackEnded { entry_id: u64 },
}

struct CurrentTrack {
    entry_id: u64,
    token: CancellationToken,
}

pub(crate) struct CommandActor {
    rx: flume::Receiver<ActorMsg>,
    /// Zero-capacity: a send completes only when the player takes it.
    rendezvous: flume::Sender<()>,
    scope: CancellationToken,
    state: PlayState,
    published: Arc<AtomicU8>,
    current: Option<CurrentTrack>,
    /// A skip that named an entry dispatch has not picked up yet.
    pending_skip: Option<u64>,
    /// Newest entry that has finished. Queue ids only grow.
    last_ended: Option<u64>,
}

impl CommandActor {
    pub(crate) fn new(
        rx: flume::Receiver<ActorMsg>,
        rendezvous: flume::Sender<()>,
        scope: CancellationToken,
        published: Arc<AtomicU8>,
    ) -> Self {
        published.store(PlayState::Stopped as u8, Ordering::Release);
        Self {
            rx,
            rendezvous,
            scope,
            state: PlayState::Stopped,
            published,
            current: None,
            pending_skip: None,
            last_ended: None,
        }
    }

    pub(crate) async fn run(mut self) {
        debug!("command actor started");
        loop {
            let msg = tokio::select! {
                biased;
                _ = self.scope.cancelled() => break,
                msg = self.rx.recv_async() => match msg {
                    Ok(msg) => msg,
                    Err(_) => break,
                },
            };
            self.handle(msg).await;
        }
        self.set_state(PlayState::Stopped);
        debug!("command actor stopped");
    }

    fn set_state(&mut self, state: PlayState) {
        if self.state != state {
            trace!("play state {:?} -> {:?}", self.state, state);
        }
        self.state = state;
        self.published.store(state as u8, Ordering::Release);
    }

    async fn handle(&mut self, msg: ActorMsg) {
        match msg {
            ActorMsg::Command { cmd, expect, reply } => {
                let result = self.apply(cmd, expect).await;
                // The caller may have given up waiting.
                let _ = reply.send(result);
            }
            ActorMsg::TrackLoading { entry_id, token } => {
                if self.pending_skip.take() == Some(entry_id) {
                    debug!("entry {} was skipped before it loaded", entry_id);
                    token.cancel();
                }
                self.current = Some(CurrentTrack { entry_id, token });
            }
            ActorMsg::TrackStarted { entry_id } => {
                if self.current.as_ref().is_some_and(|c| c.entry_id == entry_id) {
                    self.set_state(PlayState::Playing);
                }
            }
            ActorMsg::TrackEnded { entry_id } => {
                self.last_ended = self.last_ended.max(Some(entry_id));
                if self.current.as_ref().is_some_and(|c| c.entry_id == entry_id) {
                    self.current = None;
                }
                self.set_state(PlayState::Stopped);
            }
        }
    }

    async fn apply(&mut self, cmd: Command, expect: Option<u64>) -> PlaybackResult<CommandOutcome> {
        let current_id = self.current.as_ref().map(|c| c.entry_id);

        if cmd == Command::Next {
            if let Some(expect) = expect {
                return Ok(self.skip_entry(expect, current_id));
            }
        }

        let step = transition(self.state, cmd, current_id.is_some());
        debug!("{:?} in {:?} -> {:?}", cmd, self.state, step);

        match step {
            Step::Stay => Ok(CommandOutcome::Unchanged(self.state)),
            Step::Latent => Ok(CommandOutcome::Latent),
            Step::NothingToSkip => Err(PlaybackError::QueueEmpty),
            Step::Skip => {
                if let Some(current) = &self.current {
                    current.token.cancel();
                }
                Ok(CommandOutcome::Skipped)
            }
            Step::Pause | Step::Resume => {
                if self.rendezvous_with_player().await {
                    let next = step.resulting_state(self.state);
                    self.set_state(next);
                    Ok(CommandOutcome::Changed(next))
                } else {
                    // The track ended before the player could answer.
                    Ok(CommandOutcome::Unchanged(self.state))
                }
            }
        }
    }

    fn skip_entry(&mut self, expect: u64, current_id: Option<u64>) -> CommandOutcome {
        match current_id {
            Some(id) if id == expect => {
                if let Some(current) = &self.current {
                    current.token.cancel();
                }
                CommandOutcome::Skipped
            }
            // Already gone; the requester's track is no longer playing.
            Some(id) if id > expect => CommandOutcome::Unchanged(self.state),
            _ if self.last_ended.is_some_and(|ended| expect <= ended) => {
                CommandOutcome::Unchanged(self.state)
            }
            _ => {
                self.pending_skip = Some(expect);
                CommandOutcome::Skipped
            }
        }
    }

    /// Block until the player takes the handshake. Returns `false` if the
    /// current track (or the session) ended first.
    async fn rendezvous_with_player(&self) -> bool {
        let Some(current) = &self.current else {
            return false;
        };
        tokio::select! {
            biased;
            _ = current.token.cancelled() => false,
            res = self.rendezvous.send_async(()) => res.is_ok(),
        }
    }
}

/// Handle used by the session to talk to its actor.
#[derive(Clone)]
pub(crate) struct ActorHandle {
    tx: flume::Sender<ActorMsg>,
}

impl ActorHandle {
    pub(crate) fn new(tx: flume::Sender<ActorMsg>) -> Self {
        Self { tx }
    }

    pub(crate) fn notify(&self, msg: ActorMsg) {
        // Only fails once the actor is gone, i.e. during teardown.
        let _ = self.tx.send(msg);
    }

    pub(crate) async fn command(
        &self,
        cmd: Command,
        expect: Option<u64>,
    ) -> PlaybackResult<CommandOutcome> {
        let (reply, rx) = flume::bounded(1);
        self.tx
            .send_async(ActorMsg::Command { cmd, expect, reply })
            .await
            .map_err(|_| PlaybackError::ScopeClosed)?;
        rx.recv_async().await.map_err(|_| PlaybackError::ScopeClosed)?
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    struct Harness {
        handle: ActorHandle,
        player_side: flume::Receiver<()>,
        state: Arc<AtomicU8>,
        scope: CancellationToken,
        task: tokio::task::JoinHandle<()>,
    }

    fn spawn() -> Harness {
        let (tx, rx) = flume::unbounded();
        let (rv_tx, rv_rx) = flume::bounded(0);
        let scope = CancellationToken::new();
        let state = Arc::new(AtomicU8::new(0));
        let actor = CommandActor::new(rx, rv_tx, scope.clone(), state.clone());
        let task = tokio::spawn(actor.run());
        Harness {
            handle: ActorHandle::new(tx),
            player_side: rv_rx,
            state,
            scope,
            task,
        }
    }

    fn state(h: &Harness) -> PlayState {
        PlayState::from_u8(h.state.load(Ordering::Acquire))
    }

    async fn start_track(h: &Harness, entry_id: u64) -> CancellationToken {
        let token = h.scope.child_token();
        h.handle.notify(ActorMsg::TrackLoading {
            entry_id,
            token: token.clone(),
        });
        h.handle.notify(ActorMsg::TrackStarted { entry_id });
        // Round-trip a no-op so both notifications have been applied.
        h.handle.command(Command::Play, None).await.unwrap();
        token
    }

    #[tokio::test]
    async fn pause_waits_for_the_player() {
        let h = spawn();
        start_track(&h, 1).await;
        assert_eq!(state(&h), PlayState::Playing);

        let pause = {
            let handle = h.handle.clone();
            tokio::spawn(async move { handle.command(Command::Pause, None).await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!pause.is_finished(), "pause reported before the player stopped");
        assert_eq!(state(&h), PlayState::Playing);

        h.player_side.recv_async().await.unwrap();
        let outcome = pause.await.unwrap().unwrap();
        assert_eq!(outcome, CommandOutcome::Changed(PlayState::Paused));
        assert_eq!(state(&h), PlayState::Paused);

        // Second pause is a no-op and must not block on the rendezvous.
        let outcome = tokio::time::timeout(
            Duration::from_millis(200),
            h.handle.command(Command::Pause, None),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(outcome, CommandOutcome::Unchanged(PlayState::Paused));

        let resume = {
            let handle = h.handle.clone();
            tokio::spawn(async move { handle.command(Command::Play, None).await })
        };
        h.player_side.recv_async().await.unwrap();
        assert_eq!(
            resume.await.unwrap().unwrap(),
            CommandOutcome::Changed(PlayState::Playing)
        );
    }

    #[tokio::test]
    async fn pause_gives_up_when_the_track_ends() {
        let h = spawn();
        let token = start_track(&h, 1).await;

        let pause = {
            let handle = h.handle.clone();
            tokio::spawn(async move { handle.command(Command::Pause, None).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();

        let outcome = tokio::time::timeout(Duration::from_secs(1), pause)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(outcome, CommandOutcome::Unchanged(PlayState::Playing));
    }

    #[tokio::test]
    async fn next_cancels_only_the_named_entry() {
        let h = spawn();
        let first = start_track(&h, 1).await;

        // A skip aimed at an older entry is ignored.
        assert_eq!(
            h.handle.command(Command::Next, Some(0)).await.unwrap(),
            CommandOutcome::Unchanged(PlayState::Playing)
        );
        assert!(!first.is_cancelled());

        assert_eq!(
            h.handle.command(Command::Next, Some(1)).await.unwrap(),
            CommandOutcome::Skipped
        );
        assert!(first.is_cancelled());
        // State only resets once dispatch reports the end.
        assert_eq!(state(&h), PlayState::Playing);
        h.handle.notify(ActorMsg::TrackEnded { entry_id: 1 });
        h.handle.command(Command::Pause, None).await.unwrap();
        assert_eq!(state(&h), PlayState::Stopped);
    }

    #[tokio::test]
    async fn skip_before_load_is_applied_on_pickup() {
        let h = spawn();
        assert_eq!(
            h.handle.command(Command::Next, Some(5)).await.unwrap(),
            CommandOutcome::Skipped
        );

        let token = start_track(&h, 5).await;
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn skip_of_an_ended_entry_changes_nothing() {
        let h = spawn();
        start_track(&h, 3).await;
        h.handle.notify(ActorMsg::TrackEnded { entry_id: 3 });

        assert_eq!(
            h.handle.command(Command::Next, Some(3)).await.unwrap(),
            CommandOutcome::Unchanged(PlayState::Stopped)
        );
        // Not remembered as a pending skip either.
        let next = start_track(&h, 4).await;
        assert!(!next.is_cancelled());
    }

    #[tokio::test]
    async fn next_without_track_is_rejected() {
        let h = spawn();
        assert!(matches!(
            h.handle.command(Command::Next, None).await,
            Err(PlaybackError::QueueEmpty)
        ));
        assert_eq!(
            h.handle.command(Command::Play, None).await.unwrap(),
            CommandOutcome::Latent
        );
    }

    #[tokio::test]
    async fn scope_cancellation_stops_the_actor() {
        let h = spawn();
        h.scope.cancel();
        tokio::time::timeout(Duration::from_secs(1), h.task)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            h.handle.command(Command::Play, None).await,
            Err(PlaybackError::ScopeClosed)
        ));
    }
}
