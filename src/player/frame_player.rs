//! Drains a track's frame stream into the voice sink.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    audio::frame::EncodedFrame,
    voice::{BoxedSink, SinkSlot},
};

/// Why the player stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerExit {
    /// The frame stream closed.
    Finished,
    /// The track token fired (skip or teardown).
    Cancelled,
    /// The sink held one frame past the send timeout.
    Stalled,
    /// No sink, or the sink refused frames.
    SinkGone(String),
}

pub struct FramePlayer {
    sink: SinkSlot,
    rendezvous: flume::Receiver<()>,
    frames_processed: Arc<AtomicU64>,
    send_timeout: Duration,
}

impl FramePlayer {
    pub fn new(
        sink: SinkSlot,
        rendezvous: flume::Receiver<()>,
        frames_processed: Arc<AtomicU64>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            sink,
            rendezvous,
            frames_processed,
            send_timeout,
        }
    }

    /// Play until the stream ends, the token fires, or the sink fails. The
    /// sink is always left not speaking.
    pub async fn play(
        &self,
        frames: &flume::Receiver<EncodedFrame>,
        token: &CancellationToken,
    ) -> PlayerExit {
        let mut last_sink: Option<BoxedSink> = None;
        let exit = self.run(frames, token, &mut last_sink).await;

        if let Some(sink) = last_sink.or_else(|| self.sink.get()) {
            self.stop_speaking(&sink).await;
        }
        exit
    }

    async fn run(
        &self,
        frames: &flume::Receiver<EncodedFrame>,
        token: &CancellationToken,
        last_sink: &mut Option<BoxedSink>,
    ) -> PlayerExit {
        loop {
            let frame = tokio::select! {
                biased;
                _ = token.cancelled() => return PlayerExit::Cancelled,
                Ok(()) = self.rendezvous.recv_async() => {
                    debug!("player paused");
                    if !self.wait_for_resume(token).await {
                        return PlayerExit::Cancelled;
                    }
                    debug!("player resumed");
                    continue;
                }
                frame = frames.recv_async() => match frame {
                    Ok(frame) => frame,
                    Err(_) => return PlayerExit::Finished,
                },
            };

            let Some(sink) = self.sink.get().filter(|s| s.is_connected()) else {
                return PlayerExit::SinkGone("no connected sink".into());
            };
            if !last_sink.as_ref().is_some_and(|s| Arc::ptr_eq(s, &sink)) {
                // New track or a switched sink.
                if let Some(old) = last_sink.take() {
                    self.stop_speaking(&old).await;
                }
                if let Err(e) = sink.set_speaking(true).await {
                    warn!("failed to set speaking: {}", e);
                }
                *last_sink = Some(sink.clone());
            }

            let sent = tokio::select! {
                biased;
                _ = token.cancelled() => return PlayerExit::Cancelled,
                res = tokio::time::timeout(self.send_timeout, sink.send(frame)) => res,
            };

            match sent {
                Ok(Ok(())) => {
                    self.frames_processed.fetch_add(1, Ordering::Relaxed);
                }
                Ok(Err(e)) => {
                    warn!("sink rejected frame: {}", e);
                    return PlayerExit::SinkGone(e.to_string());
                }
                Err(_) => {
                    warn!(
                        "sink did not accept a frame within {} ms",
                        self.send_timeout.as_millis()
                    );
                    return PlayerExit::Stalled;
                }
            }
        }
    }

    /// Second half of the pause handshake. `false` if cancelled while paused.
    async fn wait_for_resume(&self, token: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            _ = token.cancelled() => false,
            res = self.rendezvous.recv_async() => res.is_ok(),
        }
    }

    async fn stop_speaking(&self, sink: &BoxedSink) {
        if !sink.is_speaking() {
            return;
        }
        match tokio::time::timeout(self.send_timeout, sink.set_speaking(false)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("failed to clear speaking: {}", e),
            Err(_) => warn!("clearing speaking timed out"),
        }
    }
}
