//! Loader/encoder pipeline: download one track and transcode it into a
//! bounded stream of encoded frames on a blocking thread.

use std::sync::Arc;

use flume::SendTimeoutError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    audio::{
        constants::ENCODER_PUSH_POLL,
        frame::EncodedFrame,
        processor::{EncoderFactory, FrameEncoder},
    },
    common::errors::{PlaybackError, PlaybackResult},
    player::track::AuthoredTrack,
    sources::BoxedService,
};

/// Frames for one track plus the worker producing them.
pub struct FrameStream {
    pub frames: flume::Receiver<EncodedFrame>,
    /// Resolves to the number of frames produced, or the encode error.
    pub worker: JoinHandle<PlaybackResult<u64>>,
}

impl FrameStream {
    /// Wait for the encoder to wind down and report how it ended.
    pub async fn finish(self) -> PlaybackResult<u64> {
        drop(self.frames);
        match self.worker.await {
            Ok(result) => result,
            Err(e) => Err(PlaybackError::EncodeFailed(format!("encoder task failed: {e}"))),
        }
    }
}

#[derive(Clone)]
pub struct Loader {
    service: BoxedService,
    encoders: Arc<dyn EncoderFactory>,
    capacity: usize,
}

impl Loader {
    pub fn new(service: BoxedService, encoders: Arc<dyn EncoderFactory>, capacity: usize) -> Self {
        Self {
            service,
            encoders,
            capacity: capacity.max(1),
        }
    }

    /// Download `entry` and start encoding it. A failed download is final for
    /// this track; cancellation before the download finishes yields
    /// `ScopeClosed`.
    pub async fn load(
        &self,
        entry: &AuthoredTrack,
        token: CancellationToken,
    ) -> PlaybackResult<FrameStream> {
        let stream = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(PlaybackError::ScopeClosed),
            res = self.service.download(&entry.track) => res?,
        };
        debug!("downloaded '{}' ({:?})", entry.track.title, stream.format);

        let (tx, frames) = flume::bounded(self.capacity);
        let encoders = self.encoders.clone();
        let worker = tokio::task::spawn_blocking(move || {
            let mut encoder = encoders.open(stream)?;
            encode_into(encoder.as_mut(), &tx, &token)
        });

        Ok(FrameStream { frames, worker })
    }
}

/// Pull frames until end of stream, cancellation, or the player hanging up.
/// Never parks on a full buffer for longer than one poll interval.
fn encode_into(
    encoder: &mut dyn FrameEncoder,
    tx: &flume::Sender<EncodedFrame>,
    token: &CancellationToken,
) -> PlaybackResult<u64> {
    let mut produced = 0u64;

    while !token.is_cancelled() {
        let mut frame = match encoder.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                warn!("encoder failed after {} frames: {}", produced, e);
                return Err(e);
            }
        };

        loop {
            match tx.send_timeout(frame, ENCODER_PUSH_POLL) {
                Ok(()) => break,
                Err(SendTimeoutError::Timeout(back)) => {
                    if token.is_cancelled() {
                        return Ok(produced);
                    }
                    frame = back;
                }
                Err(SendTimeoutError::Disconnected(_)) => return Ok(produced),
            }
        }
        produced += 1;
    }

    Ok(produced)
}
