//! In-memory doubles for the engine's external collaborators.

use std::{
    collections::HashSet,
    io::Cursor,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::{
    audio::{
        frame::EncodedFrame,
        processor::{EncoderFactory, FrameEncoder},
    },
    common::{
        errors::{PlaybackError, PlaybackResult},
        types::{AudioFormat, ChannelId, GuildId},
    },
    configs::PlayerConfig,
    player::{PlaybackEvent, SessionDeps, TrackRef},
    sources::{AudioStream, MusicService},
    voice::{BoxedSink, SinkConnector, VoiceSink},
};

/// A 16-bit PCM WAV file holding `frames` frames of a constant value.
pub fn wav_bytes(sample_rate: u32, channels: u16, frames: u32) -> Vec<u8> {
    let data_len = frames * channels as u32 * 2;
    let mut out = Vec::with_capacity(44 + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVEfmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * channels as u32 * 2).to_le_bytes());
    out.extend_from_slice(&(channels * 2).to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for _ in 0..frames * channels as u32 {
        out.extend_from_slice(&1000i16.to_le_bytes());
    }
    out
}

pub fn temp_dir(prefix: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("eris-{}-{}", prefix, rand::random::<u64>()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Poll `cond` until it holds, failing the test after five seconds.
pub async fn eventually(cond: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Wait for the first event matching `pred`, skipping the rest.
pub async fn next_event(
    events: &flume::Receiver<PlaybackEvent>,
    pred: impl Fn(&PlaybackEvent) -> bool,
) -> PlaybackEvent {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv_async())
            .await
            .expect("no matching event in time")
            .expect("event channel closed");
        if pred(&event) {
            return event;
        }
    }
}

pub fn track(id: &str) -> TrackRef {
    TrackRef::new("static", id).with_title(id)
}

/// Records frames, paced like a real sink. Can be told to stall.
pub struct MemorySink {
    channel: ChannelId,
    pace: Duration,
    sent: Mutex<Vec<EncodedFrame>>,
    speaking: AtomicBool,
    speaking_log: Mutex<Vec<bool>>,
    connected: AtomicBool,
    stalled: AtomicBool,
    unstalled: Notify,
    disconnects: AtomicUsize,
}

impl MemorySink {
    pub fn new(channel: u64) -> Self {
        Self::with_pace(channel, Duration::from_millis(2))
    }

    pub fn with_pace(channel: u64, pace: Duration) -> Self {
        Self {
            channel: ChannelId(channel),
            pace,
            sent: Mutex::new(Vec::new()),
            speaking: AtomicBool::new(false),
            speaking_log: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
            stalled: AtomicBool::new(false),
            unstalled: Notify::new(),
            disconnects: AtomicUsize::new(0),
        }
    }

    pub fn sent(&self) -> Vec<EncodedFrame> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn speaking_changes(&self) -> Vec<bool> {
        self.speaking_log.lock().clone()
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    /// While stalled, `send` never returns.
    pub fn stall(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
        if !stalled {
            self.unstalled.notify_waiters();
        }
    }

    pub fn disconnect_now(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl VoiceSink for MemorySink {
    async fn send(&self, frame: EncodedFrame) -> PlaybackResult<()> {
        if !self.is_connected() {
            return Err(PlaybackError::SinkClosed("memory sink disconnected".into()));
        }
        loop {
            let unstalled = self.unstalled.notified();
            if !self.stalled.load(Ordering::SeqCst) {
                break;
            }
            unstalled.await;
        }
        tokio::time::sleep(self.pace).await;
        self.sent.lock().push(frame);
        Ok(())
    }

    async fn set_speaking(&self, speaking: bool) -> PlaybackResult<()> {
        self.speaking.store(speaking, Ordering::SeqCst);
        self.speaking_log.lock().push(speaking);
        Ok(())
    }

    async fn disconnect(&self) -> PlaybackResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }

    fn channel(&self) -> ChannelId {
        self.channel
    }
}

/// Hands out [`MemorySink`]s and keeps them for inspection.
#[derive(Default)]
pub struct MemoryConnector {
    sinks: Mutex<Vec<Arc<MemorySink>>>,
    refuse: AtomicBool,
}

impl MemoryConnector {
    pub fn last(&self) -> Option<Arc<MemorySink>> {
        self.sinks.lock().last().cloned()
    }

    pub fn connections(&self) -> usize {
        self.sinks.lock().len()
    }

    pub fn refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

#[async_trait]
impl SinkConnector for MemoryConnector {
    async fn connect(&self, guild: &GuildId, channel: ChannelId) -> PlaybackResult<BoxedSink> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(PlaybackError::SinkConnect(format!("guild {guild} refused")));
        }
        let sink = Arc::new(MemorySink::new(channel.0));
        self.sinks.lock().push(sink.clone());
        Ok(sink)
    }
}

/// Canned search results; downloads succeed instantly with an empty body
/// unless told otherwise.
pub struct StaticService {
    name: String,
    tracks: Vec<TrackRef>,
    failing: HashSet<String>,
    delay: Option<Duration>,
}

impl StaticService {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tracks: Vec::new(),
            failing: HashSet::new(),
            delay: None,
        }
    }

    pub fn with_tracks(mut self, ids: &[&str]) -> Self {
        self.tracks.extend(
            ids.iter()
                .map(|id| TrackRef::new(self.name.clone(), *id).with_title(*id)),
        );
        self
    }

    pub fn failing_on(mut self, identifier: &str) -> Self {
        self.failing.insert(identifier.to_string());
        self
    }

    pub fn with_download_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl MusicService for StaticService {
    fn name(&self) -> &str {
        &self.name
    }

    fn can_handle(&self, _identifier: &str) -> bool {
        false
    }

    async fn search(&self, query: &str, limit: usize) -> PlaybackResult<Vec<TrackRef>> {
        let query = query.to_lowercase();
        Ok(self
            .tracks
            .iter()
            .filter(|t| t.title.to_lowercase().contains(&query))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn download(&self, track: &TrackRef) -> PlaybackResult<AudioStream> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(&track.identifier) {
            return Err(PlaybackError::DownloadFailed(format!("{}: 404", track.identifier)));
        }
        Ok(AudioStream {
            source: Box::new(Cursor::new(Vec::<u8>::new())),
            format: AudioFormat::Unknown,
        })
    }
}

/// Emits `frames` one-byte frames per track, ignoring the input stream.
#[derive(Clone)]
pub struct SyntheticEncoder {
    frames: usize,
    fail_after: Option<usize>,
}

impl SyntheticEncoder {
    pub fn new(frames: usize) -> Self {
        Self {
            frames,
            fail_after: None,
        }
    }

    pub fn failing_after(mut self, frames: usize) -> Self {
        self.fail_after = Some(frames);
        self
    }

}

impl EncoderFactory for SyntheticEncoder {
    fn open(&self, _stream: AudioStream) -> PlaybackResult<Box<dyn FrameEncoder>> {
        Ok(Box::new(SyntheticFrames {
            remaining: self.frames,
            produced: 0,
            fail_after: self.fail_after,
        }))
    }
}

struct SyntheticFrames {
    remaining: usize,
    produced: usize,
    fail_after: Option<usize>,
}

impl FrameEncoder for SyntheticFrames {
    fn next_frame(&mut self) -> PlaybackResult<Option<EncodedFrame>> {
        if self.fail_after == Some(self.produced) {
            return Err(PlaybackError::EncodeFailed("synthetic failure".into()));
        }
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        self.produced += 1;
        Ok(Some(EncodedFrame::new(vec![(self.produced % 256) as u8])))
    }
}

/// Session collaborators wired to the doubles above.
pub struct TestRig {
    pub connector: Arc<MemoryConnector>,
    pub events: flume::Receiver<PlaybackEvent>,
    pub deps: SessionDeps,
}

impl TestRig {
    /// Every track is `frames` frames long; sends time out after 200 ms.
    pub fn new(frames: usize) -> Self {
        Self::with(StaticService::new("static"), SyntheticEncoder::new(frames), test_config())
    }

    pub fn with(service: StaticService, encoder: SyntheticEncoder, config: PlayerConfig) -> Self {
        let connector = Arc::new(MemoryConnector::default());
        let (tx, events) = flume::unbounded();
        let deps = SessionDeps {
            service: Arc::new(service),
            encoders: Arc::new(encoder),
            connector: connector.clone(),
            config,
            events: Some(tx),
        };
        Self {
            connector,
            events,
            deps,
        }
    }
}

pub fn test_config() -> PlayerConfig {
    PlayerConfig {
        frame_buffer_capacity: 64,
        send_timeout_ms: 200,
        leave_timeout_ms: 1_000,
    }
}
