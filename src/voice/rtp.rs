//! RTP/UDP voice sink.
//!
//! Frames are wrapped in a 12-byte RTP header and, when a key is configured,
//! sealed secretbox-style with XSalsa20-Poly1305 (`header | tag | ciphertext`,
//! nonce = header zero-padded to 24 bytes).

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use tokio::{
    net::UdpSocket,
    sync::Mutex,
    time::{Interval, MissedTickBehavior},
};
use tracing::{debug, info};
use xsalsa20poly1305::{
    XSalsa20Poly1305,
    aead::{AeadInPlace, KeyInit},
};

use crate::{
    audio::{
        constants::{FRAME_DURATION, SAMPLES_PER_CHANNEL, SILENCE_FRAME, SILENCE_FRAME_COUNT},
        frame::EncodedFrame,
    },
    common::{
        errors::{PlaybackError, PlaybackResult},
        types::{ChannelId, GuildId},
    },
    configs::{CryptoMode, SinkConfig},
    voice::sink::{BoxedSink, SinkConnector, VoiceSink},
};

const RTP_VERSION_BYTE: u8 = 0x80;
const RTP_OPUS_PAYLOAD_TYPE: u8 = 0x78;
const RTP_MARKER_BIT: u8 = 0x80;
const RTP_HEADER_LEN: usize = 12;
const TAG_LEN: usize = 16;
const UDP_PACKET_BUF_CAPACITY: usize = 1_460;

/// Builds RTP packets for a single SSRC.
pub struct RtpPacketizer {
    ssrc: u32,
    sequence: u16,
    timestamp: u32,
    cipher: Option<XSalsa20Poly1305>,
    buf: Vec<u8>,
}

impl RtpPacketizer {
    pub fn new(ssrc: u32, secret_key: Option<[u8; 32]>) -> Self {
        Self {
            ssrc,
            sequence: rand::random(),
            timestamp: rand::random(),
            cipher: secret_key.map(|key| XSalsa20Poly1305::new(&key.into())),
            buf: Vec::with_capacity(UDP_PACKET_BUF_CAPACITY),
        }
    }

    /// Wrap `payload` and advance sequence and timestamp.
    pub fn packetize(&mut self, payload: &[u8], marker: bool) -> PlaybackResult<&[u8]> {
        let mut header = [0u8; RTP_HEADER_LEN];
        header[0] = RTP_VERSION_BYTE;
        header[1] = RTP_OPUS_PAYLOAD_TYPE | if marker { RTP_MARKER_BIT } else { 0 };
        header[2..4].copy_from_slice(&self.sequence.to_be_bytes());
        header[4..8].copy_from_slice(&self.timestamp.to_be_bytes());
        header[8..12].copy_from_slice(&self.ssrc.to_be_bytes());

        self.sequence = self.sequence.wrapping_add(1);
        self.timestamp = self.timestamp.wrapping_add(SAMPLES_PER_CHANNEL as u32);

        self.buf.clear();
        self.buf.extend_from_slice(&header);

        match &self.cipher {
            None => self.buf.extend_from_slice(payload),
            Some(cipher) => {
                let mut nonce = [0u8; 24];
                nonce[..RTP_HEADER_LEN].copy_from_slice(&header);

                self.buf.extend_from_slice(&[0u8; TAG_LEN]);
                self.buf.extend_from_slice(payload);
                let tag = cipher
                    .encrypt_in_place_detached(
                        &nonce.into(),
                        b"",
                        &mut self.buf[RTP_HEADER_LEN + TAG_LEN..],
                    )
                    .map_err(|e| PlaybackError::SinkClosed(format!("encryption error: {e:?}")))?;
                self.buf[RTP_HEADER_LEN..RTP_HEADER_LEN + TAG_LEN].copy_from_slice(&tag);
            }
        }

        Ok(&self.buf)
    }
}

struct RtpState {
    packetizer: RtpPacketizer,
    interval: Interval,
    /// Set once speaking starts; the next packet carries the marker bit.
    talkspurt_start: bool,
}

pub struct RtpSink {
    channel: ChannelId,
    socket: Arc<UdpSocket>,
    address: SocketAddr,
    state: Mutex<RtpState>,
    connected: AtomicBool,
    speaking: AtomicBool,
}

impl RtpSink {
    pub fn new(
        channel: ChannelId,
        socket: Arc<UdpSocket>,
        address: SocketAddr,
        ssrc: u32,
        secret_key: Option<[u8; 32]>,
    ) -> Self {
        let mut interval = tokio::time::interval(FRAME_DURATION);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self {
            channel,
            socket,
            address,
            state: Mutex::new(RtpState {
                packetizer: RtpPacketizer::new(ssrc, secret_key),
                interval,
                talkspurt_start: false,
            }),
            connected: AtomicBool::new(true),
            speaking: AtomicBool::new(false),
        }
    }

    async fn send_paced(&self, state: &mut RtpState, payload: &[u8]) -> PlaybackResult<()> {
        if !self.is_connected() {
            return Err(PlaybackError::SinkClosed("sink disconnected".into()));
        }

        state.interval.tick().await;
        let marker = std::mem::take(&mut state.talkspurt_start);
        let packet = state.packetizer.packetize(payload, marker)?;
        self.socket
            .send_to(packet, self.address)
            .await
            .map_err(|e| PlaybackError::SinkClosed(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl VoiceSink for RtpSink {
    async fn send(&self, frame: EncodedFrame) -> PlaybackResult<()> {
        let mut state = self.state.lock().await;
        self.send_paced(&mut state, frame.as_bytes()).await
    }

    async fn set_speaking(&self, speaking: bool) -> PlaybackResult<()> {
        let was_speaking = self.speaking.swap(speaking, Ordering::AcqRel);
        if was_speaking == speaking {
            return Ok(());
        }

        let mut state = self.state.lock().await;
        if speaking {
            state.talkspurt_start = true;
            return Ok(());
        }

        // Trailing silence keeps receivers from interpolating past the end.
        if self.is_connected() {
            for _ in 0..SILENCE_FRAME_COUNT {
                self.send_paced(&mut state, &SILENCE_FRAME).await?;
            }
        }
        Ok(())
    }

    async fn disconnect(&self) -> PlaybackResult<()> {
        if self.connected.swap(false, Ordering::AcqRel) {
            info!("RTP sink for channel {} disconnected", self.channel);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::Acquire)
    }

    fn channel(&self) -> ChannelId {
        self.channel
    }
}

/// Connects every channel to the RTP endpoint named in `[sink]`.
pub struct RtpConnector {
    config: SinkConfig,
    secret_key: Option<[u8; 32]>,
}

impl RtpConnector {
    pub fn new(config: SinkConfig) -> PlaybackResult<Self> {
        let secret_key = match (config.mode, &config.secret_key) {
            (CryptoMode::None, _) => None,
            (CryptoMode::Xsalsa20Poly1305, None) => {
                return Err(PlaybackError::Config("sink.secret_key is required".into()));
            }
            (CryptoMode::Xsalsa20Poly1305, Some(hex_key)) => {
                let bytes = hex::decode(hex_key.trim())
                    .map_err(|e| PlaybackError::Config(format!("sink.secret_key: {e}")))?;
                let key: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
                    PlaybackError::Config(format!("sink.secret_key must be 32 bytes, got {}", b.len()))
                })?;
                Some(key)
            }
        };

        Ok(Self { config, secret_key })
    }
}

#[async_trait]
impl SinkConnector for RtpConnector {
    async fn connect(&self, guild: &GuildId, channel: ChannelId) -> PlaybackResult<BoxedSink> {
        let address = tokio::net::lookup_host(&self.config.address)
            .await
            .map_err(|e| PlaybackError::SinkConnect(format!("{}: {e}", self.config.address)))?
            .next()
            .ok_or_else(|| {
                PlaybackError::SinkConnect(format!("{}: no address", self.config.address))
            })?;

        let socket = UdpSocket::bind(&self.config.bind)
            .await
            .map_err(|e| PlaybackError::SinkConnect(format!("bind {}: {e}", self.config.bind)))?;

        let ssrc = if self.config.ssrc == 0 {
            rand::random()
        } else {
            self.config.ssrc
        };

        debug!(
            "guild {} channel {}: RTP to {} (ssrc {}, encrypted: {})",
            guild,
            channel,
            address,
            ssrc,
            self.secret_key.is_some()
        );

        Ok(Arc::new(RtpSink::new(
            channel,
            Arc::new(socket),
            address,
            ssrc,
            self.secret_key,
        )))
    }
}
