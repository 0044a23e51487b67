use std::{io::Cursor, time::Duration};

use async_trait::async_trait;
use bytes::BytesMut;
use regex::Regex;
use tracing::debug;

use crate::{
    audio::demux::format::{SNIFF_LEN, detect_format},
    common::{
        errors::{PlaybackError, PlaybackResult},
        types::{AnyResult, AudioFormat},
    },
    player::track::TrackRef,
    sources::plugin::{AudioStream, MusicService},
};

const USER_AGENT: &str = concat!("eris-audio/", env!("CARGO_PKG_VERSION"));

/// Largest body a download may buffer.
pub const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Plays direct links to audio files. It has nothing to search, so a query
/// only resolves when it is itself a URL.
pub struct HttpSource {
    client: reqwest::Client,
    url_regex: Regex,
    timeout: Duration,
    max_body: usize,
}

impl HttpSource {
    /// `timeout` bounds the wait for response headers and each body read,
    /// not the whole transfer, so long tracks still download.
    pub fn new(timeout: Duration) -> AnyResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .read_timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            client,
            url_regex: Regex::new(r"^https?://")?,
            timeout,
            max_body: MAX_BODY_BYTES,
        })
    }

    pub fn with_max_body(mut self, max_body: usize) -> Self {
        self.max_body = max_body;
        self
    }

    /// Last path segment without the query string.
    fn title_from_url(url: &str) -> String {
        url.split(['?', '#'])
            .next()
            .and_then(|s| s.trim_end_matches('/').rsplit('/').next())
            .filter(|s| !s.is_empty())
            .unwrap_or("Unknown Title")
            .to_string()
    }
}

#[async_trait]
impl MusicService for HttpSource {
    fn name(&self) -> &str {
        "http"
    }

    fn can_handle(&self, identifier: &str) -> bool {
        self.url_regex.is_match(identifier)
    }

    async fn search(&self, query: &str, _limit: usize) -> PlaybackResult<Vec<TrackRef>> {
        let query = query.trim();
        if !self.can_handle(query) {
            return Ok(Vec::new());
        }
        Ok(vec![
            TrackRef::new("http", query)
                .with_title(Self::title_from_url(query))
                .with_uri(query),
        ])
    }

    async fn download(&self, track: &TrackRef) -> PlaybackResult<AudioStream> {
        let url = &track.identifier;
        debug!("HTTP source: fetching {}", url);

        let fail = |e: reqwest::Error| PlaybackError::DownloadFailed(format!("{url}: {e}"));

        let mut response = tokio::time::timeout(self.timeout, self.client.get(url).send())
            .await
            .map_err(|_| PlaybackError::DownloadFailed(format!("{url}: no response headers")))?
            .and_then(|r| r.error_for_status())
            .map_err(fail)?;

        let too_large = || {
            PlaybackError::DownloadFailed(format!("{url}: body exceeds {} bytes", self.max_body))
        };
        if response
            .content_length()
            .is_some_and(|len| len > self.max_body as u64)
        {
            return Err(too_large());
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await.map_err(fail)? {
            if body.len() + chunk.len() > self.max_body {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }
        let body = body.freeze();

        if body.is_empty() {
            return Err(PlaybackError::DownloadFailed(format!("{url}: empty body")));
        }

        // Content-Type first, then the URL, then the bytes themselves.
        let format = [
            content_type.as_deref().map(AudioFormat::from_mime),
            Some(AudioFormat::from_url(url)),
            Some(detect_format(&body[..body.len().min(SNIFF_LEN)])),
        ]
        .into_iter()
        .flatten()
        .find(|f| *f != AudioFormat::Unknown)
        .unwrap_or(AudioFormat::Unknown);

        debug!("HTTP source: {} bytes, {:?}", body.len(), format);
        Ok(AudioStream {
            source: Box::new(Cursor::new(body)),
            format,
        })
    }
}

#[cfg(test)]
mod tests {
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    use super::*;
    use crate::testing::wav_bytes;

    /// Serves `body` once with the given status line and content type.
    async fn serve_once(status: &'static str, content_type: &'static str, body: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut req = [0u8; 1024];
            let _ = socket.read(&mut req).await;
            let head = format!(
                "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(&body).await.unwrap();
        });
        format!("http://{addr}/tracks/tone")
    }

    #[tokio::test]
    async fn urls_resolve_to_a_single_candidate() {
        let source = HttpSource::new(Duration::from_secs(5)).unwrap();
        let results = source
            .search("https://cdn.example/music/song.mp3?sig=1", 5)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "song.mp3");

        assert!(source.search("never gonna", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn download_sniffs_format_when_headers_are_vague() {
        let url = serve_once("200 OK", "application/octet-stream", wav_bytes(48_000, 2, 960)).await;
        let source = HttpSource::new(Duration::from_secs(5)).unwrap();

        let stream = source.download(&TrackRef::new("http", url)).await.unwrap();
        assert_eq!(stream.format, AudioFormat::Wav);
    }

    #[tokio::test]
    async fn oversized_bodies_are_refused() {
        let url = serve_once("200 OK", "audio/wav", wav_bytes(48_000, 2, 960)).await;
        let source = HttpSource::new(Duration::from_secs(5)).unwrap().with_max_body(1024);

        let err = source.download(&TrackRef::new("http", url)).await.unwrap_err();
        assert!(matches!(err, PlaybackError::DownloadFailed(msg) if msg.contains("exceeds")));
    }

    #[tokio::test]
    async fn silent_servers_fail_within_the_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut req = [0u8; 1024];
            let _ = socket.read(&mut req).await;
            // Hold the connection open without answering.
            tokio::time::sleep(Duration::from_secs(30)).await;
        });
        let source = HttpSource::new(Duration::from_millis(200)).unwrap();

        let started = std::time::Instant::now();
        let err = source
            .download(&TrackRef::new("http", format!("http://{addr}/slow")))
            .await
            .unwrap_err();
        assert!(matches!(err, PlaybackError::DownloadFailed(_)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn http_errors_are_download_failures() {
        let url = serve_once("404 Not Found", "text/plain", b"gone".to_vec()).await;
        let source = HttpSource::new(Duration::from_secs(5)).unwrap();

        let err = source.download(&TrackRef::new("http", url)).await.unwrap_err();
        assert!(matches!(err, PlaybackError::DownloadFailed(_)));
    }
}
