use serde::{Deserialize, Serialize};

use crate::common::types::UserId;

/// A search result from a music service. Opaque to the engine apart from
/// the fields it shows in status output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackRef {
    /// Service-specific handle passed back to `download` (path, URL, id).
    pub identifier: String,
    pub title: String,
    pub artist: String,
    /// Track length in milliseconds, 0 when unknown.
    pub duration_ms: u64,
    pub uri: Option<String>,
    /// Name of the service that produced this result.
    pub source_name: String,
}

impl TrackRef {
    pub fn new(source_name: impl Into<String>, identifier: impl Into<String>) -> Self {
        let identifier = identifier.into();
        Self {
            title: identifier.clone(),
            identifier,
            artist: "Unknown Artist".to_string(),
            duration_ms: 0,
            uri: None,
            source_name: source_name.into(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = artist.into();
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }
}

impl std::fmt::Display for TrackRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.artist, self.title)
    }
}

/// A queued track plus whoever queued it.
///
/// `id` is assigned by the queue and is unique per session; it lets skips
/// name the exact entry they meant to abort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthoredTrack {
    pub id: u64,
    pub track: TrackRef,
    pub author_id: UserId,
    pub author_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_fills_display_fields() {
        let track = TrackRef::new("local", "/music/a.flac")
            .with_title("Song A")
            .with_artist("Band")
            .with_duration_ms(180_000);
        assert_eq!(track.to_string(), "Band - Song A");
        assert_eq!(track.identifier, "/music/a.flac");
    }

    #[test]
    fn serializes_camelcase() {
        let entry = AuthoredTrack {
            id: 7,
            track: TrackRef::new("http", "https://x/y.mp3"),
            author_id: UserId(42),
            author_name: "ada".into(),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["authorId"], 42);
        assert_eq!(json["authorName"], "ada");
        assert_eq!(json["track"]["sourceName"], "http");
        assert_eq!(json["track"]["durationMs"], 0);
    }
}
