use std::{
    fs::File,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use symphonia::core::{
    codecs::CODEC_TYPE_NULL,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::{MetadataOptions, StandardTagKey, Tag},
    probe::Hint,
};
use tracing::{debug, warn};

use crate::{
    common::{
        errors::{PlaybackError, PlaybackResult},
        types::AudioFormat,
    },
    player::track::TrackRef,
    sources::plugin::{AudioStream, MusicService},
};

/// Serves audio files from a music directory. Searching matches file names.
pub struct LocalSource {
    root: PathBuf,
}

impl LocalSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn strip_scheme(identifier: &str) -> &str {
        identifier.strip_prefix("file://").unwrap_or(identifier)
    }

    fn is_audio_file(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(AudioFormat::from_ext)
            .is_some_and(|f| f != AudioFormat::Unknown)
    }

    /// Files under `root` whose name contains every query word, in path order.
    fn find_matches(root: &Path, query: &str, limit: usize) -> Vec<PathBuf> {
        let words: Vec<String> = query
            .split_whitespace()
            .map(|w| w.to_lowercase())
            .collect();

        let mut found = Vec::new();
        let mut dirs = vec![root.to_path_buf()];
        while let Some(dir) = dirs.pop() {
            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Local source: cannot read '{}': {}", dir.display(), e);
                    continue;
                }
            };

            let mut paths: Vec<PathBuf> = entries.filter_map(|e| e.ok().map(|e| e.path())).collect();
            paths.sort();

            for path in paths {
                if path.is_dir() {
                    dirs.push(path);
                    continue;
                }
                if !Self::is_audio_file(&path) {
                    continue;
                }
                let name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or_default()
                    .to_lowercase();
                if words.iter().all(|w| name.contains(w.as_str())) {
                    found.push(path);
                    if found.len() >= limit {
                        return found;
                    }
                }
            }
        }
        found
    }

    /// Read tags and duration; falls back to the file stem as title.
    fn probe_file(path: &Path) -> PlaybackResult<TrackRef> {
        let file = File::open(path)?;
        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let mss = MediaSourceStream::new(Box::new(file), Default::default());
        let mut probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| PlaybackError::Unsupported(format!("{}: {}", path.display(), e)))?;

        let duration_ms = probed
            .format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .and_then(|t| Some((t.codec_params.n_frames?, t.codec_params.sample_rate?)))
            .map(|(frames, rate)| frames * 1000 / rate.max(1) as u64)
            .unwrap_or(0);

        let mut title = None;
        let mut artist = None;
        let mut collect = |tags: &[Tag]| {
            for tag in tags {
                match tag.std_key {
                    Some(StandardTagKey::TrackTitle) if title.is_none() => {
                        title = Some(tag.value.to_string())
                    }
                    Some(StandardTagKey::Artist) | Some(StandardTagKey::AlbumArtist)
                        if artist.is_none() =>
                    {
                        artist = Some(tag.value.to_string())
                    }
                    _ => {}
                }
            }
        };
        // Tags can sit in the container or ahead of it (ID3).
        if let Some(meta) = probed.format.metadata().current() {
            collect(meta.tags());
        }
        if let Some(meta) = probed.metadata.get().as_ref().and_then(|m| m.current()) {
            collect(meta.tags());
        }

        let identifier = path.to_string_lossy().into_owned();
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Unknown")
            .to_string();

        let mut track = TrackRef::new("local", identifier.clone())
            .with_title(title.unwrap_or(stem))
            .with_duration_ms(duration_ms)
            .with_uri(format!("file://{}", identifier));
        if let Some(artist) = artist {
            track = track.with_artist(artist);
        }
        Ok(track)
    }
}

#[async_trait]
impl MusicService for LocalSource {
    fn name(&self) -> &str {
        "local"
    }

    fn can_handle(&self, identifier: &str) -> bool {
        Path::new(Self::strip_scheme(identifier)).is_file()
    }

    async fn search(&self, query: &str, limit: usize) -> PlaybackResult<Vec<TrackRef>> {
        let root = self.root.clone();
        let query = query.to_string();

        let tracks = tokio::task::spawn_blocking(move || {
            let direct = Path::new(Self::strip_scheme(&query));
            let paths = if direct.is_file() {
                vec![direct.to_path_buf()]
            } else {
                Self::find_matches(&root, &query, limit)
            };

            paths
                .iter()
                .filter_map(|p| match Self::probe_file(p) {
                    Ok(track) => Some(track),
                    Err(e) => {
                        warn!("Local source: skipping '{}': {}", p.display(), e);
                        None
                    }
                })
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| PlaybackError::Unsupported(format!("local search task failed: {e}")))?;

        debug!("Local source: {} result(s)", tracks.len());
        Ok(tracks)
    }

    async fn download(&self, track: &TrackRef) -> PlaybackResult<AudioStream> {
        let path = PathBuf::from(Self::strip_scheme(&track.identifier));
        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| PlaybackError::DownloadFailed(format!("{}: {}", path.display(), e)))?
            .into_std()
            .await;

        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .map(AudioFormat::from_ext)
            .unwrap_or(AudioFormat::Unknown);

        Ok(AudioStream {
            source: Box::new(file),
            format,
        })
    }
}
