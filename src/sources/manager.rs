use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{
    http::HttpSource,
    local::LocalSource,
    plugin::{AudioStream, BoxedService, MusicService},
};
use crate::{
    common::errors::{PlaybackError, PlaybackResult},
    configs::SourcesConfig,
    player::track::TrackRef,
};

/// Routes searches and downloads across the registered services.
///
/// Direct references (paths, URLs) go to the first service that claims them;
/// free-text queries are tried against each service in registration order
/// until `limit` candidates are collected.
pub struct SourceManager {
    services: Vec<BoxedService>,
    search_limit: usize,
}

impl SourceManager {
    pub fn new(config: &SourcesConfig) -> Self {
        let mut manager = Self::empty(config.search_limit);

        if config.local {
            info!("Loaded source: local ({})", config.music_dir);
            manager.register(Arc::new(LocalSource::new(&config.music_dir)));
        }
        if config.http {
            match HttpSource::new(Duration::from_secs(config.http_timeout_secs)) {
                Ok(src) => {
                    info!("Loaded source: http");
                    manager.register(Arc::new(src));
                }
                Err(e) => warn!("http source failed to initialize: {}", e),
            }
        }

        manager
    }

    pub fn empty(search_limit: usize) -> Self {
        Self {
            services: Vec::new(),
            search_limit: search_limit.max(1),
        }
    }

    pub fn register(&mut self, service: BoxedService) {
        self.services.push(service);
    }

    pub fn names(&self) -> Vec<String> {
        self.services.iter().map(|s| s.name().to_string()).collect()
    }

    fn by_name(&self, name: &str) -> Option<&BoxedService> {
        self.services.iter().find(|s| s.name() == name)
    }
}

#[async_trait]
impl MusicService for SourceManager {
    fn name(&self) -> &str {
        "manager"
    }

    fn can_handle(&self, identifier: &str) -> bool {
        self.services.iter().any(|s| s.can_handle(identifier))
    }

    async fn search(&self, query: &str, limit: usize) -> PlaybackResult<Vec<TrackRef>> {
        let limit = if limit == 0 { self.search_limit } else { limit };

        if let Some(service) = self.services.iter().find(|s| s.can_handle(query)) {
            debug!("{} handles '{}' directly", service.name(), query);
            let mut results = service.search(query, limit).await?;
            results.truncate(limit);
            return Ok(results);
        }

        let mut results = Vec::new();
        let mut last_err = None;
        for service in &self.services {
            if results.len() >= limit {
                break;
            }
            match service.search(query, limit - results.len()).await {
                Ok(found) => results.extend(found),
                Err(e) => {
                    warn!("{} search failed: {}", service.name(), e);
                    last_err = Some(e);
                }
            }
        }
        results.truncate(limit);

        // Only surface an error when nothing at all came back.
        match last_err {
            Some(e) if results.is_empty() => Err(e),
            _ => Ok(results),
        }
    }

    async fn download(&self, track: &TrackRef) -> PlaybackResult<AudioStream> {
        match self.by_name(&track.source_name) {
            Some(service) => service.download(track).await,
            None => Err(PlaybackError::DownloadFailed(format!(
                "no source named '{}' is registered",
                track.source_name
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticService;

    fn manager() -> SourceManager {
        let mut manager = SourceManager::empty(5);
        manager.register(Arc::new(
            StaticService::new("alpha").with_tracks(&["one", "two", "three"]),
        ));
        manager.register(Arc::new(
            StaticService::new("beta").with_tracks(&["four", "five", "six"]),
        ));
        manager
    }

    #[tokio::test]
    async fn search_fills_limit_across_services() {
        let manager = manager();
        let results = manager.search("", 0).await.unwrap();
        let titles: Vec<_> = results.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, ["one", "two", "three", "four", "five"]);

        let results = manager.search("", 2).await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn download_routes_by_source_name() {
        let manager = manager();
        let track = TrackRef::new("beta", "four");
        assert!(manager.download(&track).await.is_ok());

        let orphan = TrackRef::new("gamma", "x");
        let err = manager.download(&orphan).await.unwrap_err();
        assert!(err.is_track_fatal());
    }
}
