use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct SourcesConfig {
    pub local: bool,
    pub http: bool,
    /// Root directory searched by the local source.
    pub music_dir: String,
    /// Candidates returned per search when the caller gives no limit.
    pub search_limit: usize,
    pub http_timeout_secs: u64,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            local: true,
            http: true,
            music_dir: "music".to_string(),
            search_limit: 5,
            http_timeout_secs: 15,
        }
    }
}
