use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{common::types::AnyResult, configs::*};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    pub fn load() -> AnyResult<Self> {
        let config_path = if Path::new("config.toml").exists() {
            "config.toml"
        } else if Path::new("config.default.toml").exists() {
            "config.default.toml"
        } else {
            return Err("config.toml or config.default.toml not found".into());
        };

        crate::log_println!("Loading configuration from: {}", config_path);
        Self::load_from(config_path)
    }

    pub fn load_from(path: impl AsRef<Path>) -> AnyResult<Self> {
        let path = path.as_ref();
        let config_str = std::fs::read_to_string(path)?;
        if config_str.trim().is_empty() {
            return Err(format!("{} is empty", path.display()).into());
        }
        Self::from_toml_str(&config_str)
    }

    pub fn from_toml_str(s: &str) -> AnyResult<Self> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> AnyResult<()> {
        if self.player.frame_buffer_capacity == 0 {
            return Err("player.frame_buffer_capacity must be greater than zero".into());
        }
        if self.player.send_timeout_ms == 0 {
            return Err("player.send_timeout_ms must be greater than zero".into());
        }
        if self.sink.mode != CryptoMode::None && self.sink.secret_key.is_none() {
            return Err("sink.secret_key is required when sink.mode is not \"none\"".into());
        }
        Ok(())
    }
}
