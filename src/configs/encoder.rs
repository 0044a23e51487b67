use serde::{Deserialize, Serialize};

use crate::audio::constants::DEFAULT_BITRATE;

/// The single Opus profile every track is transcoded to.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct EncoderConfig {
    /// Target bitrate in bits per second.
    pub bitrate: i32,
    pub application: EncoderApplication,
    pub resampler: ResamplerQuality,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            bitrate: DEFAULT_BITRATE,
            application: EncoderApplication::Audio,
            resampler: ResamplerQuality::Hermite,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EncoderApplication {
    #[default]
    Audio,
    Voip,
    LowDelay,
}

impl From<EncoderApplication> for audiopus::Application {
    fn from(app: EncoderApplication) -> Self {
        match app {
            EncoderApplication::Audio => audiopus::Application::Audio,
            EncoderApplication::Voip => audiopus::Application::Voip,
            EncoderApplication::LowDelay => audiopus::Application::LowDelay,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResamplerQuality {
    Linear,
    #[default]
    Hermite,
}
