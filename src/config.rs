use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;

use crate::audio::{AudioSource, CaptureConfig};

/// Prefix for environment overrides, e.g. `SOCRATES_PROVIDER__MODEL=gpt-4o`
pub const ENV_PREFIX: &str = "SOCRATES";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub frontend: FrontendConfig,
    pub capture: CaptureSettings,
    pub provider: ProviderConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub bind: String,
    pub port: u16,
    /// Shared secret; accepted but not enforced on the wire
    pub password: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 9999,
            password: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FrontendConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub retry_interval_ms: u64,
    /// Larger than `retry_interval_ms` enables capped exponential backoff
    pub max_retry_interval_ms: u64,
    pub connect_timeout_ms: u64,
    pub handshake_timeout_ms: u64,
    pub keepalive_interval_ms: Option<u64>,
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9999,
            password: String::new(),
            retry_interval_ms: 2000,
            max_retry_interval_ms: 2000,
            connect_timeout_ms: 5000,
            handshake_timeout_ms: 5000,
            keepalive_interval_ms: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// "default", "synthetic" or "file"
    pub source: String,
    pub file_path: Option<String>,
    pub sample_rate: u32,
    pub channels: u16,
    pub chunk_frames: usize,
    pub poll_interval_ms: u64,
    pub open_timeout_ms: u64,
    pub stop_timeout_ms: u64,
    /// Save every completed recording here as WAV (`~` is expanded)
    pub recordings_path: Option<String>,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        let defaults = CaptureConfig::default();
        Self {
            source: "default".to_string(),
            file_path: None,
            sample_rate: defaults.sample_rate,
            channels: defaults.channels,
            chunk_frames: defaults.chunk_frames,
            poll_interval_ms: defaults.poll_interval.as_millis() as u64,
            open_timeout_ms: defaults.open_timeout.as_millis() as u64,
            stop_timeout_ms: defaults.stop_timeout.as_millis() as u64,
            recordings_path: None,
        }
    }
}

impl CaptureSettings {
    pub fn audio_source(&self) -> crate::Result<AudioSource> {
        AudioSource::from_setting(&self.source, self.file_path.as_deref())
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            sample_rate: self.sample_rate,
            channels: self.channels,
            chunk_frames: self.chunk_frames,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            open_timeout: Duration::from_millis(self.open_timeout_ms),
            stop_timeout: Duration::from_millis(self.stop_timeout_ms),
        }
    }

    pub fn recordings_dir(&self) -> Option<String> {
        self.recordings_path
            .as_deref()
            .map(|p| shellexpand::tilde(p).into_owned())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderMode {
    /// Networked if it can be constructed, otherwise synthetic
    Auto,
    Networked,
    Synthetic,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub mode: ProviderMode,
    pub api_key: Option<String>,
    /// Environment variable consulted when `api_key` is unset
    pub api_key_env: String,
    pub base_url: String,
    pub model: String,
    pub transcription_model: String,
    pub system_prompt: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub request_timeout_ms: u64,
    pub probe_timeout_ms: u64,
    /// Upper bound on one answer, enforced by the session
    pub answer_timeout_ms: u64,
    pub synthetic_min_delay_ms: u64,
    pub synthetic_max_delay_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            mode: ProviderMode::Auto,
            api_key: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            transcription_model: "whisper-1".to_string(),
            system_prompt: None,
            max_tokens: 500,
            temperature: 0.7,
            request_timeout_ms: 30_000,
            probe_timeout_ms: 5_000,
            answer_timeout_ms: 45_000,
            synthetic_min_delay_ms: 500,
            synthetic_max_delay_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is not set
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load defaults, then the optional file, then `SOCRATES_*` environment overrides
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
