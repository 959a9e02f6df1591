use std::path::PathBuf;
use std::time::Duration;

use crate::config::Config;

/// Configuration for a backend session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Listening address, e.g. "127.0.0.1:9999" (port 0 picks a free port)
    pub bind_addr: String,

    /// Shared secret. Carried for the CLI contract; never sent or checked.
    pub password: String,

    /// Upper bound on producing one answer (transcription included)
    pub answer_timeout: Duration,

    /// Where completed recordings are saved, if anywhere
    pub recordings_dir: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9999".to_string(),
            password: String::new(),
            answer_timeout: Duration::from_secs(45),
            recordings_dir: None,
        }
    }
}

impl SessionConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            bind_addr: format!("{}:{}", config.backend.bind, config.backend.port),
            password: config.backend.password.clone(),
            answer_timeout: Duration::from_millis(config.provider.answer_timeout_ms),
            recordings_dir: config.capture.recordings_dir().map(PathBuf::from),
        }
    }
}
