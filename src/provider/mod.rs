//! Answer generation
//!
//! The session only talks to [`AnswerProvider`]; which concrete provider backs
//! it is decided once at startup by [`Provider::select`].

pub mod openai;
pub mod synthetic;

pub use openai::OpenAiProvider;
pub use synthetic::{classify, QuestionKind, SyntheticProvider, PLACEHOLDER_TRANSCRIPT};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::audio::Recording;
use crate::config::{ProviderConfig, ProviderMode};
use crate::error::Result;

/// Returned in place of an answer when generation fails
pub const APOLOGY: &str =
    "I apologize, but I'm having trouble processing that question right now. Could you please rephrase it?";

#[async_trait]
pub trait AnswerProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Never fails; failures are reported as an apology text.
    async fn produce_answer(&self, prompt: &str, context: Option<&str>) -> String;

    async fn is_available(&self) -> bool;

    /// Turn captured audio into the prompt for the next answer
    async fn transcribe(&self, recording: &Recording) -> Result<String>;
}

/// The provider chosen for this process
pub enum Provider {
    Networked(OpenAiProvider),
    Synthetic(SyntheticProvider),
}

impl Provider {
    /// Pick a provider according to `config.mode`.
    ///
    /// Construction problems with the networked provider (most commonly a
    /// missing API key) downgrade to the synthetic one instead of failing.
    pub fn select(config: &ProviderConfig) -> Self {
        if config.mode == ProviderMode::Synthetic {
            info!("Using synthetic answer provider");
            return Provider::Synthetic(SyntheticProvider::from_config(config));
        }

        match OpenAiProvider::from_config(config) {
            Ok(provider) => {
                info!("Using networked answer provider (model {})", config.model);
                Provider::Networked(provider)
            }
            Err(e) => {
                warn!("Networked provider unavailable, falling back to synthetic: {}", e);
                Provider::Synthetic(SyntheticProvider::from_config(config))
            }
        }
    }

    pub fn is_networked(&self) -> bool {
        matches!(self, Provider::Networked(_))
    }

    fn inner(&self) -> &dyn AnswerProvider {
        match self {
            Provider::Networked(p) => p,
            Provider::Synthetic(p) => p,
        }
    }
}

#[async_trait]
impl AnswerProvider for Provider {
    fn name(&self) -> &str {
        self.inner().name()
    }

    async fn produce_answer(&self, prompt: &str, context: Option<&str>) -> String {
        self.inner().produce_answer(prompt, context).await
    }

    async fn is_available(&self) -> bool {
        self.inner().is_available().await
    }

    async fn transcribe(&self, recording: &Recording) -> Result<String> {
        self.inner().transcribe(recording).await
    }
}
