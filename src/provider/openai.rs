//! OpenAI-compatible REST provider
//!
//! Chat completions for answers, `audio/transcriptions` for speech-to-text and
//! `GET /models` as the liveness probe.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tracing::{debug, error, info};

use super::{AnswerProvider, APOLOGY};
use crate::audio::Recording;
use crate::config::ProviderConfig;
use crate::error::{Error, Result};

const DEFAULT_SYSTEM_PROMPT: &str = "You are an AI assistant helping a candidate during an interview. \
Provide clear, concise, and professional responses that help the candidate answer questions effectively. \
Focus on technical accuracy, clear explanations, a professional tone, structured responses and relevant \
examples when appropriate. Keep responses concise but comprehensive. Avoid overly long explanations \
unless specifically requested.";

#[derive(Clone)]
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    transcription_model: String,
    system_prompt: String,
    max_tokens: u32,
    temperature: f32,
    probe_timeout: Duration,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>, config: &ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| Error::ProviderFailure(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            transcription_model: config.transcription_model.clone(),
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            probe_timeout: Duration::from_millis(config.probe_timeout_ms),
        })
    }

    /// Uses `api_key` if set, otherwise the environment variable named by `api_key_env`.
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| env::var(&config.api_key_env).ok())
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                Error::ProviderFailure(format!(
                    "No API key configured and {} is not set",
                    config.api_key_env
                ))
            })?;

        Self::new(api_key, config)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn build_messages(&self, prompt: &str, context: Option<&str>) -> Vec<ChatMessage> {
        let user = match context {
            Some(context) if !context.trim().is_empty() => {
                format!("Context: {context}\n\nQuestion: {prompt}")
            }
            _ => prompt.to_string(),
        };

        vec![
            ChatMessage {
                role: "system".to_string(),
                content: self.system_prompt.clone(),
            },
            ChatMessage {
                role: "user".to_string(),
                content: user,
            },
        ]
    }

    async fn complete(&self, prompt: &str, context: Option<&str>) -> Result<String> {
        let body = ChatCompletionRequest {
            model: self.model.clone(),
            messages: self.build_messages(prompt, context),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(self.url("chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| Error::ProviderFailure(format!("Chat request failed: {err}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(map_http_error(status, body_text));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|err| Error::ProviderFailure(format!("Failed to parse chat response: {err}")))?;

        extract_text_response(parsed)
    }
}

#[async_trait]
impl AnswerProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn produce_answer(&self, prompt: &str, context: Option<&str>) -> String {
        match self.complete(prompt, context).await {
            Ok(answer) => {
                info!("Generated networked response ({} chars)", answer.len());
                answer
            }
            Err(e) => {
                error!("Error getting networked response: {}", e);
                APOLOGY.to_string()
            }
        }
    }

    async fn is_available(&self) -> bool {
        let probe = self
            .client
            .get(self.url("models"))
            .bearer_auth(&self.api_key)
            .timeout(self.probe_timeout)
            .send()
            .await;

        match probe {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                debug!("Provider probe returned {}", response.status());
                false
            }
            Err(e) => {
                debug!("Provider probe failed: {}", e);
                false
            }
        }
    }

    async fn transcribe(&self, recording: &Recording) -> Result<String> {
        if recording.is_empty() {
            return Err(Error::ProviderFailure("Nothing was captured".into()));
        }

        let wav = recording
            .to_wav_bytes()
            .map_err(|e| Error::ProviderFailure(format!("Failed to encode recording: {e:#}")))?;
        let file = Part::bytes(wav)
            .file_name("recording.wav")
            .mime_str("audio/wav")
            .map_err(|e| Error::ProviderFailure(e.to_string()))?;
        let form = Form::new()
            .text("model", self.transcription_model.clone())
            .text("response_format", "text")
            .part("file", file);

        let response = self
            .client
            .post(self.url("audio/transcriptions"))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|err| Error::ProviderFailure(format!("Transcription request failed: {err}")))?;

        let status = response.status();
        let body_text = response
            .text()
            .await
            .map_err(|err| Error::ProviderFailure(format!("Failed to read transcript: {err}")))?;
        if !status.is_success() {
            return Err(map_http_error(status, body_text));
        }

        let transcript = body_text.trim().to_string();
        if transcript.is_empty() {
            return Err(Error::ProviderFailure("Empty transcript".into()));
        }

        info!(
            "Transcribed {:.1}s of audio ({} chars)",
            recording.duration_secs(),
            transcript.len()
        );
        Ok(transcript)
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

fn extract_text_response(response: ChatCompletionResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or_else(|| Error::ProviderFailure("Response contained no content".into()))
}

fn map_http_error(status: StatusCode, body: String) -> Error {
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|wrapper| wrapper.error.message)
        .unwrap_or(body);

    Error::ProviderFailure(format!("HTTP {}: {}", status.as_u16(), message))
}
