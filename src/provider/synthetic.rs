//! Always-available synthetic answer provider
//!
//! Classifies the question by keyword overlap and answers from a small set of
//! templates with randomized decoration. Output is intentionally not
//! deterministic.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use std::time::Duration;
use tracing::info;

use super::{AnswerProvider, APOLOGY};
use crate::audio::Recording;
use crate::config::ProviderConfig;
use crate::error::Result;

/// Stands in for speech-to-text when no networked provider is configured
pub const PLACEHOLDER_TRANSCRIPT: &str = "Mock audio transcription";

const TECHNICAL_KEYWORDS: &[&str] = &[
    "algorithm", "code", "programming", "software", "system", "database", "api",
    "framework", "architecture", "performance", "optimization", "debug", "test", "deploy",
    "server", "client", "frontend", "backend",
];

const BEHAVIORAL_KEYWORDS: &[&str] = &[
    "experience", "situation", "challenge", "team", "conflict", "leadership", "problem",
    "solution", "learn", "mistake", "success", "failure", "collaborate", "communicate",
    "manage", "prioritize",
];

const TECHNICAL_ANSWERS: &[&str] = &[
    "Based on the question, here's a comprehensive technical answer that demonstrates deep understanding of the topic...",
    "This is a great technical question. Let me break it down into key components and provide a detailed explanation...",
    "From a technical perspective, the solution involves several important considerations that I'll outline step by step...",
];

const BEHAVIORAL_ANSWERS: &[&str] = &[
    "In my experience, I've encountered similar situations. Let me share a specific example and how I handled it...",
    "This is an excellent behavioral question. I'd like to use the STAR method to structure my response...",
    "I can relate to this scenario. Here's how I would approach this situation based on my past experiences...",
];

const GENERAL_ANSWERS: &[&str] = &[
    "That's an interesting question. Let me provide a thoughtful response that addresses all aspects...",
    "I appreciate you asking this. Here's my perspective on this topic with supporting examples...",
    "This is a complex topic that requires careful consideration. Let me share my insights...",
];

const PREFIXES: &[&str] = &[
    "Let me think about this... ",
    "That's a great question. ",
    "I'd be happy to share my thoughts on this. ",
    "This is something I've thought about before. ",
];

const FOLLOW_UPS: &[&str] = &[
    " Does this help clarify the concept?",
    " Would you like me to elaborate on any specific aspect?",
    " I hope this provides a good foundation for understanding.",
    " Let me know if you need more details on any part.",
];

const PREFIX_PROBABILITY: f64 = 0.3;
const FOLLOW_UP_PROBABILITY: f64 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionKind {
    Technical,
    Behavioral,
    General,
}

impl QuestionKind {
    pub fn templates(&self) -> &'static [&'static str] {
        match self {
            QuestionKind::Technical => TECHNICAL_ANSWERS,
            QuestionKind::Behavioral => BEHAVIORAL_ANSWERS,
            QuestionKind::General => GENERAL_ANSWERS,
        }
    }
}

/// Technical wins ties (as long as it matched at all); any behavioral hit beats general.
pub fn classify(question: &str) -> QuestionKind {
    let lower = question.to_lowercase();
    let hits = |keywords: &[&str]| keywords.iter().filter(|k| lower.contains(*k)).count();

    let technical = hits(TECHNICAL_KEYWORDS);
    let behavioral = hits(BEHAVIORAL_KEYWORDS);

    if technical > 0 && technical >= behavioral {
        QuestionKind::Technical
    } else if behavioral > 0 {
        QuestionKind::Behavioral
    } else {
        QuestionKind::General
    }
}

fn decorate(template: &str, rng: &mut impl Rng) -> String {
    let mut answer = String::with_capacity(template.len() + 64);

    match PREFIXES.choose(rng) {
        Some(prefix) if rng.gen_bool(PREFIX_PROBABILITY) => {
            answer.push_str(prefix);
            // Only the sentence start is lowered; acronyms and "I" stay intact
            let mut chars = template.chars();
            if let Some(first) = chars.next() {
                answer.extend(first.to_lowercase());
                answer.push_str(chars.as_str());
            }
        }
        _ => answer.push_str(template),
    }

    if rng.gen_bool(FOLLOW_UP_PROBABILITY) {
        if let Some(follow_up) = FOLLOW_UPS.choose(rng) {
            answer.push_str(follow_up);
        }
    }

    answer
}

/// Template-based responder
#[derive(Debug, Clone, Default)]
pub struct SyntheticProvider {
    /// Simulated thinking time range
    latency: Option<(Duration, Duration)>,
}

impl SyntheticProvider {
    /// Answers immediately
    pub fn new() -> Self {
        Self { latency: None }
    }

    pub fn with_latency(mut self, min: Duration, max: Duration) -> Self {
        self.latency = Some((min.min(max), max.max(min)));
        self
    }

    pub fn from_config(config: &ProviderConfig) -> Self {
        let provider = Self::new();
        if config.synthetic_max_delay_ms == 0 {
            return provider;
        }
        provider.with_latency(
            Duration::from_millis(config.synthetic_min_delay_ms),
            Duration::from_millis(config.synthetic_max_delay_ms),
        )
    }

    fn compose(&self, question: &str) -> (QuestionKind, String) {
        let kind = classify(question);
        let mut rng = rand::thread_rng();
        let answer = kind
            .templates()
            .choose(&mut rng)
            .map(|template| decorate(template, &mut rng))
            .unwrap_or_else(|| APOLOGY.to_string());
        (kind, answer)
    }
}

#[async_trait]
impl AnswerProvider for SyntheticProvider {
    fn name(&self) -> &str {
        "synthetic"
    }

    async fn produce_answer(&self, prompt: &str, _context: Option<&str>) -> String {
        if let Some((min, max)) = self.latency {
            let delay = rand::thread_rng().gen_range(min..=max);
            tokio::time::sleep(delay).await;
        }

        let (kind, answer) = self.compose(prompt);
        info!("Generated synthetic response for {:?} question", kind);
        answer
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn transcribe(&self, recording: &Recording) -> Result<String> {
        info!(
            "Synthetic transcription of {:.1}s recording",
            recording.duration_secs()
        );
        Ok(PLACEHOLDER_TRANSCRIPT.to_string())
    }
}
