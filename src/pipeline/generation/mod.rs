//! Text generation against an external LLM provider.
//!
//! `GenerationClient` is the provider seam (mocked in tests);
//! `generate_with_retry` layers the bounded exponential backoff on top.

pub mod gemini;
pub mod retry;

pub use gemini::GeminiClient;
pub use retry::{generate_with_retry, RetryPolicy};

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Provider failures, classified for the retry policy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("missing or invalid credentials: {0}")]
    Configuration(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("unexpected provider failure: {0}")]
    Unknown(String),
}

impl GenerationError {
    /// Everything except a configuration problem is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, GenerationError::Configuration(_))
    }

    /// Terminal error after the retry budget is spent.
    pub fn exhausted(attempts: u32, last: &GenerationError) -> Self {
        GenerationError::Unavailable(format!("gave up after {attempts} attempts, last error: {last}"))
    }
}

/// Sampling parameters forwarded to the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.95,
            top_k: 40,
            max_output_tokens: 8192,
        }
    }
}

/// Token accounting. Zero when the provider does not report usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    pub usage: TokenUsage,
}

/// LLM provider abstraction (allows mocking)
#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        params: &SamplingParams,
    ) -> Result<Generation, GenerationError>;
}

/// Strip a code fence wrapping the entire response and surrounding
/// whitespace. Fences inside the body are left alone.
pub fn clean_generated_text(raw: &str) -> String {
    static WRAPPING_FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?s)\A\s*```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)\r?\n?```\s*\z").expect("valid regex")
    });

    match WRAPPING_FENCE_RE.captures(raw) {
        Some(caps) if !caps[1].contains("```") => caps[1].trim().to_string(),
        _ => raw.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_configuration_is_fatal() {
        assert!(!GenerationError::Configuration("x".into()).is_retryable());
        assert!(GenerationError::RateLimited("x".into()).is_retryable());
        assert!(GenerationError::Timeout("x".into()).is_retryable());
        assert!(GenerationError::Unavailable("x".into()).is_retryable());
        assert!(GenerationError::Unknown("x".into()).is_retryable());
    }

    #[test]
    fn exhausted_wraps_last_error() {
        let err = GenerationError::exhausted(3, &GenerationError::RateLimited("quota".into()));
        match err {
            GenerationError::Unavailable(msg) => {
                assert!(msg.contains("3 attempts"));
                assert!(msg.contains("quota"));
            }
            other => panic!("expected Unavailable, got {other:?}"),
        }
    }

    #[test]
    fn strips_wrapping_markdown_fence() {
        let raw = "```markdown\n# Historia\n\nTexto.\n```\n";
        assert_eq!(clean_generated_text(raw), "# Historia\n\nTexto.");
    }

    #[test]
    fn keeps_inner_fences() {
        let raw = "# Notas\n\n```\ncode\n```\n\nFin.";
        assert_eq!(clean_generated_text(raw), raw);
    }

    #[test]
    fn plain_text_is_trimmed() {
        assert_eq!(clean_generated_text("  hola \n"), "hola");
    }

    #[test]
    fn default_usage_is_zero() {
        assert_eq!(TokenUsage::default().total_tokens, 0);
    }
}
