use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::{Generation, GenerationClient, GenerationError, SamplingParams, TokenUsage};

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Gemini `generateContent` client.
pub struct GeminiClient {
    base_url: String,
    api_key: Option<String>,
    model: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl GeminiClient {
    /// Build a client. A missing key is not an error here; every call
    /// then fails with `Configuration` so the process can still serve
    /// reads of existing histories.
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GenerationError::Configuration(format!("HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: model.to_string(),
            client,
            timeout,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }
}

// ── Wire types ──

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfigBody,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfigBody {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

impl From<UsageMetadata> for TokenUsage {
    fn from(u: UsageMetadata) -> Self {
        TokenUsage {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count,
            total_tokens: u.total_token_count,
        }
    }
}

/// Map a non-success HTTP status to the error taxonomy.
fn classify_status(status: StatusCode, body: &str) -> GenerationError {
    let detail = format!("HTTP {}: {}", status.as_u16(), truncate(body, 300));
    match status.as_u16() {
        401 | 403 => GenerationError::Configuration(detail),
        400 if body.contains("API_KEY_INVALID") || body.contains("API key not valid") => {
            GenerationError::Configuration(detail)
        }
        429 => GenerationError::RateLimited(detail),
        408 | 504 => GenerationError::Timeout(detail),
        _ if status.is_server_error() => GenerationError::Unavailable(detail),
        _ => GenerationError::Unknown(detail),
    }
}

/// The URL is stripped from the error before it is formatted, so request
/// details never reach logs or callers.
fn classify_transport(err: reqwest::Error, timeout: Duration) -> GenerationError {
    let err = err.without_url();
    if err.is_timeout() {
        GenerationError::Timeout(format!("request timed out after {}s", timeout.as_secs()))
    } else if err.is_connect() {
        GenerationError::Unavailable(format!("connection failed: {err}"))
    } else {
        GenerationError::Unknown(err.to_string())
    }
}

/// Extract the first candidate's text. Missing usage is reported as zeros.
fn parse_response(body: &str) -> Result<Generation, GenerationError> {
    let parsed: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|e| GenerationError::Unknown(format!("unparseable response: {e}")))?;

    let text: String = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(GenerationError::Unknown("response contained no text".into()));
    }

    Ok(Generation {
        text,
        usage: parsed.usage_metadata.map(TokenUsage::from).unwrap_or_default(),
    })
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[async_trait]
impl GenerationClient for GeminiClient {
    async fn generate(
        &self,
        prompt: &str,
        params: &SamplingParams,
    ) -> Result<Generation, GenerationError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| GenerationError::Configuration("API key not configured".into()))?;

        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfigBody {
                temperature: params.temperature,
                top_p: params.top_p,
                top_k: params.top_k,
                max_output_tokens: params.max_output_tokens,
            },
        };

        let response = self
            .client
            .post(self.endpoint())
            .header(API_KEY_HEADER, api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport(e, self.timeout))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| classify_transport(e, self.timeout))?;

        if !status.is_success() {
            return Err(classify_status(status, &text));
        }

        parse_response(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_failures_are_configuration() {
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, ""),
            GenerationError::Configuration(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, "denied"),
            GenerationError::Configuration(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, r#"{"reason":"API_KEY_INVALID"}"#),
            GenerationError::Configuration(_)
        ));
    }

    #[test]
    fn transient_statuses_are_classified() {
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, "quota"),
            GenerationError::RateLimited(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::GATEWAY_TIMEOUT, ""),
            GenerationError::Timeout(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE, ""),
            GenerationError::Unavailable(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, "malformed"),
            GenerationError::Unknown(_)
        ));
    }

    #[test]
    fn parses_text_and_usage() {
        let body = r#"{
            "candidates": [{"content": {"parts": [{"text": "```markdown\n# Historia\n```"}]}}],
            "usageMetadata": {"promptTokenCount": 120, "candidatesTokenCount": 30, "totalTokenCount": 150}
        }"#;
        let generation = parse_response(body).unwrap();
        assert_eq!(generation.text, "```markdown\n# Historia\n```");
        assert_eq!(generation.usage.prompt_tokens, 120);
        assert_eq!(generation.usage.completion_tokens, 30);
        assert_eq!(generation.usage.total_tokens, 150);
    }

    #[test]
    fn missing_usage_defaults_to_zero() {
        let body = r#"{"candidates": [{"content": {"parts": [{"text": "ok"}]}}]}"#;
        let generation = parse_response(body).unwrap();
        assert_eq!(generation.usage, TokenUsage::default());
    }

    #[test]
    fn empty_candidates_is_unknown() {
        assert!(matches!(
            parse_response(r#"{"candidates": []}"#),
            Err(GenerationError::Unknown(_))
        ));
        assert!(matches!(parse_response("not json"), Err(GenerationError::Unknown(_))));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("ñandú", 3), "ñan");
        assert_eq!(truncate("abc", 10), "abc");
    }

    #[tokio::test]
    async fn missing_key_fails_without_network() {
        let client = GeminiClient::new(
            "http://127.0.0.1:9",
            Some("   ".into()),
            DEFAULT_GEMINI_MODEL,
            Duration::from_secs(1),
        )
        .unwrap();
        let err = client
            .generate("hola", &SamplingParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Configuration(_)));
    }

    #[tokio::test]
    async fn connection_errors_never_carry_the_api_key() {
        use crate::pipeline::generation::{generate_with_retry, RetryPolicy};

        let client = GeminiClient::new(
            "http://127.0.0.1:9",
            Some("SECRETKEY123".into()),
            DEFAULT_GEMINI_MODEL,
            Duration::from_secs(2),
        )
        .unwrap();

        let err = client
            .generate("hola", &SamplingParams::default())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(!err.to_string().contains("SECRETKEY123"));

        let policy = RetryPolicy {
            max_attempts: 2,
            backoff_base: Duration::from_millis(1),
            attempt_timeout: Duration::from_secs(2),
        };
        let err = generate_with_retry(&client, "hola", &SamplingParams::default(), &policy)
            .await
            .unwrap_err();
        assert!(!err.to_string().contains("SECRETKEY123"));
    }
}
