use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::pipeline::generation::gemini::{DEFAULT_GEMINI_BASE_URL, DEFAULT_GEMINI_MODEL};
use crate::pipeline::generation::{RetryPolicy, SamplingParams};
use crate::pipeline::history::GenerationSettings;

/// Application-level constants
pub const APP_NAME: &str = "MedHistory";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Histories returned by `list` when the caller gives no limit.
pub const DEFAULT_HISTORY_LIMIT: usize = 10;
/// Upper bound applied to any caller-supplied limit.
pub const MAX_HISTORY_LIMIT: usize = 100;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_ORGANIZATION: &str = "Centro Médico";
const DEFAULT_GENERATOR: &str = "Sistema de Historias Clínicas con IA";

/// Prefix for every environment variable read by `AppConfig::from_env`.
const ENV_PREFIX: &str = "MEDHISTORY_";

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "medhistory=info,medhistory_lib=info,tower_http=info"
}

/// Get the application data directory
/// (platform data dir, falling back to the working directory).
pub fn app_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Default SQLite database location.
pub fn default_db_path() -> PathBuf {
    app_data_dir().join("medhistory.db")
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

// ═══════════════════════════════════════════════════════════
// Sections
// ═══════════════════════════════════════════════════════════

/// AI provider credentials, sampling and retry knobs.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub sampling: SamplingParams,
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub attempt_timeout: Duration,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            api_key: None,
            model: DEFAULT_GEMINI_MODEL.to_string(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            sampling: SamplingParams::default(),
            max_attempts: retry.max_attempts,
            backoff_base: retry.backoff_base,
            attempt_timeout: retry.attempt_timeout,
        }
    }
}

impl GenerationConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff_base: self.backoff_base,
            attempt_timeout: self.attempt_timeout,
        }
    }

    pub fn settings(&self) -> GenerationSettings {
        GenerationSettings {
            sampling: self.sampling.clone(),
            retry: self.retry_policy(),
        }
    }
}

/// Labels stamped on every rendered document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderConfig {
    pub organization: String,
    pub generator: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            organization: DEFAULT_ORGANIZATION.to_string(),
            generator: DEFAULT_GENERATOR.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Keep rendered PDFs between requests.
    pub persist_pdfs: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { persist_pdfs: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub db_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR
                .parse()
                .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 8080))),
            db_path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub generation: GenerationConfig,
    pub render: RenderConfig,
    pub cache: CacheConfig,
    pub server: ServerConfig,
}

// ═══════════════════════════════════════════════════════════
// Environment loading
// ═══════════════════════════════════════════════════════════

impl AppConfig {
    /// Read `MEDHISTORY_*` variables from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = AppConfig::default();

        // ── generation ──
        let generation = &mut config.generation;
        generation.api_key = get("API_KEY");
        if let Some(model) = get("MODEL") {
            generation.model = model;
        }
        if let Some(url) = get("BASE_URL") {
            generation.base_url = url;
        }
        if let Some(v) = get("TEMPERATURE") {
            generation.sampling.temperature = parse("TEMPERATURE", &v)?;
        }
        if let Some(v) = get("MAX_OUTPUT_TOKENS") {
            generation.sampling.max_output_tokens = parse("MAX_OUTPUT_TOKENS", &v)?;
        }
        if let Some(v) = get("MAX_ATTEMPTS") {
            let attempts: u32 = parse("MAX_ATTEMPTS", &v)?;
            if attempts == 0 {
                return Err(invalid("MAX_ATTEMPTS", &v, "must be at least 1"));
            }
            generation.max_attempts = attempts;
        }
        if let Some(v) = get("BACKOFF_BASE_MS") {
            generation.backoff_base = Duration::from_millis(parse("BACKOFF_BASE_MS", &v)?);
        }
        if let Some(v) = get("ATTEMPT_TIMEOUT_SECS") {
            generation.attempt_timeout = Duration::from_secs(parse("ATTEMPT_TIMEOUT_SECS", &v)?);
        }

        // ── render ──
        if let Some(org) = get("ORGANIZATION") {
            config.render.organization = org;
        }
        if let Some(generator) = get("GENERATOR") {
            config.render.generator = generator;
        }

        // ── cache ──
        if let Some(v) = get("PERSIST_PDFS") {
            config.cache.persist_pdfs = parse_bool("PERSIST_PDFS", &v)?;
        }

        // ── server ──
        if let Some(v) = get("BIND_ADDR") {
            config.server.bind_addr = parse("BIND_ADDR", &v)?;
        }
        if let Some(path) = get("DB_PATH") {
            config.server.db_path = PathBuf::from(path);
        }

        Ok(config)
    }
}

fn invalid(name: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: format!("{ENV_PREFIX}{name}"),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse<T>(name: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e: T::Err| invalid(name, value, &e.to_string()))
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(name, value, "expected true or false")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.generation.api_key, None);
        assert_eq!(config.generation.model, DEFAULT_GEMINI_MODEL);
        assert_eq!(config.generation.max_attempts, 3);
        assert_eq!(config.generation.backoff_base, Duration::from_secs(1));
        assert!(config.cache.persist_pdfs);
        assert_eq!(config.render, RenderConfig::default());
        assert_eq!(config.server.bind_addr.port(), 8080);
    }

    #[test]
    fn reads_prefixed_variables() {
        let config = AppConfig::from_lookup(lookup(&[
            ("MEDHISTORY_API_KEY", " secret "),
            ("MEDHISTORY_MODEL", "gemini-2.0-flash"),
            ("MEDHISTORY_MAX_ATTEMPTS", "5"),
            ("MEDHISTORY_BACKOFF_BASE_MS", "250"),
            ("MEDHISTORY_PERSIST_PDFS", "false"),
            ("MEDHISTORY_ORGANIZATION", "Clínica San Rafael"),
            ("MEDHISTORY_BIND_ADDR", "0.0.0.0:9000"),
            ("MEDHISTORY_DB_PATH", "/tmp/h.db"),
        ]))
        .unwrap();

        assert_eq!(config.generation.api_key.as_deref(), Some("secret"));
        assert_eq!(config.generation.model, "gemini-2.0-flash");
        let retry = config.generation.retry_policy();
        assert_eq!(retry.max_attempts, 5);
        assert_eq!(retry.backoff_base, Duration::from_millis(250));
        assert!(!config.cache.persist_pdfs);
        assert_eq!(config.render.organization, "Clínica San Rafael");
        assert_eq!(config.server.bind_addr.port(), 9000);
        assert_eq!(config.server.db_path, PathBuf::from("/tmp/h.db"));
    }

    #[test]
    fn blank_api_key_is_unset() {
        let config = AppConfig::from_lookup(lookup(&[("MEDHISTORY_API_KEY", "   ")])).unwrap();
        assert_eq!(config.generation.api_key, None);
    }

    #[test]
    fn rejects_malformed_values() {
        let err = AppConfig::from_lookup(lookup(&[("MEDHISTORY_MAX_ATTEMPTS", "many")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "MEDHISTORY_MAX_ATTEMPTS"));

        assert!(AppConfig::from_lookup(lookup(&[("MEDHISTORY_MAX_ATTEMPTS", "0")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("MEDHISTORY_PERSIST_PDFS", "maybe")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("MEDHISTORY_BIND_ADDR", "nowhere")])).is_err());
    }

    #[test]
    fn data_dir_is_namespaced() {
        assert!(default_db_path().ends_with("MedHistory/medhistory.db"));
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.1.0");
    }
}
