use anyhow::{bail, Context, Result};

const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_CLASSIFIER_CHAR_BUDGET: usize = 6000;

/// Which discovery path runs at upload time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryMode {
    /// Classifier first, regex extraction when it fails or finds nothing.
    Llm,
    /// Regex extraction only.
    Regex,
}

impl DiscoveryMode {
    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "llm" => Ok(DiscoveryMode::Llm),
            "regex" => Ok(DiscoveryMode::Regex),
            other => bail!("PLACEHOLDER_DISCOVERY must be 'llm' or 'regex', got '{other}'"),
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// When unset, every LLM-backed path takes its static fallback.
    pub anthropic_api_key: Option<String>,
    pub port: u16,
    pub rust_log: String,
    pub max_upload_bytes: usize,
    pub classifier_char_budget: usize,
    pub discovery_mode: DiscoveryMode,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            max_upload_bytes: parse_env_or("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            classifier_char_budget: parse_env_or(
                "CLASSIFIER_CHAR_BUDGET",
                DEFAULT_CLASSIFIER_CHAR_BUDGET,
            )?,
            discovery_mode: DiscoveryMode::parse(
                &std::env::var("PLACEHOLDER_DISCOVERY").unwrap_or_else(|_| "llm".to_string()),
            )?,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            anthropic_api_key: None,
            port: 8080,
            rust_log: "info".to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            classifier_char_budget: DEFAULT_CLASSIFIER_CHAR_BUDGET,
            discovery_mode: DiscoveryMode::Llm,
        }
    }
}

fn parse_env_or(key: &str, default: usize) -> Result<usize> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<usize>()
            .with_context(|| format!("Environment variable '{key}' must be a positive integer")),
        Err(_) => Ok(default),
    }
}
