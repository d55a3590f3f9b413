use std::path::PathBuf;
use std::str::FromStr;
use anyhow::{Context, Result};

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub database_path: PathBuf,
    pub gemini: GeminiConfig,
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-1.5-flash".to_string(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            max_output_tokens: 2048,
            temperature: 0.7,
            top_p: 0.8,
            top_k: 40,
            timeout_secs: 120,
        }
    }
}

impl Config {
    /// Load from the process environment, after pulling in a `.env` file if one exists.
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded environment from {}", path.display());
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = GeminiConfig::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            bind_addr: var("PARLEY_BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            database_path: var("PARLEY_DATABASE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("parley.db")),
            gemini: GeminiConfig {
                api_key: var("GEMINI_API_KEY"),
                model: var("GEMINI_MODEL").unwrap_or(defaults.model),
                base_url: var("GEMINI_BASE_URL")
                    .map(|url| url.trim_end_matches('/').to_string())
                    .unwrap_or(defaults.base_url),
                max_output_tokens: parse_or(&var, "GEMINI_MAX_OUTPUT_TOKENS", defaults.max_output_tokens)?,
                temperature: parse_or(&var, "GEMINI_TEMPERATURE", defaults.temperature)?,
                top_p: parse_or(&var, "GEMINI_TOP_P", defaults.top_p)?,
                top_k: parse_or(&var, "GEMINI_TOP_K", defaults.top_k)?,
                timeout_secs: parse_or(&var, "GEMINI_TIMEOUT_SECS", defaults.timeout_secs)?,
            },
        })
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
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
    fn defaults_apply_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.database_path, PathBuf::from("parley.db"));
        assert_eq!(config.gemini.api_key, None);
        assert_eq!(config.gemini.max_output_tokens, 2048);
        assert_eq!(config.gemini.top_k, 40);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup(&[
            ("GEMINI_API_KEY", "secret"),
            ("GEMINI_BASE_URL", "http://localhost:9000/v1beta/"),
            ("GEMINI_TEMPERATURE", "0.2"),
            ("PARLEY_DATABASE", "/tmp/chats.db"),
        ]))
        .unwrap();
        assert_eq!(config.gemini.api_key.as_deref(), Some("secret"));
        assert_eq!(config.gemini.base_url, "http://localhost:9000/v1beta");
        assert_eq!(config.gemini.temperature, 0.2);
        assert_eq!(config.database_path, PathBuf::from("/tmp/chats.db"));
    }

    #[test]
    fn blank_api_key_counts_as_missing() {
        let config = Config::from_lookup(lookup(&[("GEMINI_API_KEY", "  ")])).unwrap();
        assert!(config.gemini.api_key.is_none());
    }

    #[test]
    fn bad_numbers_name_the_variable() {
        let err = Config::from_lookup(lookup(&[("GEMINI_TOP_K", "many")])).unwrap_err();
        assert!(err.to_string().contains("GEMINI_TOP_K"));
    }
}
