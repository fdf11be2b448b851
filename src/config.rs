//! Runtime configuration: completion service credentials and schema policy.
//!
//! Resolution order: explicit file, then `<config dir>/universal-search/config.toml`,
//! then built-in defaults. Environment variables override whatever the file said.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::SearchError;

/// Canonical environment/setting names. Use these instead of raw string literals.
pub mod keys {
    /// Bearer credential for the completion service.
    pub const API_KEY: &str = "UNIVERSAL_SEARCH_API_KEY";

    /// Accepted as a fallback for [`API_KEY`] since most deployments already export it.
    pub const OPENROUTER_API_KEY: &str = "OPENROUTER_API_KEY";

    /// Overrides `completion.model`.
    pub const MODEL: &str = "UNIVERSAL_SEARCH_MODEL";

    /// Overrides `completion.endpoint`.
    pub const ENDPOINT: &str = "UNIVERSAL_SEARCH_ENDPOINT";

    /// `json` switches log output to one JSON object per line.
    pub const LOG_FORMAT: &str = "UNIVERSAL_SEARCH_LOG_FORMAT";
}

const CONFIG_DIR_NAME: &str = "universal-search";
const CONFIG_FILE_NAME: &str = "config.toml";

pub const DEFAULT_ENDPOINT: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "anthropic/claude-3.7-sonnet";
pub const DEFAULT_MAX_TOKENS: u32 = 4000;
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_SCHEMA_CACHE_TTL_SECS: u64 = 300;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub completion: CompletionConfig,
    pub schema: SchemaConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    /// Bearer credential. Absence is a fatal configuration error at client construction.
    pub api_key: Option<String>,
    pub endpoint: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: DEFAULT_ENDPOINT.into(),
            model: DEFAULT_MODEL.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    /// Entity types always kept by the relevance reducer and used when the
    /// fallback builder finds no candidate.
    pub base_entities: Vec<String>,
    /// Identifier prefixes hidden from callers without elevated capability.
    pub technical_prefixes: Vec<String>,
    /// Audit/bookkeeping fields left out of the schema document.
    pub excluded_fields: Vec<String>,
    /// How long a discovered schema is reused. `0` disables caching.
    pub cache_ttl_secs: u64,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            base_entities: vec!["res.users".into(), "res.partner".into(), "res.company".into()],
            technical_prefixes: vec!["ir.".into()],
            excluded_fields: vec![
                "create_uid".into(),
                "create_date".into(),
                "write_uid".into(),
                "write_date".into(),
                "__last_update".into(),
            ],
            cache_ttl_secs: DEFAULT_SCHEMA_CACHE_TTL_SECS,
        }
    }
}

impl SearchConfig {
    /// Load configuration from `path`, or from the default location when `path` is `None`.
    /// A missing default file is not an error; a missing explicit file is.
    pub fn load(path: Option<&Path>) -> Result<Self, SearchError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => match default_config_path() {
                Some(p) if p.exists() => Self::from_file(&p)?,
                _ => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, SearchError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            SearchError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Self = toml::from_str(&raw)?;
        tracing::debug!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    /// Apply environment overrides through `lookup` (injectable for tests).
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty(keys::API_KEY).or_else(|| non_empty(keys::OPENROUTER_API_KEY)) {
            self.completion.api_key = Some(key);
        }
        if let Some(model) = non_empty(keys::MODEL) {
            self.completion.model = model;
        }
        if let Some(endpoint) = non_empty(keys::ENDPOINT) {
            self.completion.endpoint = endpoint;
        }
    }

    /// The configured credential, or a configuration error naming how to set it.
    pub fn require_api_key(&self) -> Result<&str, SearchError> {
        match self.completion.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Ok(key),
            _ => Err(SearchError::Configuration(format!(
                "AI service API key is not configured. Set `completion.api_key` or the {} environment variable.",
                keys::API_KEY
            ))),
        }
    }
}

/// `<config dir>/universal-search/config.toml`, when the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}
