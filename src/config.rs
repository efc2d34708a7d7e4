/// Configuration module for pdfchat.
///
/// Handles loading, validating, and providing default configuration values,
/// plus resolving the Azure OpenAI credentials from the environment.
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Config file used when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

// ── Default value functions ──────────────────────────────────────────

fn default_chunk_size() -> usize {
    1024
}

fn default_chunk_overlap() -> usize {
    400
}

fn default_search_top_k() -> usize {
    3
}

fn default_embedding_deployment() -> String {
    "text-embedding-ada-002".to_string()
}

fn default_dimensions() -> usize {
    1536
}

fn default_batch_size() -> usize {
    1024
}

fn default_chat_deployment() -> String {
    "gpt-4o-mini".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    120
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// SQLite file for the vector index. In-memory when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    #[serde(default = "default_search_top_k")]
    pub search_top_k: usize,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub chat: ChatConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_deployment")]
    pub deployment: String,

    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Texts sent per embeddings request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_chat_deployment")]
    pub deployment: String,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Upper bound for one completion, including reading the streamed body.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: None,
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            search_top_k: default_search_top_k(),
            embedding: EmbeddingConfig::default(),
            chat: ChatConfig::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            deployment: default_embedding_deployment(),
            dimensions: default_dimensions(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            deployment: default_chat_deployment(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ChatConfig {
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// If `config_path` is empty, defaults to `"config.json"`.
    /// If the file does not exist, returns a default config and, for the
    /// default path only, writes a template next to the binary's cwd.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            DEFAULT_CONFIG_PATH
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            let cfg = Self::default();

            if path == DEFAULT_CONFIG_PATH {
                match cfg.save(path) {
                    Ok(()) => info!("Generated config template: {path}"),
                    Err(e) => warn!("Failed to generate config template: {e}"),
                }
            }

            return Ok(cfg);
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        let cfg: Config = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");
        Ok(cfg)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.chunk_size > 0, "chunk_size must be positive");
        anyhow::ensure!(
            self.chunk_overlap < self.chunk_size,
            "chunk_overlap ({}) must be smaller than chunk_size ({})",
            self.chunk_overlap,
            self.chunk_size
        );
        anyhow::ensure!(self.search_top_k > 0, "search_top_k must be positive");
        anyhow::ensure!(
            self.embedding.dimensions > 0,
            "embedding.dimensions must be positive"
        );
        anyhow::ensure!(
            self.embedding.batch_size > 0,
            "embedding.batch_size must be positive"
        );
        anyhow::ensure!(
            !self.chat.deployment.trim().is_empty(),
            "chat.deployment must not be empty"
        );
        anyhow::ensure!(
            self.chat.request_timeout_secs > 0,
            "chat.request_timeout_secs must be positive"
        );
        Ok(())
    }
}

// ── Credentials ──────────────────────────────────────────────────────

/// Endpoint, key and API version of one Azure OpenAI resource.
///
/// Treated as opaque strings; only the endpoint is trimmed of trailing `/`.
#[derive(Clone)]
pub struct AzureCredentials {
    pub endpoint: String,
    pub api_key: String,
    pub api_version: String,
}

impl std::fmt::Debug for AzureCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureCredentials")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("api_version", &self.api_version)
            .finish()
    }
}

const EMBEDDING_VARS: [&str; 3] = [
    "AZURE_OPENAI_ENDPOINT",
    "AZURE_OPENAI_API_KEY",
    "OPENAI_API_VERSION",
];

const CHAT_VARS: [&str; 3] = [
    "AZURE_OPENAI_ENDPOINT_4o",
    "AZURE_OPENAI_API_KEY_4o",
    "AZURE_OPENAI_API_VERSION_4o",
];

impl AzureCredentials {
    /// Credentials for the embeddings deployment.
    pub fn embeddings_from_env() -> Result<Self> {
        Self::resolve_embeddings(|name| std::env::var(name).ok())
    }

    /// Credentials for the chat deployment, falling back to the
    /// embeddings variables for anything the `_4o` set leaves unset.
    pub fn chat_from_env() -> Result<Self> {
        Self::resolve_chat(|name| std::env::var(name).ok())
    }

    fn resolve_embeddings(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Self::resolve(&lookup, &[&EMBEDDING_VARS])
    }

    fn resolve_chat(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Self::resolve(&lookup, &[&CHAT_VARS, &EMBEDDING_VARS])
    }

    fn resolve(
        lookup: &dyn Fn(&str) -> Option<String>,
        sets: &[&[&str; 3]],
    ) -> Result<Self> {
        let pick = |slot: usize| -> Result<String> {
            sets.iter()
                .map(|set| set[slot])
                .find_map(|name| lookup(name).filter(|v| !v.trim().is_empty()))
                .with_context(|| {
                    let names: Vec<&str> = sets.iter().map(|set| set[slot]).collect();
                    format!("environment variable not set: {}", names.join(" or "))
                })
        };

        Ok(Self {
            endpoint: pick(0)?.trim_end_matches('/').to_string(),
            api_key: pick(1)?,
            api_version: pick(2)?,
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.chunk_size, 1024);
        assert_eq!(config.chunk_overlap, 400);
        assert_eq!(config.search_top_k, 3);
        assert_eq!(config.embedding.deployment, "text-embedding-ada-002");
        assert_eq!(config.embedding.dimensions, 1536);
        assert_eq!(config.chat.deployment, "gpt-4o-mini");
        assert!(config.db_path.is_none());
    }

    #[test]
    fn test_load_from_json() {
        let json = r#"{"chunk_size": 800, "chat": {"deployment": "gpt-4o"}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.chunk_size, 800);
        assert_eq!(config.chat.deployment, "gpt-4o");
        // Other fields should have defaults
        assert_eq!(config.chat.request_timeout_secs, 120);
        assert_eq!(config.search_top_k, 3);
        assert_eq!(config.embedding.batch_size, 1024);
    }

    #[test]
    fn test_validate_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_overlap_not_smaller_than_chunk() {
        let mut config = Config::default();
        config.chunk_overlap = config.chunk_size;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bad_top_k() {
        let mut config = Config::default();
        config.search_top_k = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_non_default_path_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.chunk_size, 1024);
        assert!(!path.exists(), "template only written for the default path");
    }

    #[test]
    fn test_load_invalid_json_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.search_top_k, 3);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = Config::default();
        config.db_path = Some("./index.db".to_string());
        config.save(path.to_str().unwrap()).unwrap();

        let loaded = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(loaded.db_path.as_deref(), Some("./index.db"));
        assert_eq!(loaded.embedding.deployment, config.embedding.deployment);
    }

    #[test]
    fn test_timeouts() {
        let chat = ChatConfig::default();
        assert_eq!(chat.connect_timeout(), Duration::from_secs(10));
        assert_eq!(chat.request_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn test_chat_credentials_prefer_4o_vars() {
        let vars = env(&[
            ("AZURE_OPENAI_ENDPOINT_4o", "https://chat.example.com/"),
            ("AZURE_OPENAI_API_KEY_4o", "chat-key"),
            ("AZURE_OPENAI_API_VERSION_4o", "2024-06-01"),
            ("AZURE_OPENAI_ENDPOINT", "https://embed.example.com"),
            ("AZURE_OPENAI_API_KEY", "embed-key"),
            ("OPENAI_API_VERSION", "2023-05-15"),
        ]);
        let creds = AzureCredentials::resolve_chat(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(creds.endpoint, "https://chat.example.com");
        assert_eq!(creds.api_key, "chat-key");
        assert_eq!(creds.api_version, "2024-06-01");
    }

    #[test]
    fn test_chat_credentials_fall_back_per_field() {
        let vars = env(&[
            ("AZURE_OPENAI_API_KEY_4o", "chat-key"),
            ("AZURE_OPENAI_ENDPOINT", "https://embed.example.com"),
            ("OPENAI_API_VERSION", "2023-05-15"),
        ]);
        let creds = AzureCredentials::resolve_chat(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(creds.endpoint, "https://embed.example.com");
        assert_eq!(creds.api_key, "chat-key");
        assert_eq!(creds.api_version, "2023-05-15");
    }

    #[test]
    fn test_missing_credentials_name_the_variable() {
        let vars = env(&[("AZURE_OPENAI_ENDPOINT", "https://embed.example.com")]);
        let err = AzureCredentials::resolve_embeddings(|k| vars.get(k).cloned()).unwrap_err();
        assert!(err.to_string().contains("AZURE_OPENAI_API_KEY"));
    }

    #[test]
    fn test_debug_redacts_key() {
        let creds = AzureCredentials {
            endpoint: "https://x".into(),
            api_key: "secret".into(),
            api_version: "v".into(),
        };
        assert!(!format!("{creds:?}").contains("secret"));
    }
}
