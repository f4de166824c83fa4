//! Collection configuration management.
//!
//! Each collection keeps its settings in
//! `.grounded/collections/<collection>/config.yaml`. Missing keys fall back
//! to defaults; `GROUNDED_*` environment variables override the file.

use crate::chunker::DEFAULT_SEPARATORS;
use crate::embeddings::RetryPolicy;
use crate::index::DistanceMetric;
use grounded_core::config::{DEFAULT_COLLECTION, STATE_DIR};
use grounded_core::{AppError, AppResult};
use grounded_llm::{ClientOptions, ProviderType};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Largest accepted embedding batch.
pub const MAX_EMBEDDING_BATCH_SIZE: usize = 2048;

/// Retrieval pipeline configuration for one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Collection name
    pub collection: String,

    /// Maximum chunk length in characters
    pub chunk_size: usize,

    /// Characters shared by adjacent chunks
    pub chunk_overlap: usize,

    /// Split points in priority order; `""` means a raw character cut
    pub separators: Vec<String>,

    /// Prefix `Title: <title>` to the text before chunking
    pub prepend_title: bool,

    /// Maximum texts per embedding call
    pub embedding_batch_size: usize,

    /// Results retrieved when a query does not specify `k`
    pub top_k_default: usize,

    /// Embedding provider ("ollama" or "trigram")
    pub embedding_provider: String,

    /// Embedding model identifier
    pub embedding_model: String,

    /// Fixed vector dimensionality; `None` uses the provider's size for
    /// the model (768 for `nomic-embed-text`, 384 for `trigram`), or lets
    /// the first write decide when the model is unknown
    pub embedding_dimensions: Option<usize>,

    /// Generation provider
    pub generation_provider: String,

    /// Generation model identifier
    pub generation_model: String,

    /// Distance metric of the collection
    pub distance_metric: DistanceMetric,

    /// Provider base URL override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Retries after the first failed embedding attempt
    pub embedding_max_retries: u32,

    /// First retry delay in milliseconds
    pub embedding_initial_backoff_ms: u64,

    /// Retry delay ceiling in milliseconds
    pub embedding_max_backoff_ms: u64,

    /// Per-request timeout for provider calls
    pub request_timeout_secs: u64,

    /// Replace emails, phone numbers and similar personal data in
    /// questions before they reach the embedder and the model
    pub redact_pii: bool,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            collection: DEFAULT_COLLECTION.to_string(),
            chunk_size: 400,
            chunk_overlap: 50,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
            prepend_title: false,
            embedding_batch_size: 16,
            top_k_default: 5,
            embedding_provider: "ollama".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            embedding_dimensions: None,
            generation_provider: "ollama".to_string(),
            generation_model: "llama3.2".to_string(),
            distance_metric: DistanceMetric::Cosine,
            endpoint: None,
            embedding_max_retries: 3,
            embedding_initial_backoff_ms: 200,
            embedding_max_backoff_ms: 5000,
            request_timeout_secs: 30,
            redact_pii: false,
        }
    }
}

impl RagConfig {
    /// Default configuration for a named collection.
    pub fn for_collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            ..Default::default()
        }
    }

    /// Check every setting; configuration errors are never retried.
    pub fn validate(&self) -> AppResult<()> {
        if self.collection.trim().is_empty() {
            return Err(AppError::Config("collection cannot be empty".to_string()));
        }

        if self.chunk_size == 0 || self.chunk_overlap >= self.chunk_size {
            return Err(AppError::ChunkingConfig {
                chunk_size: self.chunk_size,
                overlap: self.chunk_overlap,
            });
        }

        if self.embedding_batch_size == 0 || self.embedding_batch_size > MAX_EMBEDDING_BATCH_SIZE {
            return Err(AppError::Config(format!(
                "embedding_batch_size must be between 1 and {}, got {}",
                MAX_EMBEDDING_BATCH_SIZE, self.embedding_batch_size
            )));
        }

        if self.top_k_default == 0 {
            return Err(AppError::Config("top_k_default must be greater than 0".to_string()));
        }

        if !matches!(self.embedding_provider.as_str(), "ollama" | "trigram") {
            return Err(AppError::Config(format!(
                "Unknown embedding provider: {}. Supported: ollama, trigram",
                self.embedding_provider
            )));
        }

        if self.embedding_model.trim().is_empty() {
            return Err(AppError::Config("embedding_model cannot be empty".to_string()));
        }

        if self.embedding_dimensions == Some(0) {
            return Err(AppError::Config(
                "embedding_dimensions must be greater than 0".to_string(),
            ));
        }

        if ProviderType::parse(&self.generation_provider).is_none() {
            return Err(AppError::Config(format!(
                "Unknown generation provider: {}. Supported: {}",
                self.generation_provider,
                ProviderType::supported().join(", ")
            )));
        }

        if self.generation_model.trim().is_empty() {
            return Err(AppError::Config("generation_model cannot be empty".to_string()));
        }

        if self.embedding_max_backoff_ms < self.embedding_initial_backoff_ms {
            return Err(AppError::Config(format!(
                "embedding_max_backoff_ms ({}) must be at least embedding_initial_backoff_ms ({})",
                self.embedding_max_backoff_ms, self.embedding_initial_backoff_ms
            )));
        }

        if self.request_timeout_secs == 0 {
            return Err(AppError::Config(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Retry policy for the embedding boundary.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.embedding_max_retries,
            Duration::from_millis(self.embedding_initial_backoff_ms),
            Duration::from_millis(self.embedding_max_backoff_ms),
        )
    }

    /// Transport options for HTTP providers.
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            endpoint: self.endpoint.clone(),
            timeout_secs: self.request_timeout_secs,
        }
    }

    /// Apply `GROUNDED_*` overrides read through `env`.
    pub fn apply_env_overrides<F>(&mut self, env: F) -> AppResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = env("GROUNDED_CHUNK_SIZE") {
            self.chunk_size = parse_number("GROUNDED_CHUNK_SIZE", &v)?;
        }
        if let Some(v) = env("GROUNDED_CHUNK_OVERLAP") {
            self.chunk_overlap = parse_number("GROUNDED_CHUNK_OVERLAP", &v)?;
        }
        if let Some(v) = env("GROUNDED_EMBEDDING_BATCH_SIZE") {
            self.embedding_batch_size = parse_number("GROUNDED_EMBEDDING_BATCH_SIZE", &v)?;
        }
        if let Some(v) = env("GROUNDED_TOP_K") {
            self.top_k_default = parse_number("GROUNDED_TOP_K", &v)?;
        }
        if let Some(v) = env("GROUNDED_EMBEDDING_MODEL") {
            self.embedding_model = v;
        }
        if let Some(v) = env("GROUNDED_GENERATION_MODEL") {
            self.generation_model = v;
        }
        if let Some(v) = env("GROUNDED_DISTANCE_METRIC") {
            self.distance_metric = v.parse()?;
        }
        Ok(())
    }
}

fn parse_number(name: &str, value: &str) -> AppResult<usize> {
    value
        .trim()
        .parse()
        .map_err(|_| AppError::Config(format!("{} must be a non-negative integer, got '{}'", name, value)))
}

/// Load collection configuration.
///
/// Loads from `.grounded/collections/<collection>/config.yaml` if it exists,
/// otherwise returns defaults for the collection name.
pub fn load_config(workspace: &Path, collection: &str) -> AppResult<RagConfig> {
    let config_path = get_config_path(workspace, collection);

    if config_path.exists() {
        let content = fs::read_to_string(&config_path).map_err(|e| {
            AppError::Config(format!("Failed to read config at {:?}: {}", config_path, e))
        })?;

        let mut config: RagConfig = serde_yaml::from_str(&content).map_err(|e| {
            AppError::Config(format!("Failed to parse config at {:?}: {}", config_path, e))
        })?;

        // The directory name is authoritative
        config.collection = collection.to_string();

        tracing::debug!("Loaded collection config for '{}'", collection);
        Ok(config)
    } else {
        tracing::debug!(
            "Using default config for collection '{}' (no config file found)",
            collection
        );
        Ok(RagConfig::for_collection(collection))
    }
}

/// Save collection configuration.
pub fn save_config(workspace: &Path, config: &RagConfig) -> AppResult<()> {
    let config_path = get_config_path(workspace, &config.collection);

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            AppError::Config(format!("Failed to create config directory: {}", e))
        })?;
    }

    let yaml = serde_yaml::to_string(config)?;

    fs::write(&config_path, yaml).map_err(|e| {
        AppError::Config(format!("Failed to write config to {:?}: {}", config_path, e))
    })?;

    tracing::debug!("Saved collection config for '{}'", config.collection);
    Ok(())
}

/// Get the directory of a collection.
pub fn get_collection_dir(workspace: &Path, collection: &str) -> PathBuf {
    workspace.join(STATE_DIR).join("collections").join(collection)
}

/// Get the path to a collection's config file.
pub fn get_config_path(workspace: &Path, collection: &str) -> PathBuf {
    get_collection_dir(workspace, collection).join("config.yaml")
}

/// Get the SQLite index path for a collection.
pub fn get_index_path(workspace: &Path, collection: &str) -> PathBuf {
    get_collection_dir(workspace, collection).join("index.sqlite")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = RagConfig::default();
        assert_eq!(config.chunk_size, 400);
        assert_eq!(config.chunk_overlap, 50);
        assert_eq!(config.top_k_default, 5);
        assert_eq!(config.distance_metric, DistanceMetric::Cosine);
        assert_eq!(config.embedding_dimensions, None);
        assert_eq!(config.separators, vec!["\n\n", "\n", ". ", " ", ""]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk_size() {
        let config = RagConfig {
            chunk_size: 100,
            chunk_overlap: 100,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(AppError::ChunkingConfig {
                chunk_size: 100,
                overlap: 100
            })
        ));
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let cases = [
            RagConfig {
                embedding_batch_size: 0,
                ..Default::default()
            },
            RagConfig {
                top_k_default: 0,
                ..Default::default()
            },
            RagConfig {
                embedding_provider: "word2vec".into(),
                ..Default::default()
            },
            RagConfig {
                generation_provider: "nope".into(),
                ..Default::default()
            },
            RagConfig {
                embedding_dimensions: Some(0),
                ..Default::default()
            },
            RagConfig {
                embedding_initial_backoff_ms: 1000,
                embedding_max_backoff_ms: 10,
                ..Default::default()
            },
        ];
        for config in cases {
            assert!(
                matches!(config.validate(), Err(AppError::Config(_))),
                "expected config error for {:?}",
                config
            );
        }
    }

    #[test]
    fn test_load_default_config() {
        let temp = TempDir::new().unwrap();
        let config = load_config(temp.path(), "talks").unwrap();

        assert_eq!(config.collection, "talks");
        assert_eq!(config.embedding_provider, "ollama");
        assert_eq!(config.chunk_size, 400);
    }

    #[test]
    fn test_save_and_load_config() {
        let temp = TempDir::new().unwrap();
        let config = RagConfig {
            chunk_size: 1024,
            distance_metric: DistanceMetric::Euclidean,
            ..RagConfig::for_collection("handbook")
        };

        save_config(temp.path(), &config).unwrap();
        assert!(get_config_path(temp.path(), "handbook").exists());

        let loaded = load_config(temp.path(), "handbook").unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let path = get_config_path(temp.path(), "notes");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "chunk_size: 200\ndistance_metric: euclidean\n").unwrap();

        let config = load_config(temp.path(), "notes").unwrap();
        assert_eq!(config.chunk_size, 200);
        assert_eq!(config.chunk_overlap, 50);
        assert_eq!(config.distance_metric, DistanceMetric::Euclidean);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("GROUNDED_CHUNK_SIZE", "800"),
            ("GROUNDED_TOP_K", "3"),
            ("GROUNDED_DISTANCE_METRIC", "euclidean"),
            ("GROUNDED_GENERATION_MODEL", "mistral"),
        ]
        .into_iter()
        .collect();

        let mut config = RagConfig::default();
        config
            .apply_env_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.chunk_size, 800);
        assert_eq!(config.top_k_default, 3);
        assert_eq!(config.distance_metric, DistanceMetric::Euclidean);
        assert_eq!(config.generation_model, "mistral");
    }

    #[test]
    fn test_env_override_parse_error() {
        let mut config = RagConfig::default();
        let result = config.apply_env_overrides(|k| {
            (k == "GROUNDED_CHUNK_OVERLAP").then(|| "lots".to_string())
        });
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_retry_policy_from_config() {
        let policy = RagConfig::default().retry_policy();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.initial_backoff, Duration::from_millis(200));
        assert_eq!(policy.max_backoff, Duration::from_millis(5000));
    }
}
