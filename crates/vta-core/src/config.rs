//! Virtual TA configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, VtaError};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VtaConfig {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

impl VtaConfig {
    /// Load config from the default path (~/.vta/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| VtaError::Configuration(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| VtaError::Configuration(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| VtaError::Configuration(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Virtual TA home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".vta")
    }

    /// Reject parameter combinations that can never work.
    pub fn validate(&self) -> Result<()> {
        if self.embedding.dimensions == 0 {
            return Err(VtaError::Configuration("embedding.dimensions must be > 0".into()));
        }
        if self.chunking.max_tokens == 0 {
            return Err(VtaError::Configuration("chunking.max_tokens must be > 0".into()));
        }
        if self.chunking.overlap >= self.chunking.max_tokens {
            return Err(VtaError::Configuration(format!(
                "chunking.overlap ({}) must be smaller than chunking.max_tokens ({})",
                self.chunking.overlap, self.chunking.max_tokens
            )));
        }
        if self.ingest.batch_size == 0 {
            return Err(VtaError::Configuration("ingest.batch_size must be > 0".into()));
        }
        let t = self.index.similarity_threshold;
        if !t.is_finite() || !(-1.0..=1.0).contains(&t) {
            return Err(VtaError::Configuration(format!(
                "index.similarity_threshold must be within [-1, 1], got {t}"
            )));
        }
        if self.index.top_k == 0 {
            return Err(VtaError::Configuration("index.top_k must be >= 1".into()));
        }
        Ok(())
    }
}

/// Embedding provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    /// Empty means: look up the provider's env vars.
    #[serde(default)]
    pub api_key: String,
    /// Empty means: env override, then the registry default.
    #[serde(default)]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

fn default_provider() -> String { "openai".into() }
fn default_model() -> String { "text-embedding-3-small".into() }
fn default_dimensions() -> usize { 1536 }
fn default_timeout_secs() -> u64 { 60 }
fn default_max_retries() -> usize { 3 }

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            dimensions: default_dimensions(),
            api_key: String::new(),
            base_url: String::new(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

/// Vector index configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default = "default_index_path")]
    pub index_path: String,
    #[serde(default = "default_metadata_path")]
    pub metadata_path: String,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_index_path() -> String { "res/model/virtual-ta.index".into() }
fn default_metadata_path() -> String { "res/model/metadata.json".into() }
fn default_similarity_threshold() -> f32 { 0.35 }
fn default_top_k() -> usize { 15 }

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            index_path: default_index_path(),
            metadata_path: default_metadata_path(),
            similarity_threshold: default_similarity_threshold(),
            top_k: default_top_k(),
        }
    }
}

/// Token chunking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

fn default_max_tokens() -> usize { 8000 }
fn default_overlap() -> usize { 200 }

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            overlap: default_overlap(),
        }
    }
}

/// Ingestion configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_root")]
    pub root: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: usize,
    /// Texts shorter than this are never split further when the provider
    /// reports them as too long.
    #[serde(default = "default_min_split_chars")]
    pub min_split_chars: usize,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default = "default_collections")]
    pub collections: Vec<CollectionConfig>,
}

fn default_root() -> String { "res/".into() }
fn default_batch_size() -> usize { 16 }
fn default_max_consecutive_failures() -> usize { 8 }
fn default_min_split_chars() -> usize { 16 }
fn default_extensions() -> Vec<String> {
    vec!["txt", "html", "md"].into_iter().map(String::from).collect()
}

/// Course site pages and forum threads as scraped into `res/`.
fn default_collections() -> Vec<CollectionConfig> {
    vec![
        CollectionConfig {
            dir: "res/discourse_content".into(),
            kind: "docs_site".into(),
            base_url: "https://tds.s-anand.net/#/".into(),
            threads_dir: None,
        },
        CollectionConfig {
            dir: "res/discourse_posts".into(),
            kind: "forum_thread".into(),
            base_url: "https://discourse.onlinedegree.iitm.ac.in".into(),
            threads_dir: Some("res/discourse_threads".into()),
        },
    ]
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            batch_size: default_batch_size(),
            max_consecutive_failures: default_max_consecutive_failures(),
            min_split_chars: default_min_split_chars(),
            extensions: default_extensions(),
            collections: default_collections(),
        }
    }
}

/// A document collection with its own provenance scheme.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Directory holding the collection's files.
    pub dir: String,
    /// Resolver kind, e.g. "docs_site" or "forum_thread".
    pub kind: String,
    #[serde(default)]
    pub base_url: String,
    /// Side directory with per-thread JSON (forum collections only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threads_dir: Option<String>,
}
