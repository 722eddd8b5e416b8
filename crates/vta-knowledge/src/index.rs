//! Exact inner-product vector index.
//!
//! Each vector is stored together with its provenance in one [`IndexEntry`],
//! so position `i` always describes vector `i`. Entries are append-only.

use std::cmp::Ordering;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use vta_core::error::{Result, VtaError};

use crate::normalize::normalize;
use crate::persist;

/// Provenance of one indexed chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: String,
    pub chunk_id: usize,
    pub text: String,
    /// Fields written by other tools, carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChunkMetadata {
    pub fn new(source: impl Into<String>, chunk_id: usize, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            chunk_id,
            text: text.into(),
            extra: Map::new(),
        }
    }
}

/// A unit vector and the chunk it was computed from.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub vector: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// A ranked search result: entry position and raw inner product.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SearchHit {
    pub position: usize,
    pub score: f32,
}

/// Brute-force inner-product index over unit vectors.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    embed_dim: usize,
    similarity_threshold: f32,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    pub fn new(embed_dim: usize, similarity_threshold: f32) -> Result<Self> {
        if embed_dim == 0 {
            return Err(VtaError::Configuration("embed_dim must be > 0".into()));
        }
        Ok(Self {
            embed_dim,
            similarity_threshold,
            entries: Vec::new(),
        })
    }

    pub fn embed_dim(&self) -> usize {
        self.embed_dim
    }

    pub fn similarity_threshold(&self) -> f32 {
        self.similarity_threshold
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn get(&self, position: usize) -> Option<&IndexEntry> {
        self.entries.get(position)
    }

    pub fn metadata(&self, position: usize) -> Option<&ChunkMetadata> {
        self.entries.get(position).map(|e| &e.metadata)
    }

    /// Append vectors with their metadata.
    ///
    /// The batch is validated in full before anything is stored: a length,
    /// dimension or norm problem anywhere rejects the whole batch and leaves
    /// the index unchanged. Accepted vectors are stored unit-normalized.
    pub fn add(&mut self, vectors: Vec<Vec<f32>>, metadata: Vec<ChunkMetadata>) -> Result<()> {
        if vectors.len() != metadata.len() {
            return Err(VtaError::Alignment {
                vectors: vectors.len(),
                metadata: metadata.len(),
            });
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.embed_dim) {
            return Err(VtaError::DimensionMismatch {
                expected: self.embed_dim,
                actual: bad.len(),
            });
        }
        let normalized = vectors
            .iter()
            .map(|v| normalize(v))
            .collect::<Result<Vec<_>>>()?;

        self.entries.extend(
            normalized
                .into_iter()
                .zip(metadata)
                .map(|(vector, metadata)| IndexEntry { vector, metadata }),
        );
        Ok(())
    }

    /// Top `k` entries by inner product with `query`, at or above the threshold.
    ///
    /// Ordered by descending score; equal scores keep ascending position.
    /// Fewer than `k` qualifying entries returns all of them.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Err(VtaError::InvalidQuery("k must be >= 1".into()));
        }
        if query.len() != self.embed_dim {
            return Err(VtaError::DimensionMismatch {
                expected: self.embed_dim,
                actual: query.len(),
            });
        }

        let mut hits: Vec<SearchHit> = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| SearchHit {
                position,
                score: dot(query, &entry.vector),
            })
            .filter(|hit| hit.score >= self.similarity_threshold)
            .collect();

        hits.sort_by(|a, b| match b.score.total_cmp(&a.score) {
            Ordering::Equal => a.position.cmp(&b.position),
            other => other,
        });
        hits.truncate(k);
        Ok(hits)
    }

    /// Write vectors to `index_path` and metadata to `meta_path`.
    pub fn save(&self, index_path: &Path, meta_path: &Path) -> Result<()> {
        persist::save(self, index_path, meta_path)?;
        tracing::info!(
            "💾 Saved {} vectors to {} and {}",
            self.len(),
            index_path.display(),
            meta_path.display()
        );
        Ok(())
    }

    /// Read a saved pair into a fresh index.
    pub fn load(
        embed_dim: usize,
        similarity_threshold: f32,
        index_path: &Path,
        meta_path: &Path,
    ) -> Result<Self> {
        let mut index = Self::new(embed_dim, similarity_threshold)?;
        index.reload(index_path, meta_path)?;
        Ok(index)
    }

    /// Replace the contents with a saved pair. On any error the current
    /// contents are kept, so repeating a load is harmless.
    pub fn reload(&mut self, index_path: &Path, meta_path: &Path) -> Result<()> {
        let entries = persist::load(self.embed_dim, index_path, meta_path)?;
        self.entries = entries;
        Ok(())
    }

    /// Load the pair when either file exists, otherwise start empty.
    ///
    /// Every load error is returned, including `CorruptIndex` for a
    /// half-present pair. Use this before appending and saving, so a
    /// damaged pair is never silently overwritten.
    pub fn load_or_new(
        embed_dim: usize,
        similarity_threshold: f32,
        index_path: &Path,
        meta_path: &Path,
    ) -> Result<Self> {
        if !index_path.exists() && !meta_path.exists() {
            tracing::info!("No saved index at {}, starting empty", index_path.display());
            return Self::new(embed_dim, similarity_threshold);
        }
        let index = Self::load(embed_dim, similarity_threshold, index_path, meta_path)?;
        tracing::info!("📚 Loaded {} vectors from {}", index.len(), index_path.display());
        Ok(index)
    }

    /// Like [`load_or_new`](Self::load_or_new), for read-only callers.
    ///
    /// A corrupt pair is reported and replaced by an empty index rather
    /// than partially loaded. Other errors (e.g. a dimension that does not
    /// match `embed_dim`) are returned.
    pub fn open(
        embed_dim: usize,
        similarity_threshold: f32,
        index_path: &Path,
        meta_path: &Path,
    ) -> Result<Self> {
        match Self::load_or_new(embed_dim, similarity_threshold, index_path, meta_path) {
            Err(VtaError::CorruptIndex(reason)) => {
                tracing::error!(
                    "Rejected index pair {} / {}: {reason}; starting empty",
                    index_path.display(),
                    meta_path.display()
                );
                Self::new(embed_dim, similarity_threshold)
            }
            other => other,
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
