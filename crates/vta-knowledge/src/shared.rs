//! Concurrency wrapper around [`VectorIndex`].
//!
//! Searches share a read lock; appends and reloads take the write lock, so
//! a search never observes a vector without its metadata.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use vta_core::error::Result;

use crate::excerpt::{Excerpt, assemble};
use crate::index::{ChunkMetadata, SearchHit, VectorIndex};

/// Cloneable handle to one index.
#[derive(Clone)]
pub struct SharedIndex {
    inner: Arc<RwLock<VectorIndex>>,
}

impl SharedIndex {
    pub fn new(index: VectorIndex) -> Self {
        Self {
            inner: Arc::new(RwLock::new(index)),
        }
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, VectorIndex> {
        self.inner.read().await
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, VectorIndex> {
        self.inner.write().await
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    pub async fn embed_dim(&self) -> usize {
        self.inner.read().await.embed_dim()
    }

    pub async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        self.inner.read().await.search(query, k)
    }

    /// Search every query and assemble excerpts under a single read lock.
    ///
    /// Hits are concatenated in query order before deduplication.
    pub async fn search_excerpts(&self, queries: &[Vec<f32>], k: usize) -> Result<Vec<Excerpt>> {
        let index = self.inner.read().await;
        let mut hits = Vec::new();
        for query in queries {
            hits.extend(index.search(query, k)?);
        }
        Ok(assemble(&hits, &*index))
    }

    pub async fn add(&self, vectors: Vec<Vec<f32>>, metadata: Vec<ChunkMetadata>) -> Result<()> {
        self.inner.write().await.add(vectors, metadata)
    }

    pub async fn save(&self, index_path: &Path, meta_path: &Path) -> Result<()> {
        self.inner.read().await.save(index_path, meta_path)
    }

    pub async fn reload(&self, index_path: &Path, meta_path: &Path) -> Result<()> {
        self.inner.write().await.reload(index_path, meta_path)
    }
}

impl From<VectorIndex> for SharedIndex {
    fn from(index: VectorIndex) -> Self {
        Self::new(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared() -> SharedIndex {
        SharedIndex::new(VectorIndex::new(2, 0.0).unwrap())
    }

    #[tokio::test]
    async fn test_concurrent_search_during_add() {
        let index = shared();
        index
            .add(vec![vec![1.0, 0.0]], vec![ChunkMetadata::new("seed", 0, "seed")])
            .await
            .unwrap();

        let writer = {
            let index = index.clone();
            tokio::spawn(async move {
                for i in 0..50 {
                    index
                        .add(vec![vec![1.0, i as f32]], vec![ChunkMetadata::new("w", i, "w")])
                        .await
                        .unwrap();
                }
            })
        };
        let reader = {
            let index = index.clone();
            tokio::spawn(async move {
                for _ in 0..50 {
                    let excerpts = index.search_excerpts(&[vec![1.0, 0.0]], 100).await.unwrap();
                    assert!(!excerpts.is_empty());
                }
            })
        };
        writer.await.unwrap();
        reader.await.unwrap();
        assert_eq!(index.len().await, 51);
    }

    #[tokio::test]
    async fn test_search_excerpts_dedupes_across_queries() {
        let index = shared();
        index
            .add(
                vec![vec![1.0, 0.0], vec![0.0, 1.0]],
                vec![ChunkMetadata::new("a", 0, "east"), ChunkMetadata::new("b", 0, "north")],
            )
            .await
            .unwrap();
        let excerpts = index
            .search_excerpts(&[vec![0.0, 1.0], vec![1.0, 0.0], vec![0.0, 1.0]], 1)
            .await
            .unwrap();
        let texts: Vec<&str> = excerpts.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["north", "east"]);
    }

    #[tokio::test]
    async fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let (ip, mp) = (dir.path().join("v.index"), dir.path().join("m.json"));
        let index = shared();
        index
            .add(vec![vec![3.0, 4.0]], vec![ChunkMetadata::new("a", 0, "x")])
            .await
            .unwrap();
        index.save(&ip, &mp).await.unwrap();
        index
            .add(vec![vec![1.0, 0.0]], vec![ChunkMetadata::new("a", 1, "y")])
            .await
            .unwrap();
        assert_eq!(index.len().await, 2);

        index.reload(&ip, &mp).await.unwrap();
        assert_eq!(index.len().await, 1);
        let guard = index.read().await;
        assert!((guard.get(0).unwrap().vector[0] - 0.6).abs() < 1e-6);
    }
}
