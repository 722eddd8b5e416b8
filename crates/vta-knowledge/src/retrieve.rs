//! Query path: question variants → excerpts.

use std::sync::Arc;

use vta_core::error::{Result, VtaError};
use vta_core::traits::Embedder;

use crate::excerpt::Excerpt;
use crate::normalize::normalize;
use crate::shared::SharedIndex;

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: SharedIndex,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: SharedIndex) -> Self {
        Self { embedder, index }
    }

    pub fn index(&self) -> &SharedIndex {
        &self.index
    }

    /// Embed each query variant, search `k` per variant and assemble excerpts.
    ///
    /// Hit lists are concatenated in variant order, so a chunk found by
    /// several variants is cited once at its first appearance. No qualifying
    /// hits yields an empty list.
    pub async fn retrieve(&self, queries: &[&str], k: usize) -> Result<Vec<Excerpt>> {
        let mut embedded = Vec::with_capacity(queries.len());
        for query in queries {
            if query.trim().is_empty() {
                return Err(VtaError::InvalidQuery("query cannot be empty".into()));
            }
            let raw = self.embedder.embed(query).await?;
            let unit = normalize(&raw)
                .map_err(|e| VtaError::InvalidQuery(format!("query embedding unusable: {e}")))?;
            embedded.push(unit);
        }

        let excerpts = self.index.search_excerpts(&embedded, k).await?;
        tracing::debug!(
            "Retrieved {} excerpts for {} query variant(s)",
            excerpts.len(),
            queries.len()
        );
        Ok(excerpts)
    }
}
