//! Search hits → deduplicated, prompt-ready excerpts.

use std::collections::HashSet;

use serde::Serialize;

use crate::index::{ChunkMetadata, SearchHit, VectorIndex};

/// One chunk of grounding text with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Excerpt {
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// Resolves a hit position to its metadata record.
pub trait MetadataLookup {
    fn metadata_at(&self, position: usize) -> Option<&ChunkMetadata>;
}

impl MetadataLookup for VectorIndex {
    fn metadata_at(&self, position: usize) -> Option<&ChunkMetadata> {
        self.metadata(position)
    }
}

impl MetadataLookup for [ChunkMetadata] {
    fn metadata_at(&self, position: usize) -> Option<&ChunkMetadata> {
        self.get(position)
    }
}

impl MetadataLookup for Vec<ChunkMetadata> {
    fn metadata_at(&self, position: usize) -> Option<&ChunkMetadata> {
        self.get(position)
    }
}

/// Walk `hits` in rank order and keep the first hit for each `(source, chunk_id)`.
///
/// Hits from several query variants may be concatenated; a chunk retrieved
/// by more than one of them is cited once, at its earliest rank. Positions
/// the lookup cannot resolve are skipped.
pub fn assemble<L: MetadataLookup + ?Sized>(hits: &[SearchHit], lookup: &L) -> Vec<Excerpt> {
    let mut seen: HashSet<(&str, usize)> = HashSet::new();
    let mut excerpts = Vec::new();
    for hit in hits {
        let Some(meta) = lookup.metadata_at(hit.position) else {
            tracing::warn!("Search hit at position {} has no metadata", hit.position);
            continue;
        };
        if seen.insert((meta.source.as_str(), meta.chunk_id)) {
            excerpts.push(Excerpt {
                text: meta.text.clone(),
                metadata: meta.clone(),
            });
        }
    }
    excerpts
}
