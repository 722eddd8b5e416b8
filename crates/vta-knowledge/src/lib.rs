//! # Virtual TA Knowledge
//!
//! Retrieval core: turns a directory of course documents into a searchable
//! vector index and turns search hits into prompt-ready excerpts.
//!
//! ## Design
//! - **Token chunking**: windows of `max_tokens` cl100k tokens with overlap
//! - **Unit vectors**: every stored embedding has norm 1, so inner product is cosine
//! - **Exact search**: brute-force inner-product scan, deterministic tie-break
//! - **Unified entries**: a vector and its metadata live in one record, never drift
//! - **Two-file persistence**: binary vectors + JSON metadata, validated on load
//!
//! ## How it works
//! ```text
//! res/**/*.{txt,html,md}
//!   ↓ loader (strip markup)
//! TokenChunker (8000 tokens, 200 overlap)
//!   ↓ batches of 16
//! Embedder → safe_embed (halve on "too long") → normalize
//!   ↓
//! VectorIndex.add → save(index, metadata.json)
//!
//! Question ─→ Embedder → VectorIndex.search(k) ─→ assemble → build_prompt
//! ```

pub mod chunker;
pub mod excerpt;
pub mod index;
pub mod ingest;
pub mod loader;
pub mod normalize;
pub mod persist;
pub mod prompt;
pub mod provenance;
pub mod retrieve;
pub mod shared;

pub use chunker::{Cl100kTokenizer, TokenChunker, TokenCodec};
pub use excerpt::{Excerpt, MetadataLookup, assemble};
pub use index::{ChunkMetadata, IndexEntry, SearchHit, VectorIndex};
pub use ingest::{IngestPipeline, IngestReport};
pub use normalize::{normalize, safe_embed};
pub use provenance::{ProvenanceRegistry, SourceResolver};
pub use retrieve::Retriever;
pub use shared::SharedIndex;
