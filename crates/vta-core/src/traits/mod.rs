//! Trait seams for external collaborators.

pub mod embedder;

pub use embedder::Embedder;
