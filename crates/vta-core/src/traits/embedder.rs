//! Embedding provider trait.

use async_trait::async_trait;

use crate::error::Result;

/// An external text → vector model.
///
/// Implementations return raw (not necessarily unit-length) vectors of
/// `dimensions()` floats. A failure caused by input length must surface as
/// [`VtaError::InputTooLong`](crate::error::VtaError::InputTooLong) so
/// callers can split the text; retries belong inside the implementation.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Provider name, for logs.
    fn name(&self) -> &str;

    /// Length of every vector this embedder returns.
    fn dimensions(&self) -> usize;

    /// Embed one text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts in one round trip. Output order matches input.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}
