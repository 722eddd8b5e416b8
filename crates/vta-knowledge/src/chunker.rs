//! Token-bounded chunking with overlap.
//!
//! Chunk size is measured in tokens of the embedding model's tokenizer,
//! not characters or words, so a chunk never exceeds the model's context.

use std::sync::Arc;

use tiktoken_rs::CoreBPE;
use vta_core::error::{Result, VtaError};

/// Text ⇄ token id codec.
pub trait TokenCodec: Send + Sync {
    fn encode(&self, text: &str) -> Vec<u32>;
    fn decode(&self, tokens: &[u32]) -> Result<String>;
}

/// The cl100k_base BPE used by `text-embedding-3-*` models.
pub struct Cl100kTokenizer {
    bpe: CoreBPE,
}

impl Cl100kTokenizer {
    pub fn new() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base()
            .map_err(|e| VtaError::Tokenizer(format!("Failed to load cl100k_base: {e}")))?;
        Ok(Self { bpe })
    }
}

impl TokenCodec for Cl100kTokenizer {
    fn encode(&self, text: &str) -> Vec<u32> {
        self.bpe.encode_ordinary(text)
    }

    /// Lossy: a window edge inside a multibyte character decodes to U+FFFD.
    /// Tokens must come from `encode`.
    fn decode(&self, tokens: &[u32]) -> Result<String> {
        let bytes: Vec<u8> = self
            .bpe
            ._decode_native_and_split(tokens.to_vec())
            .flatten()
            .collect();
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Sliding-window chunker: windows of `max_tokens`, stride `max_tokens - overlap`.
#[derive(Clone)]
pub struct TokenChunker {
    tokenizer: Arc<dyn TokenCodec>,
    max_tokens: usize,
    overlap: usize,
}

impl TokenChunker {
    /// Fails fast when the stride would be non-positive.
    pub fn new(tokenizer: Arc<dyn TokenCodec>, max_tokens: usize, overlap: usize) -> Result<Self> {
        if max_tokens == 0 {
            return Err(VtaError::Configuration("max_tokens must be > 0".into()));
        }
        if overlap >= max_tokens {
            return Err(VtaError::Configuration(format!(
                "overlap ({overlap}) must be smaller than max_tokens ({max_tokens})"
            )));
        }
        Ok(Self {
            tokenizer,
            max_tokens,
            overlap,
        })
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Token windows of `text` after newline collapsing.
    ///
    /// The last window is the first one that reaches the end of the token
    /// stream; no trailing window is emitted that lies wholly inside the
    /// previous one's overlap.
    pub fn token_windows(&self, text: &str) -> Vec<Vec<u32>> {
        let tokens = self.tokenizer.encode(&collapse_newlines(text));
        let stride = self.max_tokens - self.overlap;
        let mut windows = Vec::new();
        let mut start = 0;
        while start < tokens.len() {
            let end = (start + self.max_tokens).min(tokens.len());
            windows.push(tokens[start..end].to_vec());
            if end == tokens.len() {
                break;
            }
            start += stride;
        }
        windows
    }

    /// Split `text` into decoded chunks. Empty input yields no chunks.
    pub fn chunk(&self, text: &str) -> Result<Vec<String>> {
        self.token_windows(text)
            .iter()
            .map(|window| self.tokenizer.decode(window))
            .collect()
    }
}

fn collapse_newlines(text: &str) -> String {
    text.replace("\r\n", " ").replace(['\n', '\r'], " ")
}
