//! Unit normalization and length-tolerant embedding.

use vta_core::error::{Result, VtaError};
use vta_core::traits::Embedder;

/// Euclidean length, accumulated in f64 so large or tiny components
/// neither overflow nor underflow.
pub(crate) fn l2_norm(v: &[f32]) -> f64 {
    v.iter().map(|&x| f64::from(x) * f64::from(x)).sum::<f64>().sqrt()
}

/// Scale `raw` to unit length. Zero or non-finite norms are rejected.
pub fn normalize(raw: &[f32]) -> Result<Vec<f32>> {
    let norm = l2_norm(raw);
    if !norm.is_finite() {
        return Err(VtaError::DegenerateVector(format!("non-finite norm ({norm})")));
    }
    if norm == 0.0 {
        return Err(VtaError::DegenerateVector("zero norm".into()));
    }
    Ok(raw.iter().map(|&x| (f64::from(x) / norm) as f32).collect())
}

/// Elementwise mean of two unit vectors, re-normalized.
fn merge_halves(left: &[f32], right: &[f32]) -> Result<Vec<f32>> {
    let mean: Vec<f32> = left.iter().zip(right).map(|(a, b)| (a + b) / 2.0).collect();
    normalize(&mean)
}

enum Step<'a> {
    Embed(&'a str),
    Merge,
}

/// Embed `text`, halving it whenever the provider reports it as too long.
///
/// Halves are embedded independently and merged bottom-up: each merge is
/// the re-normalized mean of the two halves' unit vectors. The work list is
/// explicit, and a text shorter than `min_split_chars` that is still too
/// long becomes a hard failure. Every other provider error is returned as is.
pub async fn safe_embed(embedder: &dyn Embedder, text: &str, min_split_chars: usize) -> Result<Vec<f32>> {
    let floor = min_split_chars.max(1);
    let mut steps = vec![Step::Embed(text)];
    let mut done: Vec<Vec<f32>> = Vec::new();

    while let Some(step) = steps.pop() {
        match step {
            Step::Embed(part) => match embedder.embed(part).await {
                Ok(raw) => done.push(normalize(&raw)?),
                Err(e) if e.is_input_too_long() => {
                    let chars = part.chars().count();
                    if chars < floor.saturating_mul(2) {
                        return Err(VtaError::InputTooLong(format!(
                            "{chars} chars still too long and below split floor of {floor}: {e}"
                        )));
                    }
                    let (left, right) = split_midpoint(part, chars);
                    tracing::debug!("Splitting {chars}-char input for {}", embedder.name());
                    // Popped in reverse: left, right, then merge.
                    steps.push(Step::Merge);
                    steps.push(Step::Embed(right));
                    steps.push(Step::Embed(left));
                }
                Err(e) => return Err(e),
            },
            Step::Merge => {
                let right = done.pop();
                let left = done.pop();
                match (left, right) {
                    (Some(l), Some(r)) => done.push(merge_halves(&l, &r)?),
                    _ => return Err(VtaError::Embedding("split bookkeeping out of sync".into())),
                }
            }
        }
    }

    done.pop()
        .ok_or_else(|| VtaError::Embedding("no embedding produced".into()))
}

/// Split at the middle character, keeping UTF-8 boundaries intact.
fn split_midpoint(text: &str, chars: usize) -> (&str, &str) {
    let mid = text
        .char_indices()
        .nth(chars / 2)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    text.split_at(mid)
}
