//! Similarity computation for embeddings.

use crate::error::{EmbeddingError, Result};

fn check_dimensions(a: &[f32], b: &[f32]) -> Result<()> {
    if a.len() != b.len() {
        return Err(EmbeddingError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    Ok(())
}

/// Compute the dot product between two embeddings.
///
/// Equal to cosine similarity only when both vectors have unit length.
pub fn dot_product(a: &[f32], b: &[f32]) -> Result<f32> {
    check_dimensions(a, b)?;
    Ok(a.iter().zip(b.iter()).map(|(x, y)| x * y).sum())
}

/// Compute the cosine similarity between two embeddings.
///
/// Returns a value between -1.0 and 1.0, where:
/// - 1.0 means identical direction
/// - 0.0 means orthogonal vectors (or either vector is all zeros)
/// - -1.0 means opposite vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    let dot = dot_product(a, b)?;
    let magnitude_a = magnitude(a);
    let magnitude_b = magnitude(b);

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return Ok(0.0);
    }

    Ok(dot / (magnitude_a * magnitude_b))
}

fn magnitude(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Normalize an embedding to unit length in place. Zero vectors are left as is.
pub fn normalize(embedding: &mut [f32]) {
    let magnitude = magnitude(embedding);
    if magnitude > 0.0 {
        for x in embedding.iter_mut() {
            *x /= magnitude;
        }
    }
}

/// Whether every component is exactly zero.
pub fn is_zero(embedding: &[f32]) -> bool {
    embedding.iter().all(|x| *x == 0.0)
}
