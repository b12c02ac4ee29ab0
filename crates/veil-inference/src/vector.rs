//! Vector similarity functions.

use crate::errors::{InferenceError, Result};

/// Compute the L2 (Euclidean) norm of a vector.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine similarity of two equal-length vectors.
///
/// Returns 0 when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(InferenceError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);
    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }
    Ok(dot / (norm_a * norm_b))
}

/// Component-wise mean of equal-length vectors.
///
/// Returns `None` for an empty input.
pub fn mean_vector(vectors: &[Vec<f32>]) -> Result<Option<Vec<f32>>> {
    let Some(first) = vectors.first() else {
        return Ok(None);
    };
    let mut sum = vec![0.0_f32; first.len()];
    for v in vectors {
        if v.len() != sum.len() {
            return Err(InferenceError::DimensionMismatch {
                left: sum.len(),
                right: v.len(),
            });
        }
        for (acc, x) in sum.iter_mut().zip(v) {
            *acc += x;
        }
    }
    let n = vectors.len() as f32;
    for acc in &mut sum {
        *acc /= n;
    }
    Ok(Some(sum))
}
