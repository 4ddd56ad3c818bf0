//! Dense vector arithmetic
//!
//! All helpers treat mismatched dimensions as a caller bug surfaced through
//! [`Error::Validation`] where the result would otherwise be meaningless.

mod cache;

pub use cache::*;

use crate::error::{Error, Result};

/// Element-wise `a + scale * b`
pub fn add_scaled(a: &[f32], b: &[f32], scale: f32) -> Result<Vec<f32>> {
    if a.len() != b.len() {
        return Err(Error::Validation(format!(
            "Vectors must have same dimension ({} vs {})",
            a.len(),
            b.len()
        )));
    }
    Ok(a.iter().zip(b).map(|(x, y)| x + scale * y).collect())
}

pub fn scale(vector: &[f32], factor: f32) -> Vec<f32> {
    vector.iter().map(|v| v * factor).collect()
}

/// L2-normalise; the zero vector is returned unchanged
pub fn normalize(vector: &[f32]) -> Vec<f32> {
    let norm = l2_norm(vector);
    if norm == 0.0 {
        return vector.to_vec();
    }
    vector.iter().map(|v| v / norm).collect()
}

pub fn l2_norm(vector: &[f32]) -> f32 {
    vector.iter().map(|v| v * v).sum::<f32>().sqrt()
}

/// Cosine similarity; 0.0 for empty, mismatched or zero vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let mag_a = l2_norm(a);
    let mag_b = l2_norm(b);
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

/// Element-wise mean of equally sized vectors
pub fn mean<'a, I>(vectors: I) -> Option<Vec<f32>>
where
    I: IntoIterator<Item = &'a [f32]>,
{
    let mut iter = vectors.into_iter();
    let mut sum = iter.next()?.to_vec();
    let mut count = 1usize;
    for v in iter {
        for (acc, x) in sum.iter_mut().zip(v) {
            *acc += x;
        }
        count += 1;
    }
    Some(scale(&sum, 1.0 / count as f32))
}

/// Strength-weighted average of vectors, re-normalised
pub fn combine_weighted(vectors: &[(Vec<f32>, f32)]) -> Result<Vec<f32>> {
    let (first, _) = vectors
        .first()
        .ok_or_else(|| Error::Validation("No vectors to combine".to_string()))?;

    let mut combined = vec![0.0f32; first.len()];
    let mut total_weight = 0.0f32;
    for (vector, weight) in vectors {
        combined = add_scaled(&combined, vector, *weight)?;
        total_weight += weight;
    }

    if total_weight > 0.0 {
        combined = scale(&combined, 1.0 / total_weight);
    }
    Ok(normalize(&combined))
}
