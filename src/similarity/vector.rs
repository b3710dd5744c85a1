//! Distance and similarity primitives over fixed-length vectors.
//!
//! Accumulation is done in `f64` so that 768-dimensional embeddings do not
//! lose precision before the final cast.

use crate::error::VectorError;

#[inline]
fn check_dimensions(a: &[f32], b: &[f32]) -> Result<(), VectorError> {
    if a.len() != b.len() {
        return Err(VectorError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    Ok(())
}

/// Euclidean norm of `a - b`.
pub fn distance(a: &[f32], b: &[f32]) -> Result<f32, VectorError> {
    check_dimensions(a, b)?;

    let sum: f64 = a
        .iter()
        .zip(b)
        .map(|(x, y)| {
            let d = *x as f64 - *y as f64;
            d * d
        })
        .sum();

    Ok(sum.sqrt() as f32)
}

/// Cosine similarity of `a` and `b`.
///
/// Returns `0.0` when either vector has zero magnitude. The result is clamped
/// to `[-1, 1]`.
pub fn similarity(a: &[f32], b: &[f32]) -> Result<f32, VectorError> {
    check_dimensions(a, b)?;

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }

    let cosine = dot / (norm_a.sqrt() * norm_b.sqrt());
    Ok(cosine.clamp(-1.0, 1.0) as f32)
}
