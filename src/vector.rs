//! This is the vector math module
//! Provide magnitude, dot product and cosine similarity

use crate::error::{Error, Result};

/// Magnitude (L2 norm)
/// ||vec|| = sqrt(sum(vec[i]^2))
pub fn magnitude(vector: &[f32]) -> f32 {
    norm(vector) as f32
}

/// Dot Product
/// dot_prod = sum(a[i] * b[i]) for i = 0..a.len()
/// Can only process vectors with same dimensions
pub fn dot_product(left: &[f32], right: &[f32]) -> Result<f32> {
    if left.len() != right.len() {
        return Err(Error::DimensionMismatch { expected: left.len(), actual: right.len() });
    }

    Ok(dot(left, right) as f32)
}

/// Cosine Similarity
/// cos = dot(a, b) / (||a|| * ||b||)
/// Zero vectors have no direction, so they are an error instead of NaN
pub fn cosine_similarity(left: &[f32], right: &[f32]) -> Result<f32> {
    if left.len() != right.len() {
        return Err(Error::DimensionMismatch { expected: left.len(), actual: right.len() });
    }

    cosine_with_norm(left, right, norm(right))
}

/// Cosine similarity when `right`'s norm is already known, for scoring one
/// query against many rows. Lengths are not checked.
pub(crate) fn cosine_with_norm(left: &[f32], right: &[f32], right_norm: f64) -> Result<f32> {
    let norms = norm(left) * right_norm;
    if norms == 0.0 || !norms.is_finite() {
        return Err(Error::ZeroVector);
    }

    let cos = dot(left, right) / norms;
    if !cos.is_finite() {
        return Err(Error::ZeroVector);
    }
    Ok(cos as f32)
}

/// A vector can be stored only if every component is finite
/// and it has a non-zero magnitude.
pub fn is_rankable(vector: &[f32]) -> bool {
    vector.iter().all(|x| x.is_finite()) && norm(vector) > 0.0
}

// Accumulated in f64: squares of finite f32 values cannot overflow or
// underflow to zero there, so every finite non-zero vector has a usable norm.
pub(crate) fn norm(vector: &[f32]) -> f64 {
    vector.iter()
        .map(|&x| f64::from(x) * f64::from(x))
        .sum::<f64>()
        .sqrt()
}

fn dot(left: &[f32], right: &[f32]) -> f64 {
    left.iter()
        .zip(right.iter())
        .map(|(&x, &y)| f64::from(x) * f64::from(y))
        .sum()
}
