// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vector normalization and similarity primitives.

use crate::errors::DimensionMismatch;

/// Euclidean (L2) norm of a vector.
pub fn l2_norm(vector: &[f32]) -> f32 {
    vector.iter().map(|v| v * v).sum::<f32>().sqrt()
}

/// Scales `vector` in place to unit length.
///
/// A zero vector is left unchanged.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = l2_norm(vector);
    if norm == 0.0 {
        return;
    }
    for value in vector.iter_mut() {
        *value /= norm;
    }
}

/// Returns a unit-length copy of `vector`, or the vector unchanged if its norm is zero.
pub fn normalize(vector: &[f32]) -> Vec<f32> {
    let mut out = vector.to_vec();
    l2_normalize(&mut out);
    out
}

/// Dot product of two equal-length vectors.
pub fn dot(a: &[f32], b: &[f32]) -> Result<f32, DimensionMismatch> {
    check_dims(a, b)?;
    Ok(a.iter().zip(b.iter()).map(|(x, y)| x * y).sum())
}

/// Computes cosine similarity between two vectors.
///
/// Magnitudes are computed on every call, so inputs need not be unit length.
/// If either vector has zero magnitude the similarity is `0.0`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, DimensionMismatch> {
    let dot_product = dot(a, b)?;
    let magnitude_a = l2_norm(a);
    let magnitude_b = l2_norm(b);

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return Ok(0.0);
    }

    Ok(dot_product / (magnitude_a * magnitude_b))
}

fn check_dims(a: &[f32], b: &[f32]) -> Result<(), DimensionMismatch> {
    if a.len() != b.len() {
        return Err(DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    Ok(())
}
