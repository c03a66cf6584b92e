//! Shared distance functions for vector similarity computation.
//!
//! Used by both BruteForceBackend and IvfBackend.
//!
//! All values are distances: lower = closer. Functions are
//! single-threaded for determinism. No implicit normalization of
//! vectors; they are used as-is.

use corpus_core::DistanceMetric;

/// Compute the distance between two vectors under the given metric.
pub fn compute_distance(a: &[f32], b: &[f32], metric: DistanceMetric) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "dimension mismatch in distance computation");

    match metric {
        DistanceMetric::Cosine => cosine_distance(a, b),
        DistanceMetric::SquaredEuclidean => squared_euclidean(a, b),
    }
}

/// Cosine distance: 1 - dot(a,b) / (||a|| * ||b||)
///
/// Range: [0, 2], lower = closer.
/// If either vector has zero norm the similarity is taken as 0,
/// giving distance 1.0 (avoids division by zero).
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot = dot_product(a, b);
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);

    if norm_a == 0.0 || norm_b == 0.0 {
        1.0
    } else {
        1.0 - dot / (norm_a * norm_b)
    }
}

/// Squared Euclidean distance: sum((a_i - b_i)^2)
///
/// Range: [0, inf), lower = closer. The square root is omitted since
/// it does not change the ranking.
pub fn squared_euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum()
}

/// Dot product (inner product)
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// L2 norm (Euclidean length)
fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}
