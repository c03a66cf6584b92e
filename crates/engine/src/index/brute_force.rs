//! Brute-force vector search backend
//!
//! Exact O(n) scan. This is the reference implementation and the
//! serving path for collections below the configured size threshold,
//! where a linear scan is also the performance-adequate choice.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use corpus_core::{DistanceMetric, RecordSeq};

use super::backend::VectorIndexBackend;
use super::distance::compute_distance;
use super::ivf::{ClusterGeneration, RebuildJob};

/// Exact brute-force search backend
///
/// Vectors live in a BTreeMap keyed by RecordSeq so iteration is in
/// insertion order, which keeps scoring and tie-breaking
/// deterministic.
pub struct BruteForceBackend {
    dimension: usize,
    vectors: BTreeMap<RecordSeq, Vec<f32>>,
}

impl BruteForceBackend {
    /// Create an empty backend for the given dimension
    pub fn new(dimension: usize) -> Self {
        BruteForceBackend {
            dimension,
            vectors: BTreeMap::new(),
        }
    }

    /// Iterate (seq, vector) in ascending seq order
    pub fn iter(&self) -> impl Iterator<Item = (RecordSeq, &[f32])> {
        self.vectors.iter().map(|(seq, v)| (*seq, v.as_slice()))
    }
}

impl VectorIndexBackend for BruteForceBackend {
    fn insert(&mut self, seq: RecordSeq, vector: &[f32]) {
        debug_assert_eq!(vector.len(), self.dimension);
        self.vectors.insert(seq, vector.to_vec());
    }

    fn delete(&mut self, seq: RecordSeq) -> bool {
        self.vectors.remove(&seq).is_some()
    }

    fn search(&self, query: &[f32], k: usize, metric: DistanceMetric) -> Vec<(RecordSeq, f32)> {
        if k == 0 || self.vectors.is_empty() {
            return Vec::new();
        }

        // BTreeMap iteration is in seq order, so scoring happens in a
        // deterministic order before the sort.
        let mut results: Vec<(RecordSeq, f32)> = self
            .vectors
            .iter()
            .map(|(seq, vector)| (*seq, compute_distance(query, vector, metric)))
            .collect();

        // Sort by (distance asc, seq asc). The seq tie-break keeps
        // results identical across runs.
        results.sort_by(|(seq_a, dist_a), (seq_b, dist_b)| {
            dist_a
                .partial_cmp(dist_b)
                .unwrap_or(Ordering::Equal)
                .then_with(|| seq_a.cmp(seq_b))
        });

        results.truncate(k);
        results
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn needs_rebuild(&self) -> bool {
        false
    }

    fn begin_rebuild(&self) -> Option<RebuildJob> {
        None
    }

    fn install_generation(&mut self, _generation: ClusterGeneration) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(n: u64) -> RecordSeq {
        RecordSeq::new(n)
    }

    #[test]
    fn test_empty_search() {
        let backend = BruteForceBackend::new(3);
        let hits = backend.search(&[1.0, 0.0, 0.0], 5, DistanceMetric::Cosine);
        assert!(hits.is_empty());
    }

    #[test]
    fn test_k_zero_returns_empty() {
        let mut backend = BruteForceBackend::new(2);
        backend.insert(seq(1), &[1.0, 0.0]);
        assert!(backend.search(&[1.0, 0.0], 0, DistanceMetric::Cosine).is_empty());
    }

    #[test]
    fn test_ranking_by_cosine() {
        let mut backend = BruteForceBackend::new(3);
        backend.insert(seq(1), &[1.0, 0.0, 0.0]);
        backend.insert(seq(2), &[0.0, 1.0, 0.0]);
        backend.insert(seq(3), &[0.7, 0.7, 0.0]);

        let hits = backend.search(&[1.0, 0.0, 0.0], 2, DistanceMetric::Cosine);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, seq(1));
        assert!(hits[0].1.abs() < 1e-6);
        assert_eq!(hits[1].0, seq(3));
    }

    #[test]
    fn test_tie_broken_by_seq_ascending() {
        let mut backend = BruteForceBackend::new(2);
        // Insert out of seq order; identical vectors tie on distance.
        backend.insert(seq(9), &[1.0, 0.0]);
        backend.insert(seq(3), &[1.0, 0.0]);
        backend.insert(seq(5), &[1.0, 0.0]);

        let hits = backend.search(&[1.0, 0.0], 3, DistanceMetric::Cosine);
        let seqs: Vec<u64> = hits.iter().map(|(s, _)| s.as_u64()).collect();
        assert_eq!(seqs, vec![3, 5, 9]);
    }

    #[test]
    fn test_upsert_replaces_vector() {
        let mut backend = BruteForceBackend::new(2);
        backend.insert(seq(1), &[1.0, 0.0]);
        backend.insert(seq(1), &[0.0, 1.0]);
        assert_eq!(backend.len(), 1);

        let hits = backend.search(&[0.0, 1.0], 1, DistanceMetric::Cosine);
        assert!(hits[0].1.abs() < 1e-6);
    }

    #[test]
    fn test_delete() {
        let mut backend = BruteForceBackend::new(2);
        backend.insert(seq(1), &[1.0, 0.0]);
        assert!(backend.delete(seq(1)));
        assert!(!backend.delete(seq(1)));
        assert!(backend.is_empty());
    }

    #[test]
    fn test_k_larger_than_len() {
        let mut backend = BruteForceBackend::new(2);
        backend.insert(seq(1), &[1.0, 0.0]);
        backend.insert(seq(2), &[0.0, 1.0]);
        let hits = backend.search(&[1.0, 0.0], 10, DistanceMetric::SquaredEuclidean);
        assert_eq!(hits.len(), 2);
    }
}
