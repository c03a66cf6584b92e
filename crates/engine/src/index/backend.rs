//! Vector index backend trait
//!
//! Defines the interface for swappable index implementations:
//! BruteForceBackend (exact O(n) search) and IvfBackend (clustered
//! approximate search). The record store is ground truth; a backend
//! only accelerates candidate generation and must never be the sole
//! owner of a vector.

use corpus_core::{DistanceMetric, IndexMode, IvfParams, RecordSeq};

use super::brute_force::BruteForceBackend;
use super::ivf::{ClusterGeneration, IvfBackend, RebuildJob};

/// Trait for swappable vector index implementations
///
/// IMPORTANT: this trait is written for exact AND clustered backends.
/// Do not add methods that assume brute-force semantics.
pub trait VectorIndexBackend: Send + Sync {
    /// Insert or replace a vector (upsert semantics).
    ///
    /// The RecordSeq is assigned by the collection and passed in.
    /// Dimension is validated at the store facade before this call.
    fn insert(&mut self, seq: RecordSeq, vector: &[f32]);

    /// Remove a vector. Returns true if it was indexed.
    fn delete(&mut self, seq: RecordSeq) -> bool;

    /// Search for the k nearest vectors under the given metric.
    ///
    /// Returns (RecordSeq, distance) pairs, exactly min(k, len) of
    /// them, sorted by (distance asc, RecordSeq asc). The seq
    /// tie-break makes results identical across runs.
    fn search(&self, query: &[f32], k: usize, metric: DistanceMetric) -> Vec<(RecordSeq, f32)>;

    /// Number of indexed vectors
    fn len(&self) -> usize;

    /// Check if empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Embedding dimension
    fn dimension(&self) -> usize;

    /// Whether the backend wants a full rebuild (cluster imbalance).
    ///
    /// Always false for exact backends.
    fn needs_rebuild(&self) -> bool;

    /// Snapshot the state a re-clustering needs, or None when there
    /// is nothing to recompute (exact backends).
    ///
    /// The caller runs the returned job with no lock held and hands
    /// the result to [`install_generation`](Self::install_generation).
    fn begin_rebuild(&self) -> Option<RebuildJob>;

    /// Swap in a centroid generation computed from an earlier
    /// snapshot, reassigning the live vector set to it. Vectors
    /// inserted or deleted since the snapshot are reconciled here.
    fn install_generation(&mut self, generation: ClusterGeneration);

    /// Synchronous rebuild: snapshot, compute, and install in one
    /// call. Used where the caller already holds exclusive access
    /// (recovery replay, backend promotion). No-op for exact backends.
    fn rebuild(&mut self) {
        if let Some(job) = self.begin_rebuild() {
            self.install_generation(job.run());
        }
    }
}

/// Factory for creating index backends from the configured mode
#[derive(Debug, Clone, Default)]
pub struct IndexBackendFactory {
    mode: IndexMode,
}

impl IndexBackendFactory {
    /// Factory for the given index mode
    pub fn new(mode: IndexMode) -> Self {
        IndexBackendFactory { mode }
    }

    /// Create a backend for a collection of the given dimension
    pub fn create(&self, dimension: usize) -> Box<dyn VectorIndexBackend> {
        match &self.mode {
            IndexMode::Exact => Box::new(BruteForceBackend::new(dimension)),
            IndexMode::Clustered { ivf } => Box::new(IvfBackend::new(dimension, ivf.clone())),
            IndexMode::Auto {
                exact_threshold,
                ivf,
            } => Box::new(AutoBackend::new(dimension, *exact_threshold, ivf.clone())),
        }
    }
}

/// Backend that serves exact scans for small collections and promotes
/// itself to the clustered backend once the collection outgrows the
/// configured threshold.
///
/// Promotion is one-way: once clustered, the collection stays
/// clustered even if deletes shrink it back under the threshold.
pub struct AutoBackend {
    exact_threshold: usize,
    ivf_params: IvfParams,
    inner: AutoInner,
}

enum AutoInner {
    Exact(BruteForceBackend),
    Clustered(IvfBackend),
}

impl AutoBackend {
    /// Create in exact mode
    pub fn new(dimension: usize, exact_threshold: usize, ivf_params: IvfParams) -> Self {
        AutoBackend {
            exact_threshold,
            ivf_params,
            inner: AutoInner::Exact(BruteForceBackend::new(dimension)),
        }
    }

    /// True if currently serving from the clustered backend
    pub fn is_clustered(&self) -> bool {
        matches!(self.inner, AutoInner::Clustered(_))
    }

    fn maybe_promote(&mut self) {
        let AutoInner::Exact(brute) = &self.inner else {
            return;
        };
        if brute.len() <= self.exact_threshold {
            return;
        }
        tracing::info!(
            target: "corpus::index",
            count = brute.len(),
            threshold = self.exact_threshold,
            "promoting collection index to clustered backend"
        );
        let mut ivf = IvfBackend::new(brute.dimension(), self.ivf_params.clone());
        for (seq, vector) in brute.iter() {
            ivf.insert(seq, vector);
        }
        ivf.rebuild();
        self.inner = AutoInner::Clustered(ivf);
    }

    fn as_backend(&self) -> &dyn VectorIndexBackend {
        match &self.inner {
            AutoInner::Exact(b) => b,
            AutoInner::Clustered(b) => b,
        }
    }

    fn as_backend_mut(&mut self) -> &mut dyn VectorIndexBackend {
        match &mut self.inner {
            AutoInner::Exact(b) => b,
            AutoInner::Clustered(b) => b,
        }
    }
}

impl VectorIndexBackend for AutoBackend {
    fn insert(&mut self, seq: RecordSeq, vector: &[f32]) {
        self.as_backend_mut().insert(seq, vector);
        self.maybe_promote();
    }

    fn delete(&mut self, seq: RecordSeq) -> bool {
        self.as_backend_mut().delete(seq)
    }

    fn search(&self, query: &[f32], k: usize, metric: DistanceMetric) -> Vec<(RecordSeq, f32)> {
        self.as_backend().search(query, k, metric)
    }

    fn len(&self) -> usize {
        self.as_backend().len()
    }

    fn dimension(&self) -> usize {
        self.as_backend().dimension()
    }

    fn needs_rebuild(&self) -> bool {
        self.as_backend().needs_rebuild()
    }

    fn begin_rebuild(&self) -> Option<RebuildJob> {
        self.as_backend().begin_rebuild()
    }

    fn install_generation(&mut self, generation: ClusterGeneration) {
        self.as_backend_mut().install_generation(generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(n: u64) -> RecordSeq {
        RecordSeq::new(n)
    }

    #[test]
    fn test_factory_exact_mode() {
        let factory = IndexBackendFactory::new(IndexMode::Exact);
        let backend = factory.create(3);
        assert_eq!(backend.dimension(), 3);
        assert!(backend.is_empty());
        assert!(!backend.needs_rebuild());
    }

    #[test]
    fn test_auto_promotes_past_threshold() {
        let mut backend = AutoBackend::new(2, 10, IvfParams::default());
        for i in 0..10 {
            backend.insert(seq(i), &[i as f32, 1.0]);
        }
        assert!(!backend.is_clustered());

        backend.insert(seq(10), &[10.0, 1.0]);
        assert!(backend.is_clustered());
        assert_eq!(backend.len(), 11);
    }

    #[test]
    fn test_auto_search_consistent_across_promotion() {
        let mut backend = AutoBackend::new(2, 5, IvfParams::default());
        for i in 0..12 {
            backend.insert(seq(i), &[i as f32, 0.0]);
        }
        assert!(backend.is_clustered());

        let hits = backend.search(&[0.0, 0.0], 3, DistanceMetric::SquaredEuclidean);
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].0, seq(0));
        assert_eq!(hits[1].0, seq(1));
        assert_eq!(hits[2].0, seq(2));
    }

    #[test]
    fn test_auto_no_demotion_after_deletes() {
        let mut backend = AutoBackend::new(2, 4, IvfParams::default());
        for i in 0..8 {
            backend.insert(seq(i), &[i as f32, 0.0]);
        }
        assert!(backend.is_clustered());

        for i in 0..6 {
            assert!(backend.delete(seq(i)));
        }
        assert!(backend.is_clustered());
        assert_eq!(backend.len(), 2);
    }
}
