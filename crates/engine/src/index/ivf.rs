//! IVF clustered vector search backend
//!
//! Partitions vectors into k-means clusters and probes only the
//! nearest few clusters at query time, trading recall for speed.
//! Inserts and deletes are incremental (assign to the nearest
//! existing centroid / remove from the posting list); a full k-means
//! rebuild runs only when cluster imbalance exceeds the configured
//! factor or on an explicit maintenance call.
//!
//! Until the first rebuild has produced centroids, search falls back
//! to an exact scan, so correctness never depends on cluster
//! freshness.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use corpus_core::{DistanceMetric, IvfParams, RecordSeq};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::backend::VectorIndexBackend;
use super::distance::{compute_distance, squared_euclidean};

/// Minimum collection size before imbalance triggers a rebuild.
/// Below this, churn-triggered rebuilds cost more than they save.
const REBUILD_MIN_VECTORS: usize = 64;

/// Clustered approximate search backend (IVF-flat)
pub struct IvfBackend {
    dimension: usize,
    params: IvfParams,
    /// All indexed vectors, in seq order (ground truth for fallback scans)
    vectors: BTreeMap<RecordSeq, Vec<f32>>,
    /// Cluster centroids from the last rebuild; empty before the first
    centroids: Vec<Vec<f32>>,
    /// Posting list per centroid
    posting: Vec<Vec<RecordSeq>>,
    /// seq -> centroid index, for incremental delete/reassign
    assignment: HashMap<RecordSeq, usize>,
}

impl IvfBackend {
    /// Create an empty backend for the given dimension
    pub fn new(dimension: usize, params: IvfParams) -> Self {
        IvfBackend {
            dimension,
            params,
            vectors: BTreeMap::new(),
            centroids: Vec::new(),
            posting: Vec::new(),
            assignment: HashMap::new(),
        }
    }

    /// Number of clusters in the current generation (0 before the
    /// first rebuild)
    pub fn cluster_count(&self) -> usize {
        self.centroids.len()
    }

    /// Index of the centroid nearest to `vector` (Euclidean)
    fn nearest_centroid(&self, vector: &[f32]) -> Option<usize> {
        self.centroids
            .iter()
            .enumerate()
            .map(|(i, c)| (i, squared_euclidean(vector, c)))
            .min_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(Ordering::Equal))
            .map(|(i, _)| i)
    }

    fn unassign(&mut self, seq: RecordSeq) {
        if let Some(cluster) = self.assignment.remove(&seq) {
            if let Some(list) = self.posting.get_mut(cluster) {
                list.retain(|s| *s != seq);
            }
        }
    }

    /// Exact scan over every indexed vector (pre-rebuild fallback)
    fn scan_all(&self, query: &[f32], k: usize, metric: DistanceMetric) -> Vec<(RecordSeq, f32)> {
        let mut results: Vec<(RecordSeq, f32)> = self
            .vectors
            .iter()
            .map(|(seq, vector)| (*seq, compute_distance(query, vector, metric)))
            .collect();
        sort_hits(&mut results);
        results.truncate(k);
        results
    }
}

fn sort_hits(hits: &mut [(RecordSeq, f32)]) {
    hits.sort_by(|(seq_a, dist_a), (seq_b, dist_b)| {
        dist_a
            .partial_cmp(dist_b)
            .unwrap_or(Ordering::Equal)
            .then_with(|| seq_a.cmp(seq_b))
    });
}

impl VectorIndexBackend for IvfBackend {
    fn insert(&mut self, seq: RecordSeq, vector: &[f32]) {
        debug_assert_eq!(vector.len(), self.dimension);

        // An upsert may move the vector to a different cluster.
        if self.vectors.contains_key(&seq) {
            self.unassign(seq);
        }
        self.vectors.insert(seq, vector.to_vec());

        if let Some(cluster) = self.nearest_centroid(vector) {
            self.posting[cluster].push(seq);
            self.assignment.insert(seq, cluster);
        }
    }

    fn delete(&mut self, seq: RecordSeq) -> bool {
        if self.vectors.remove(&seq).is_none() {
            return false;
        }
        self.unassign(seq);
        true
    }

    fn search(&self, query: &[f32], k: usize, metric: DistanceMetric) -> Vec<(RecordSeq, f32)> {
        if k == 0 || self.vectors.is_empty() {
            return Vec::new();
        }
        if self.centroids.is_empty() {
            return self.scan_all(query, k, metric);
        }

        let wanted = k.min(self.vectors.len());

        // Rank centroids by distance to the query under the query
        // metric. Clusters were built in Euclidean space; probing by
        // the query metric keeps cosine queries pointed at the right
        // partitions without rebuilding per metric.
        let mut ranked: Vec<(usize, f32)> = self
            .centroids
            .iter()
            .enumerate()
            .map(|(i, c)| (i, compute_distance(query, c, metric)))
            .collect();
        ranked.sort_by(|(ia, a), (ib, b)| {
            a.partial_cmp(b).unwrap_or(Ordering::Equal).then_with(|| ia.cmp(ib))
        });

        // Probe the nprobe nearest clusters, widening until we have
        // min(k, len) candidates. Unassigned vectors (inserted while
        // centroids were empty) can't exist here: centroids non-empty
        // means every insert since the rebuild was assigned, and the
        // rebuild assigned everything older.
        let mut probe = self.params.nprobe.max(1).min(ranked.len());
        loop {
            let mut candidates: Vec<(RecordSeq, f32)> = Vec::new();
            for (cluster, _) in ranked.iter().take(probe) {
                for seq in &self.posting[*cluster] {
                    if let Some(vector) = self.vectors.get(seq) {
                        candidates.push((*seq, compute_distance(query, vector, metric)));
                    }
                }
            }

            if candidates.len() >= wanted || probe == ranked.len() {
                sort_hits(&mut candidates);
                candidates.truncate(wanted);
                return candidates;
            }
            probe = (probe * 2).min(ranked.len());
        }
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn needs_rebuild(&self) -> bool {
        if self.vectors.is_empty() {
            return false;
        }
        if self.centroids.is_empty() {
            return true;
        }
        if self.vectors.len() < REBUILD_MIN_VECTORS {
            return false;
        }
        let mean = self.vectors.len() as f32 / self.centroids.len() as f32;
        let max = self.posting.iter().map(Vec::len).max().unwrap_or(0) as f32;
        max > self.params.rebalance_factor * mean
    }

    fn begin_rebuild(&self) -> Option<RebuildJob> {
        Some(RebuildJob {
            dimension: self.dimension,
            params: self.params.clone(),
            vectors: self.vectors.values().cloned().collect(),
        })
    }

    fn install_generation(&mut self, generation: ClusterGeneration) {
        // Assignments come from the live vector set, not the job's
        // snapshot: inserts and deletes that landed while the
        // centroids were being computed end up in their right cluster.
        let centroids = generation.centroids;
        let mut posting = vec![Vec::new(); centroids.len()];
        let mut assignment = HashMap::with_capacity(self.vectors.len());
        if !centroids.is_empty() {
            for (seq, vector) in &self.vectors {
                let cluster = nearest(&centroids, vector);
                posting[cluster].push(*seq);
                assignment.insert(*seq, cluster);
            }
        }

        tracing::debug!(
            target: "corpus::index",
            vectors = self.vectors.len(),
            clusters = centroids.len(),
            "installed clustered index generation"
        );

        self.centroids = centroids;
        self.posting = posting;
        self.assignment = assignment;
    }
}

/// Centroids computed by a [`RebuildJob`], ready to install
pub struct ClusterGeneration {
    centroids: Vec<Vec<f32>>,
}

/// Snapshot of everything a re-clustering needs.
///
/// Cloned from the backend under a read lock; `run` does the k-means
/// work with no lock held. Installing the result takes the write lock
/// only for a single assignment pass over the live vectors.
pub struct RebuildJob {
    dimension: usize,
    params: IvfParams,
    vectors: Vec<Vec<f32>>,
}

impl RebuildJob {
    /// Compute the new centroid generation
    pub fn run(self) -> ClusterGeneration {
        if self.vectors.is_empty() {
            return ClusterGeneration {
                centroids: Vec::new(),
            };
        }
        let nlist = target_nlist(self.vectors.len());
        let centroids = kmeans(
            &self.vectors,
            nlist,
            self.params.kmeans_iters,
            self.params.seed,
            self.dimension,
        );
        ClusterGeneration { centroids }
    }
}

/// Target cluster count for n vectors: sqrt(n) clamped to [8, 1024]
fn target_nlist(n: usize) -> usize {
    ((n as f64).sqrt() as usize).clamp(8, 1024).min(n.max(1))
}

/// Index of the centroid nearest to `vector` (Euclidean)
fn nearest(centroids: &[Vec<f32>], vector: &[f32]) -> usize {
    let mut best = 0;
    let mut best_dist = f32::INFINITY;
    for (i, c) in centroids.iter().enumerate() {
        let d = squared_euclidean(vector, c);
        if d < best_dist {
            best_dist = d;
            best = i;
        }
    }
    best
}

/// Lloyd's k-means over the given vectors.
///
/// Initialization samples `nlist` distinct vectors with a seeded RNG
/// so rebuilds are reproducible. Clusters that empty out are reseeded
/// from the vector pool.
fn kmeans(
    data: &[Vec<f32>],
    nlist: usize,
    iters: usize,
    seed: u64,
    dimension: usize,
) -> Vec<Vec<f32>> {
    let nlist = nlist.min(data.len()).max(1);
    let mut rng = StdRng::seed_from_u64(seed);

    let mut pool: Vec<usize> = (0..data.len()).collect();
    pool.shuffle(&mut rng);
    let mut centroids: Vec<Vec<f32>> = pool[..nlist].iter().map(|i| data[*i].clone()).collect();

    let mut assignment = vec![0usize; data.len()];
    for _ in 0..iters {
        // Assign
        let mut moved = false;
        for (i, vector) in data.iter().enumerate() {
            let cluster = nearest(&centroids, vector);
            if assignment[i] != cluster {
                assignment[i] = cluster;
                moved = true;
            }
        }

        // Update
        let mut sums = vec![vec![0.0f32; dimension]; centroids.len()];
        let mut counts = vec![0usize; centroids.len()];
        for (i, vector) in data.iter().enumerate() {
            let cluster = assignment[i];
            counts[cluster] += 1;
            for (s, v) in sums[cluster].iter_mut().zip(vector.iter()) {
                *s += v;
            }
        }
        for (cluster, sum) in sums.into_iter().enumerate() {
            if counts[cluster] == 0 {
                // Reseed an empty cluster from the pool.
                let i = pool[cluster % pool.len()];
                centroids[cluster] = data[i].clone();
            } else {
                centroids[cluster] = sum
                    .into_iter()
                    .map(|s| s / counts[cluster] as f32)
                    .collect();
            }
        }

        if !moved {
            break;
        }
    }

    centroids
}
