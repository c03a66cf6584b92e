//! Similarity index backends
//!
//! - **VectorIndexBackend**: trait for swappable index implementations
//! - **BruteForceBackend**: exact O(n) reference/serving backend
//! - **IvfBackend**: clustered approximate backend (k-means + probing)
//! - **AutoBackend**: exact below a size threshold, clustered above it
//! - **distance**: shared metric computations
//!
//! The record store is ground truth; backends only accelerate
//! candidate generation.

pub mod backend;
pub mod brute_force;
pub mod distance;
pub mod ivf;

pub use backend::{AutoBackend, IndexBackendFactory, VectorIndexBackend};
pub use brute_force::BruteForceBackend;
pub use distance::compute_distance;
pub use ivf::{ClusterGeneration, IvfBackend, RebuildJob};
