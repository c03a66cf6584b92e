//! corpus-engine: durable vector record storage
//!
//! The engine owns everything below the retrieval layer:
//!
//! - [`registry`]: named collections with per-collection embedding
//!   dimensions
//! - [`collection`]: record state (records, external-id map, index)
//!   behind one lock per collection
//! - [`index`]: exact and clustered approximate nearest-neighbor
//!   backends behind [`index::VectorIndexBackend`]
//! - [`wal`] / [`recovery`]: append-only durability and replay
//! - [`store`]: the public facade tying the above together
//!
//! The record map is the ground truth; indexes are derived structures
//! that can always be rebuilt from it.

pub mod collection;
pub mod index;
mod recovery;
pub mod registry;
pub mod store;
pub mod wal;

pub use collection::CollectionHandle;
pub use index::{IndexBackendFactory, VectorIndexBackend};
pub use registry::CollectionRegistry;
pub use store::VectorRecordStore;
