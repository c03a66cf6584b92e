//! WAL replay
//!
//! Applies logged operations back into a fresh store on open. Replay
//! goes through the store's `replay_*` entry points, which mutate
//! in-memory state but never write the log, so recovery is
//! repeatable: replaying the same WAL twice produces the same store.

use corpus_core::{Record, RecordId};

use crate::store::VectorRecordStore;
use crate::wal::WalOp;

/// What a replay pass restored
#[derive(Debug, Clone, Copy, Default)]
pub struct RecoveryStats {
    pub collections: usize,
    pub records: usize,
    pub deletes: usize,
}

/// Replay `ops` in log order into `store`.
///
/// Ops referencing a collection that no longer exists (deleted later
/// in the log, then the log half-compacted) are skipped with a
/// warning rather than failing the open.
pub(crate) fn replay(store: &VectorRecordStore, ops: Vec<WalOp>) -> RecoveryStats {
    let mut stats = RecoveryStats::default();
    for op in ops {
        match op {
            WalOp::CollectionCreate {
                id,
                name,
                dim,
                metadata,
                created_at,
            } => {
                store.replay_create_collection(id, &name, dim, metadata, created_at);
                stats.collections += 1;
            }
            WalOp::CollectionDelete { name } => {
                store.replay_delete_collection(&name);
                stats.collections = stats.collections.saturating_sub(1);
            }
            WalOp::Upsert { collection, record } => {
                let seq = record.seq;
                if apply_upsert(store, &collection, record) {
                    stats.records += 1;
                } else {
                    tracing::warn!(
                        target: "corpus::recovery",
                        collection,
                        seq = seq.as_u64(),
                        "skipping upsert for missing collection"
                    );
                }
            }
            WalOp::Delete { collection, id } => {
                if apply_delete(store, &collection, id) {
                    stats.deletes += 1;
                } else {
                    tracing::warn!(
                        target: "corpus::recovery",
                        collection,
                        %id,
                        "skipping delete for missing collection"
                    );
                }
            }
        }
    }

    // Cluster structure is not logged; rebuild it once the full
    // record set is back.
    for info in store.registry().list() {
        if let Ok(handle) = store.registry().get(&info.name) {
            let mut state = handle.state.write();
            if state.index_needs_rebuild() {
                state.rebuild_index();
            }
        }
    }
    stats
}

fn apply_upsert(store: &VectorRecordStore, collection: &str, record: Record) -> bool {
    store.replay_upsert(collection, record).is_ok()
}

fn apply_delete(store: &VectorRecordStore, collection: &str, id: RecordId) -> bool {
    store.replay_delete(collection, id).is_ok()
}
