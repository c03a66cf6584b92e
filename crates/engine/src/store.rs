//! VectorRecordStore: the storage facade
//!
//! Composes the collection registry, per-collection record state and
//! the write-ahead log. The write path is WAL-first: an op is
//! appended (and, in `Always` mode, fsynced) before the in-memory
//! record and index mutate under the collection's write lock, so a
//! WAL failure leaves the store untouched and a crash replays to
//! exactly the acknowledged writes.
//!
//! The store is `Send + Sync`; writes to different collections
//! proceed in parallel, reads take brief read locks and return owned
//! copies.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use corpus_core::{
    CollectionInfo, CorpusConfig, DistanceMetric, DocKey, Document, DurabilityMode, Error,
    MetadataFilter, Record, RecordId, Result,
};
use parking_lot::{Mutex, RwLock};
use serde_json::Value as JsonValue;

use crate::collection::CollectionHandle;
use crate::index::IndexBackendFactory;
use crate::recovery;
use crate::registry::CollectionRegistry;
use crate::wal::{read_wal, rewrite_wal, WalOp, WalWriter, WAL_FILE_NAME};

/// Durable vector record store
pub struct VectorRecordStore {
    registry: CollectionRegistry,
    wal: Option<Mutex<WalWriter>>,
    /// Writers take this shared; compaction takes it exclusive so it
    /// can snapshot every collection and swap the WAL without racing
    /// an in-flight append.
    write_gate: RwLock<()>,
    durability: DurabilityMode,
    wal_path: Option<PathBuf>,
}

impl VectorRecordStore {
    /// Open a persistent store in `dir`.
    ///
    /// Loads (or writes) `corpus.toml`, replays the WAL into memory,
    /// rebuilds indexes, then opens the log for appending. This is
    /// the explicit bootstrap step: nothing else creates state
    /// implicitly.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let config = CorpusConfig::load_or_init(dir)?;
        Self::open_with_config(dir, config)
    }

    /// Open a persistent store with an explicit config (ignores any
    /// `corpus.toml` in `dir`).
    pub fn open_with_config(dir: &Path, config: CorpusConfig) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let durability = config.durability_mode()?;
        let wal_path = dir.join(WAL_FILE_NAME);

        let store = VectorRecordStore {
            registry: CollectionRegistry::new(IndexBackendFactory::new(config.index.clone())),
            wal: None,
            write_gate: RwLock::new(()),
            durability,
            wal_path: Some(wal_path.clone()),
        };

        let ops = read_wal(&wal_path)?;
        let stats = recovery::replay(&store, ops);
        tracing::info!(
            target: "corpus::store",
            collections = stats.collections,
            records = stats.records,
            deletes = stats.deletes,
            ?durability,
            "opened store"
        );

        let writer = WalWriter::open(&wal_path, durability)?;
        Ok(VectorRecordStore {
            wal: Some(Mutex::new(writer)),
            ..store
        })
    }

    /// Open a store with no persistence (tests, ephemeral workloads)
    pub fn open_in_memory(config: CorpusConfig) -> Self {
        VectorRecordStore {
            registry: CollectionRegistry::new(IndexBackendFactory::new(config.index.clone())),
            wal: None,
            write_gate: RwLock::new(()),
            durability: DurabilityMode::Standard,
            wal_path: None,
        }
    }

    pub(crate) fn registry(&self) -> &CollectionRegistry {
        &self.registry
    }

    // ========================================================================
    // Collection management
    // ========================================================================

    /// Get an existing collection or atomically create it.
    ///
    /// An existing name returns its descriptor; `dim` must match the
    /// stored dimension or the call fails with `DimensionMismatch`.
    /// Exactly one of any set of concurrent creators wins; the rest
    /// observe the created collection.
    pub fn get_or_create_collection(
        &self,
        name: &str,
        dim: usize,
        metadata: Option<JsonValue>,
    ) -> Result<CollectionInfo> {
        let _gate = self.write_gate.read();
        let handle = self.registry.get_or_create(name, dim, metadata, |handle| {
            self.append_wal(&WalOp::CollectionCreate {
                id: handle.id,
                name: handle.name.clone(),
                dim: handle.embedding_dim,
                metadata: handle.metadata.clone(),
                created_at: handle.created_at,
            })
        })?;
        Ok(handle.info())
    }

    /// Delete a collection and cascade to all its records.
    ///
    /// Idempotent: deleting an absent name returns false, not an
    /// error.
    pub fn delete_collection(&self, name: &str) -> Result<bool> {
        let _gate = self.write_gate.read();
        if self.registry.get(name).is_err() {
            return Ok(false);
        }
        self.append_wal(&WalOp::CollectionDelete {
            name: name.to_string(),
        })?;
        Ok(self.registry.delete(name).is_some())
    }

    /// All collections, ordered by creation
    pub fn list_collections(&self) -> Vec<CollectionInfo> {
        self.registry.list()
    }

    /// Descriptor for one collection
    pub fn collection_info(&self, name: &str) -> Result<CollectionInfo> {
        Ok(self.registry.get(name)?.info())
    }

    // ========================================================================
    // Record operations
    // ========================================================================

    /// Insert or overwrite a record.
    ///
    /// If `doc.external_id` matches an existing record in the
    /// collection, that record is overwritten in place (same id, same
    /// seq, version bumped) — upserting the same external id twice
    /// leaves exactly one record. Without an external id every call
    /// inserts fresh.
    ///
    /// # Errors
    /// - `CollectionNotFound` if the collection does not exist
    /// - `DimensionMismatch` if `vector.len()` differs from the
    ///   collection dimension (store left unchanged)
    /// - `Storage` if the WAL append fails (store left unchanged)
    pub fn upsert(&self, collection: &str, doc: &Document, vector: Vec<f32>) -> Result<RecordId> {
        let _gate = self.write_gate.read();
        let handle = self.registry.get(collection)?;
        if vector.len() != handle.embedding_dim {
            return Err(Error::DimensionMismatch {
                expected: handle.embedding_dim,
                got: vector.len(),
            });
        }

        let mut state = handle.state.write();
        let record = state.build_upsert(doc, vector);
        self.append_wal(&WalOp::Upsert {
            collection: collection.to_string(),
            record: record.clone(),
        })?;

        let id = record.id;
        tracing::debug!(
            target: "corpus::store",
            collection,
            %id,
            seq = record.seq.as_u64(),
            version = record.version,
            "upsert"
        );
        state.apply_record(record);

        // Imbalance can trip the rebuild threshold on the write path.
        // The rebuild itself runs after the guard drops so this upsert
        // (and concurrent readers) never wait on k-means.
        let wants_rebuild = state.index_needs_rebuild();
        drop(state);
        if wants_rebuild {
            self.rebuild_collection(&handle);
        }
        Ok(id)
    }

    /// Delete a record by id or external id.
    ///
    /// Returns whether anything was deleted; an absent record is
    /// false, not an error. The index entry goes in the same critical
    /// section, so the record is gone from queries immediately.
    pub fn delete(&self, collection: &str, key: &DocKey) -> Result<bool> {
        let _gate = self.write_gate.read();
        let handle = self.registry.get(collection)?;
        let mut state = handle.state.write();

        let Some(id) = state.lookup(key) else {
            return Ok(false);
        };
        self.append_wal(&WalOp::Delete {
            collection: collection.to_string(),
            id,
        })?;
        state.apply_delete(&DocKey::Id(id));
        tracing::debug!(target: "corpus::store", collection, %id, "delete");
        Ok(true)
    }

    /// Point read by record id
    pub fn get(&self, collection: &str, id: &RecordId) -> Result<Record> {
        let handle = self.registry.get(collection)?;
        let state = handle.state.read();
        state.get(id).ok_or(Error::RecordNotFound { id: *id })
    }

    /// Filtered scan in insertion order.
    ///
    /// Each call snapshots fresh state; no cursor survives across
    /// calls.
    pub fn scan(&self, collection: &str, filter: &MetadataFilter) -> Result<Vec<Record>> {
        let handle = self.registry.get(collection)?;
        let state = handle.state.read();
        Ok(state.scan(filter))
    }

    /// Top-k nearest records: (record id, distance) pairs sorted by
    /// (distance asc, insertion order asc).
    ///
    /// Returns exactly `min(k, live records)` hits.
    ///
    /// # Errors
    /// - `InvalidArgument` if `k == 0`
    /// - `DimensionMismatch` if the query vector has the wrong length
    pub fn query(
        &self,
        collection: &str,
        vector: &[f32],
        k: usize,
        metric: DistanceMetric,
    ) -> Result<Vec<(RecordId, f32)>> {
        if k == 0 {
            return Err(Error::invalid_argument("k must be > 0"));
        }
        let handle = self.registry.get(collection)?;
        if vector.len() != handle.embedding_dim {
            return Err(Error::DimensionMismatch {
                expected: handle.embedding_dim,
                got: vector.len(),
            });
        }
        let state = handle.state.read();
        Ok(state.query(vector, k, metric))
    }

    /// Number of live records in a collection
    pub fn count(&self, collection: &str) -> Result<usize> {
        let handle = self.registry.get(collection)?;
        let count = handle.state.read().len();
        Ok(count)
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Rebuild one collection's index (full re-clustering).
    ///
    /// Clustering runs without holding the collection lock; reads and
    /// writes proceed throughout, and the lock is taken only to swap
    /// in the finished generation. Exact backends treat this as a
    /// no-op.
    pub fn maintain(&self, collection: &str) -> Result<()> {
        let handle = self.registry.get(collection)?;
        self.rebuild_collection(&handle);
        Ok(())
    }

    /// Re-cluster one collection's index off-lock.
    ///
    /// Snapshots the vector set under a brief read lock, runs k-means
    /// with no lock held, then takes the write lock only to install
    /// the new centroid generation. Installation reassigns the live
    /// vector set, so records written during the build land in the
    /// right cluster.
    fn rebuild_collection(&self, handle: &CollectionHandle) {
        let job = {
            let state = handle.state.read();
            state.begin_index_rebuild()
        };
        let Some(job) = job else {
            return;
        };
        let generation = job.run();
        let mut state = handle.state.write();
        state.install_index_generation(generation);
    }

    /// Rebuild every collection's index
    pub fn maintain_all(&self) {
        for info in self.registry.list() {
            if let Err(e) = self.maintain(&info.name) {
                tracing::warn!(
                    target: "corpus::store",
                    collection = %info.name,
                    error = %e,
                    "index maintenance failed; previous generation stays active"
                );
            }
        }
    }

    /// Rewrite the WAL from live state, dropping overwritten and
    /// deleted entries. No-op for in-memory stores.
    pub fn compact(&self) -> Result<()> {
        let (Some(wal), Some(path)) = (&self.wal, &self.wal_path) else {
            return Ok(());
        };
        // Exclusive gate: no appends can interleave between the
        // snapshot and the log swap.
        let _gate = self.write_gate.write();

        let mut ops = Vec::new();
        for info in self.registry.list() {
            let handle = self.registry.get(&info.name)?;
            ops.push(WalOp::CollectionCreate {
                id: handle.id,
                name: handle.name.clone(),
                dim: handle.embedding_dim,
                metadata: handle.metadata.clone(),
                created_at: handle.created_at,
            });
            let state = handle.state.read();
            for record in state.scan(&MetadataFilter::new()) {
                ops.push(WalOp::Upsert {
                    collection: handle.name.clone(),
                    record,
                });
            }
        }

        let mut writer = wal.lock();
        rewrite_wal(path, &ops, self.durability)?;
        *writer = WalWriter::open(path, self.durability)?;
        tracing::info!(target: "corpus::store", entries = ops.len(), "compacted WAL");
        Ok(())
    }

    // ========================================================================
    // Replay (recovery only; never writes the WAL)
    // ========================================================================

    pub(crate) fn replay_create_collection(
        &self,
        id: corpus_core::CollectionId,
        name: &str,
        dim: usize,
        metadata: Option<JsonValue>,
        created_at: u64,
    ) -> Arc<CollectionHandle> {
        self.registry.restore(id, name, dim, metadata, created_at)
    }

    pub(crate) fn replay_delete_collection(&self, name: &str) {
        self.registry.delete(name);
    }

    pub(crate) fn replay_upsert(&self, collection: &str, record: Record) -> Result<()> {
        let handle = self.registry.get(collection)?;
        handle.state.write().apply_record(record);
        Ok(())
    }

    pub(crate) fn replay_delete(&self, collection: &str, id: RecordId) -> Result<()> {
        let handle = self.registry.get(collection)?;
        handle.state.write().apply_delete(&DocKey::Id(id));
        Ok(())
    }

    fn append_wal(&self, op: &WalOp) -> Result<()> {
        if let Some(wal) = &self.wal {
            wal.lock().append(op)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corpus_core::IndexMode;

    fn store() -> VectorRecordStore {
        VectorRecordStore::open_in_memory(CorpusConfig::default())
    }

    fn docs_collection(s: &VectorRecordStore) {
        s.get_or_create_collection("docs", 3, None).unwrap();
    }

    #[test]
    fn test_upsert_and_get() {
        let s = store();
        docs_collection(&s);

        let id = s
            .upsert("docs", &Document::new("hello"), vec![1.0, 0.0, 0.0])
            .unwrap();
        let record = s.get("docs", &id).unwrap();
        assert_eq!(record.text, "hello");
        assert_eq!(record.vector, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_upsert_unknown_collection() {
        let s = store();
        let err = s
            .upsert("nope", &Document::new("x"), vec![1.0])
            .unwrap_err();
        assert!(matches!(err, Error::CollectionNotFound { .. }));
    }

    #[test]
    fn test_dimension_mismatch_leaves_store_unchanged() {
        let s = store();
        docs_collection(&s);

        let err = s
            .upsert("docs", &Document::new("bad"), vec![1.0, 0.0])
            .unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 3,
                got: 2
            }
        ));
        assert_eq!(s.count("docs").unwrap(), 0);
    }

    #[test]
    fn test_idempotent_upsert_by_external_id() {
        let s = store();
        docs_collection(&s);

        let first = s
            .upsert(
                "docs",
                &Document::with_external_id("a1", "v1"),
                vec![1.0, 0.0, 0.0],
            )
            .unwrap();
        let second = s
            .upsert(
                "docs",
                &Document::with_external_id("a1", "v2"),
                vec![0.0, 1.0, 0.0],
            )
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(s.count("docs").unwrap(), 1);
        let record = s.get("docs", &first).unwrap();
        assert_eq!(record.text, "v2");
        assert_eq!(record.version, 2);
    }

    #[test]
    fn test_delete_by_both_keys() {
        let s = store();
        docs_collection(&s);

        let id = s
            .upsert(
                "docs",
                &Document::with_external_id("a1", "x"),
                vec![1.0, 0.0, 0.0],
            )
            .unwrap();

        assert!(s.delete("docs", &DocKey::External("a1".into())).unwrap());
        assert!(!s.delete("docs", &DocKey::Id(id)).unwrap());
        assert!(s.get("docs", &id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_query_validations() {
        let s = store();
        docs_collection(&s);

        let err = s
            .query("docs", &[1.0, 0.0, 0.0], 0, DistanceMetric::Cosine)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        let err = s
            .query("docs", &[1.0, 0.0], 2, DistanceMetric::Cosine)
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));
    }

    #[test]
    fn test_query_min_k_len() {
        let s = store();
        docs_collection(&s);
        s.upsert("docs", &Document::new("a"), vec![1.0, 0.0, 0.0])
            .unwrap();
        s.upsert("docs", &Document::new("b"), vec![0.0, 1.0, 0.0])
            .unwrap();

        let hits = s
            .query("docs", &[1.0, 0.0, 0.0], 10, DistanceMetric::Cosine)
            .unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_collection_cascade() {
        let s = store();
        docs_collection(&s);
        s.upsert("docs", &Document::new("a"), vec![1.0, 0.0, 0.0])
            .unwrap();

        assert!(s.delete_collection("docs").unwrap());
        assert!(!s.delete_collection("docs").unwrap());
        let err = s.scan("docs", &MetadataFilter::new()).unwrap_err();
        assert!(matches!(err, Error::CollectionNotFound { .. }));
    }

    #[test]
    fn test_exact_mode_index_choice() {
        let s = VectorRecordStore::open_in_memory(CorpusConfig {
            durability: "standard".into(),
            index: IndexMode::Exact,
        });
        s.get_or_create_collection("docs", 2, None).unwrap();
        for i in 0..50 {
            s.upsert("docs", &Document::new("d"), vec![i as f32, 0.0])
                .unwrap();
        }
        let hits = s
            .query("docs", &[0.0, 0.0], 3, DistanceMetric::SquaredEuclidean)
            .unwrap();
        assert_eq!(hits.len(), 3);
        // Maintenance is a no-op for exact backends.
        s.maintain("docs").unwrap();
    }
}
