//! Per-collection record state
//!
//! A collection's records, lookup maps and index backend live behind
//! one `RwLock`, so a record write and its index update become visible
//! atomically: no query can observe a partially indexed insert.
//! Different collections lock independently.

use std::collections::{BTreeMap, HashMap};

use corpus_core::{
    now_micros, CollectionId, CollectionInfo, DistanceMetric, DocKey, Document, MetadataFilter,
    Record, RecordId, RecordSeq,
};
use parking_lot::RwLock;
use serde_json::Value as JsonValue;

use crate::index::{ClusterGeneration, RebuildJob, VectorIndexBackend};

/// A registered collection: immutable identity plus locked state
pub struct CollectionHandle {
    /// Collection id, assigned at creation
    pub id: CollectionId,
    /// Unique collection name
    pub name: String,
    /// Embedding dimension, immutable after creation
    pub embedding_dim: usize,
    /// Optional collection-level metadata
    pub metadata: Option<JsonValue>,
    /// Creation timestamp (microseconds since epoch)
    pub created_at: u64,
    /// Registry-wide creation counter, orders `list()` output
    pub creation_seq: u64,
    /// Records + index, mutated atomically under the write lock
    pub state: RwLock<CollectionState>,
}

impl std::fmt::Debug for CollectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("embedding_dim", &self.embedding_dim)
            .field("metadata", &self.metadata)
            .field("created_at", &self.created_at)
            .field("creation_seq", &self.creation_seq)
            .finish_non_exhaustive()
    }
}

impl CollectionHandle {
    /// Owned descriptor copy for callers
    pub fn info(&self) -> CollectionInfo {
        CollectionInfo {
            id: self.id,
            name: self.name.clone(),
            embedding_dim: self.embedding_dim,
            metadata: self.metadata.clone(),
            count: self.state.read().len(),
            created_at: self.created_at,
        }
    }
}

/// Records, lookup maps and the index backend of one collection
pub struct CollectionState {
    /// Records in seq order (deterministic iteration)
    records: BTreeMap<RecordSeq, Record>,
    /// external_id -> seq, for idempotent upsert and delete-by-external
    by_external: HashMap<String, RecordSeq>,
    /// record id -> seq, for point reads
    by_id: HashMap<RecordId, RecordSeq>,
    /// Next seq to assign. Seqs are never reused.
    next_seq: u64,
    /// Index backend for this collection
    index: Box<dyn VectorIndexBackend>,
}

impl CollectionState {
    /// Fresh state with the given index backend
    pub fn new(index: Box<dyn VectorIndexBackend>) -> Self {
        CollectionState {
            records: BTreeMap::new(),
            by_external: HashMap::new(),
            by_id: HashMap::new(),
            next_seq: 0,
            index,
        }
    }

    /// Number of live records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if the collection holds no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Build the record an upsert of `doc` would store, without
    /// mutating anything.
    ///
    /// The caller logs this record to the WAL first and only then
    /// calls [`apply_record`](Self::apply_record); a WAL failure thus
    /// leaves the state untouched.
    pub fn build_upsert(&self, doc: &Document, vector: Vec<f32>) -> Record {
        let now = now_micros();
        let existing = doc
            .external_id
            .as_ref()
            .and_then(|ext| self.by_external.get(ext))
            .and_then(|seq| self.records.get(seq));

        match existing {
            Some(prev) => Record {
                id: prev.id,
                seq: prev.seq,
                external_id: doc.external_id.clone(),
                text: doc.text.clone(),
                metadata: doc.metadata.clone(),
                vector,
                version: prev.version + 1,
                created_at: prev.created_at,
                updated_at: now,
            },
            None => Record {
                id: RecordId::new(),
                seq: RecordSeq::new(self.next_seq),
                external_id: doc.external_id.clone(),
                text: doc.text.clone(),
                metadata: doc.metadata.clone(),
                vector,
                version: 1,
                created_at: now,
                updated_at: now,
            },
        }
    }

    /// Apply a fully built record: maps, records and index mutate in
    /// one step. Also used during WAL replay, where the record (and
    /// its seq) comes from the log.
    pub fn apply_record(&mut self, record: Record) {
        let seq = record.seq;
        if let Some(ext) = &record.external_id {
            self.by_external.insert(ext.clone(), seq);
        }
        self.by_id.insert(record.id, seq);
        self.index.insert(seq, &record.vector);
        self.records.insert(seq, record);
        // Replayed seqs may arrive out of allocation order; keep the
        // counter monotonic so seqs are never reused.
        self.next_seq = self.next_seq.max(seq.as_u64() + 1);
    }

    /// Remove a record by id or external id. Returns the removed
    /// record, or None if absent.
    pub fn apply_delete(&mut self, key: &DocKey) -> Option<Record> {
        let seq = match key {
            DocKey::Id(id) => *self.by_id.get(id)?,
            DocKey::External(ext) => *self.by_external.get(ext)?,
        };
        let record = self.records.remove(&seq)?;
        self.by_id.remove(&record.id);
        if let Some(ext) = &record.external_id {
            self.by_external.remove(ext);
        }
        self.index.delete(seq);
        Some(record)
    }

    /// Resolve a record id without copying the record
    pub fn lookup(&self, key: &DocKey) -> Option<RecordId> {
        match key {
            DocKey::Id(id) => self.by_id.contains_key(id).then_some(*id),
            DocKey::External(ext) => {
                let seq = self.by_external.get(ext)?;
                self.records.get(seq).map(|r| r.id)
            }
        }
    }

    /// Point read by record id
    pub fn get(&self, id: &RecordId) -> Option<Record> {
        let seq = self.by_id.get(id)?;
        self.records.get(seq).cloned()
    }

    /// Filtered scan in seq (insertion) order
    ///
    /// Returns owned records; every call starts fresh from current
    /// state, no cursor survives across calls.
    pub fn scan(&self, filter: &MetadataFilter) -> Vec<Record> {
        self.records
            .values()
            .filter(|r| filter.matches(&r.metadata))
            .cloned()
            .collect()
    }

    /// Top-k candidates: (record id, distance) pairs from the index
    pub fn query(&self, vector: &[f32], k: usize, metric: DistanceMetric) -> Vec<(RecordId, f32)> {
        self.index
            .search(vector, k, metric)
            .into_iter()
            .filter_map(|(seq, dist)| self.records.get(&seq).map(|r| (r.id, dist)))
            .collect()
    }

    /// Whether the index backend wants a rebuild
    pub fn index_needs_rebuild(&self) -> bool {
        self.index.needs_rebuild()
    }

    /// Rebuild the index backend in place (clustered backends only)
    pub fn rebuild_index(&mut self) {
        self.index.rebuild();
    }

    /// Snapshot the index state a re-clustering needs, for running
    /// k-means without holding this collection's lock
    pub fn begin_index_rebuild(&self) -> Option<RebuildJob> {
        self.index.begin_rebuild()
    }

    /// Install a centroid generation computed from an earlier snapshot
    pub fn install_index_generation(&mut self, generation: ClusterGeneration) {
        self.index.install_generation(generation);
    }
}
