//! corpusdb: an embedded vector document store for
//! retrieval-augmented generation.
//!
//! A corpus holds named collections of text records, each carrying an
//! embedding vector of the collection's fixed dimension. Records are
//! upserted idempotently by external id, scanned with metadata
//! filters, and queried by vector similarity over an exact or
//! clustered approximate index. State persists through a write-ahead
//! log replayed on open.
//!
//! ```no_run
//! use corpusdb::{Corpus, Document, DistanceMetric, HashEmbedder};
//! use std::sync::Arc;
//!
//! let corpus = Corpus::open("./data")?
//!     .with_embedder(Arc::new(HashEmbedder::new(64)));
//!
//! corpus.upsert_documents("notes", &[
//!     Document::with_external_id("n1", "the borrow checker in depth"),
//! ])?;
//!
//! let hits = corpus.search("notes", "borrow checker", 5, DistanceMetric::Cosine)?;
//! # Ok::<(), corpusdb::Error>(())
//! ```

use std::path::Path;
use std::sync::Arc;

use serde_json::Value as JsonValue;

pub use corpus_core::{
    CollectionId, CollectionInfo, CorpusConfig, DistanceMetric, DocKey, Document, DurabilityMode,
    Error, FilterOp, IndexMode, IvfParams, MetadataFilter, Record, RecordId, Result, SearchHit,
};
pub use corpus_engine::VectorRecordStore;
pub use corpus_retrieval::{Embedder, HashEmbedder, HttpEmbedder, Retriever};

/// The top-level handle: a record store plus an optional embedding
/// gateway.
///
/// All vector-level operations work without a gateway; text-level
/// operations (`search`, `upsert_documents`) need one attached via
/// [`Corpus::with_embedder`].
pub struct Corpus {
    store: Arc<VectorRecordStore>,
    retriever: Option<Retriever>,
}

impl Corpus {
    /// Open (or create) a persistent corpus in `dir`.
    ///
    /// Reads `corpus.toml` (written with defaults on first open) and
    /// replays the write-ahead log before returning.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_store(VectorRecordStore::open(dir.as_ref())?))
    }

    /// Open with an explicit config, ignoring any `corpus.toml`
    pub fn open_with_config(dir: impl AsRef<Path>, config: CorpusConfig) -> Result<Self> {
        Ok(Self::from_store(VectorRecordStore::open_with_config(
            dir.as_ref(),
            config,
        )?))
    }

    /// A corpus with no persistence
    pub fn open_in_memory() -> Self {
        Self::from_store(VectorRecordStore::open_in_memory(CorpusConfig::default()))
    }

    /// An in-memory corpus with an explicit config
    pub fn open_in_memory_with_config(config: CorpusConfig) -> Self {
        Self::from_store(VectorRecordStore::open_in_memory(config))
    }

    fn from_store(store: VectorRecordStore) -> Self {
        Corpus {
            store: Arc::new(store),
            retriever: None,
        }
    }

    /// Attach an embedding gateway, enabling `search` and
    /// `upsert_documents`.
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.retriever = Some(Retriever::new(Arc::clone(&self.store), embedder));
        self
    }

    /// The underlying record store (vector-level API)
    pub fn store(&self) -> &Arc<VectorRecordStore> {
        &self.store
    }

    // ========================================================================
    // Collections
    // ========================================================================

    /// Get or create a collection with the given embedding dimension
    pub fn create_collection(
        &self,
        name: &str,
        dim: usize,
        metadata: Option<JsonValue>,
    ) -> Result<CollectionInfo> {
        self.store.get_or_create_collection(name, dim, metadata)
    }

    /// Delete a collection and all its records; absent is false
    pub fn delete_collection(&self, name: &str) -> Result<bool> {
        self.store.delete_collection(name)
    }

    /// All collections, in creation order
    pub fn list_collections(&self) -> Vec<CollectionInfo> {
        self.store.list_collections()
    }

    // ========================================================================
    // Vector-level record operations
    // ========================================================================

    /// Upsert one record with a caller-provided vector
    pub fn upsert_document(
        &self,
        collection: &str,
        doc: &Document,
        vector: Vec<f32>,
    ) -> Result<RecordId> {
        self.store.upsert(collection, doc, vector)
    }

    /// Delete by record id or external id; absent is false
    pub fn delete_document(&self, collection: &str, key: &DocKey) -> Result<bool> {
        self.store.delete(collection, key)
    }

    /// Point read by record id
    pub fn get_document(&self, collection: &str, id: &RecordId) -> Result<Record> {
        self.store.get(collection, id)
    }

    /// Filtered scan in insertion order
    pub fn scan(&self, collection: &str, filter: &MetadataFilter) -> Result<Vec<Record>> {
        self.store.scan(collection, filter)
    }

    /// Top-k nearest neighbors of a caller-provided vector
    pub fn query(
        &self,
        collection: &str,
        vector: &[f32],
        k: usize,
        metric: DistanceMetric,
    ) -> Result<Vec<(RecordId, f32)>> {
        self.store.query(collection, vector, k, metric)
    }

    // ========================================================================
    // Text-level operations (require an embedder)
    // ========================================================================

    /// Embed and upsert documents, creating the collection on first
    /// reference with the gateway's dimension.
    pub fn upsert_documents(&self, collection: &str, docs: &[Document]) -> Result<Vec<RecordId>> {
        self.retriever()?.upsert_documents(collection, docs)
    }

    /// Embed `query_text` and return the nearest records
    pub fn search(
        &self,
        collection: &str,
        query_text: &str,
        k: usize,
        metric: DistanceMetric,
    ) -> Result<Vec<SearchHit>> {
        self.retriever()?.search(collection, query_text, k, metric)
    }

    fn retriever(&self) -> Result<&Retriever> {
        self.retriever
            .as_ref()
            .ok_or_else(|| Error::invalid_argument("no embedding gateway attached"))
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Rebuild one collection's index
    pub fn maintain(&self, collection: &str) -> Result<()> {
        self.store.maintain(collection)
    }

    /// Rewrite the WAL from live state
    pub fn compact(&self) -> Result<()> {
        self.store.compact()
    }
}
