//! Retrieval service
//!
//! Orchestrates embedding and vector search against the record
//! store. The service holds no locks of its own and never holds a
//! store lock across a gateway call; embedding happens first, store
//! access second.

use std::sync::Arc;

use corpus_core::{DistanceMetric, DocKey, Document, Record, RecordId, Result, SearchHit};
use corpus_engine::VectorRecordStore;

use crate::embedder::Embedder;

/// Embedding-aware facade over the record store
pub struct Retriever {
    store: Arc<VectorRecordStore>,
    embedder: Arc<dyn Embedder>,
}

impl Retriever {
    pub fn new(store: Arc<VectorRecordStore>, embedder: Arc<dyn Embedder>) -> Self {
        Retriever { store, embedder }
    }

    /// The gateway's embedding dimension; collections created through
    /// this service use it.
    pub fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    /// Embed and upsert a batch of documents, creating the collection
    /// on first reference.
    ///
    /// Embedding happens before any write, so a gateway failure
    /// leaves the store untouched. Returned ids are index-aligned
    /// with `docs`.
    pub fn upsert_documents(&self, collection: &str, docs: &[Document]) -> Result<Vec<RecordId>> {
        if docs.is_empty() {
            return Ok(Vec::new());
        }
        let texts: Vec<&str> = docs.iter().map(|d| d.text.as_str()).collect();
        let vectors = self.embedder.embed_batch(&texts)?;

        self.store
            .get_or_create_collection(collection, self.embedder.dimension(), None)?;

        let mut ids = Vec::with_capacity(docs.len());
        for (doc, vector) in docs.iter().zip(vectors) {
            ids.push(self.store.upsert(collection, doc, vector)?);
        }
        tracing::debug!(
            target: "corpus::retrieval",
            collection,
            count = ids.len(),
            "upserted documents"
        );
        Ok(ids)
    }

    /// Embed `query_text` and return the `k` nearest records.
    ///
    /// A record deleted between the index query and hydration is
    /// skipped, so the result can be shorter than `min(k, records)`
    /// under concurrent deletes.
    pub fn search(
        &self,
        collection: &str,
        query_text: &str,
        k: usize,
        metric: DistanceMetric,
    ) -> Result<Vec<SearchHit>> {
        // Fail on the collection before spending a gateway call.
        let info = self.store.collection_info(collection)?;
        let query = self.embedder.embed(query_text)?;
        let hits = self.store.query(collection, &query, k, metric)?;

        let mut results = Vec::with_capacity(hits.len());
        for (id, distance) in hits {
            match self.store.get(collection, &id) {
                Ok(record) => results.push(SearchHit { record, distance }),
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }
        tracing::debug!(
            target: "corpus::retrieval",
            collection = %info.name,
            k,
            returned = results.len(),
            "search"
        );
        Ok(results)
    }

    /// Delete one document by id or external id; absent is false
    pub fn delete_document(&self, collection: &str, key: &DocKey) -> Result<bool> {
        self.store.delete(collection, key)
    }

    /// Point read by record id
    pub fn get_document(&self, collection: &str, id: &RecordId) -> Result<Record> {
        self.store.get(collection, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::HashEmbedder;
    use corpus_core::{CorpusConfig, Error};

    fn retriever() -> Retriever {
        let store = Arc::new(VectorRecordStore::open_in_memory(CorpusConfig::default()));
        Retriever::new(store, Arc::new(HashEmbedder::new(16)))
    }

    #[test]
    fn test_upsert_creates_collection_with_gateway_dimension() {
        let r = retriever();
        r.upsert_documents("notes", &[Document::new("hello world")])
            .unwrap();
        assert_eq!(r.store.collection_info("notes").unwrap().embedding_dim, 16);
    }

    #[test]
    fn test_search_finds_upserted_text() {
        let r = retriever();
        r.upsert_documents(
            "notes",
            &[
                Document::with_external_id("a", "rust borrow checker"),
                Document::with_external_id("b", "chocolate cake recipe"),
            ],
        )
        .unwrap();

        let hits = r
            .search("notes", "rust borrow checker", 1, DistanceMetric::Cosine)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.external_id.as_deref(), Some("a"));
    }

    #[test]
    fn test_search_unknown_collection() {
        let r = retriever();
        let err = r
            .search("nope", "anything", 3, DistanceMetric::Cosine)
            .unwrap_err();
        assert!(matches!(err, Error::CollectionNotFound { .. }));
    }

    #[test]
    fn test_delete_document_round_trip() {
        let r = retriever();
        let ids = r
            .upsert_documents("notes", &[Document::with_external_id("a", "text")])
            .unwrap();
        assert!(r
            .delete_document("notes", &DocKey::External("a".into()))
            .unwrap());
        assert!(r.get_document("notes", &ids[0]).unwrap_err().is_not_found());
    }
}
