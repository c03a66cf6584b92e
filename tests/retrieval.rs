//! Text-level retrieval through the embedding gateway: orchestration,
//! collection auto-creation, and embedding-failure surfacing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use corpusdb::{
    Corpus, DistanceMetric, DocKey, Document, Embedder, Error, HashEmbedder, MetadataFilter,
    Result,
};

#[test]
fn test_upsert_documents_creates_collection() {
    let corpus = Corpus::open_in_memory().with_embedder(Arc::new(HashEmbedder::new(32)));
    let ids = corpus
        .upsert_documents(
            "notes",
            &[
                Document::with_external_id("n1", "ownership and borrowing"),
                Document::with_external_id("n2", "lifetimes in function signatures"),
            ],
        )
        .unwrap();
    assert_eq!(ids.len(), 2);

    let info = &corpus.list_collections()[0];
    assert_eq!(info.name, "notes");
    assert_eq!(info.embedding_dim, 32);
    assert_eq!(info.count, 2);
}

#[test]
fn test_search_returns_relevant_document_first() {
    let corpus = Corpus::open_in_memory().with_embedder(Arc::new(HashEmbedder::new(64)));
    corpus
        .upsert_documents(
            "notes",
            &[
                Document::with_external_id("rust", "rust async await executor"),
                Document::with_external_id("cook", "slow roasted tomato sauce"),
                Document::with_external_id("bike", "mountain bike tire pressure"),
            ],
        )
        .unwrap();

    let hits = corpus
        .search("notes", "rust async await executor", 3, DistanceMetric::Cosine)
        .unwrap();
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].record.external_id.as_deref(), Some("rust"));
    assert!(hits[0].distance < 1e-5, "identical text embeds identically");
    assert!(hits[0].distance <= hits[1].distance);
    assert!(hits[1].distance <= hits[2].distance);
}

#[test]
fn test_text_upsert_is_idempotent_by_external_id() {
    let corpus = Corpus::open_in_memory().with_embedder(Arc::new(HashEmbedder::new(16)));
    corpus
        .upsert_documents("notes", &[Document::with_external_id("n1", "draft")])
        .unwrap();
    corpus
        .upsert_documents("notes", &[Document::with_external_id("n1", "final")])
        .unwrap();

    let records = corpus.scan("notes", &MetadataFilter::new()).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].text, "final");
}

#[test]
fn test_deleted_document_absent_from_search() {
    let corpus = Corpus::open_in_memory().with_embedder(Arc::new(HashEmbedder::new(16)));
    corpus
        .upsert_documents(
            "notes",
            &[
                Document::with_external_id("a", "first note"),
                Document::with_external_id("b", "second note"),
            ],
        )
        .unwrap();
    assert!(corpus
        .delete_document("notes", &DocKey::External("a".into()))
        .unwrap());

    let hits = corpus
        .search("notes", "first note", 5, DistanceMetric::Cosine)
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].record.external_id.as_deref(), Some("b"));
}

// ============================================================================
// Gateway failure handling
// ============================================================================

/// Gateway that fails every call, counting attempts
struct FailingEmbedder {
    calls: AtomicUsize,
}

impl Embedder for FailingEmbedder {
    fn dimension(&self) -> usize {
        8
    }

    fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::Embedding("gateway unavailable".into()))
    }
}

#[test]
fn test_embedding_failure_leaves_store_untouched() {
    let failing = Arc::new(FailingEmbedder {
        calls: AtomicUsize::new(0),
    });
    let corpus = Corpus::open_in_memory().with_embedder(failing.clone());

    let err = corpus
        .upsert_documents("notes", &[Document::new("doomed")])
        .unwrap_err();
    assert!(matches!(err, Error::Embedding(_)));

    // Embedding runs before any write: no collection was created and
    // the gateway was called exactly once, with no retry.
    assert!(corpus.list_collections().is_empty());
    assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_search_embedding_failure_surfaces() {
    let corpus = Corpus::open_in_memory().with_embedder(Arc::new(HashEmbedder::new(8)));
    corpus
        .upsert_documents("notes", &[Document::new("content")])
        .unwrap();

    // Swap in a failing gateway over the same store.
    let broken = Corpus::open_in_memory().with_embedder(Arc::new(FailingEmbedder {
        calls: AtomicUsize::new(0),
    }));
    broken.create_collection("notes", 8, None).unwrap();
    let err = broken
        .search("notes", "content", 3, DistanceMetric::Cosine)
        .unwrap_err();
    assert!(matches!(err, Error::Embedding(_)));
}

#[test]
fn test_mixed_vector_and_text_access() {
    let corpus = Corpus::open_in_memory().with_embedder(Arc::new(HashEmbedder::new(8)));
    let ids = corpus
        .upsert_documents("notes", &[Document::with_external_id("n1", "hello world")])
        .unwrap();

    // The record's stored vector works through the vector-level API
    // and finds itself at distance zero.
    let record = corpus.get_document("notes", &ids[0]).unwrap();
    let hits = corpus
        .query("notes", &record.vector, 1, DistanceMetric::Cosine)
        .unwrap();
    assert_eq!(hits[0].0, ids[0]);
    assert!(hits[0].1.abs() < 1e-6);
}
