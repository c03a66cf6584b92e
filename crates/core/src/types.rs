//! Data model types for the corpus store
//!
//! These types define collections, records and search results.
//! Index and storage logic lives in the engine crate.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Get current time in microseconds since Unix epoch
///
/// Returns 0 if the system clock is before the Unix epoch.
pub fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Public record identifier (UUID v4, assigned at insert)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(pub Uuid);

impl RecordId {
    /// Allocate a fresh record id
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        RecordId(Uuid::new_v4())
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Public collection identifier (UUID v4, assigned at creation)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CollectionId(pub Uuid);

impl CollectionId {
    /// Allocate a fresh collection id
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        CollectionId(Uuid::new_v4())
    }
}

impl std::fmt::Display for CollectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Internal per-collection sequence number
///
/// IMPORTANT: RecordSeqs are never reused. They are monotonically
/// increasing within a collection, so ascending seq equals insertion
/// order. All distance ties break by ascending seq, which makes
/// search results deterministic across runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordSeq(pub u64);

impl RecordSeq {
    /// Wrap a raw sequence number
    pub fn new(seq: u64) -> Self {
        RecordSeq(seq)
    }

    /// Get the underlying u64 value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for RecordSeq {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RecordSeq({})", self.0)
    }
}

/// Distance metric for similarity search
///
/// All metrics are distances: lower = closer. This orientation is part
/// of the interface contract; results are sorted ascending by distance.
/// The metric is a query-time parameter, never fixed per collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Cosine distance: 1 - dot(a,b) / (||a|| * ||b||)
    /// Range: [0, 2], lower = closer
    /// A zero-norm vector has distance 1.0 to everything (similarity 0).
    #[default]
    Cosine,

    /// Squared Euclidean distance: sum((a_i - b_i)^2)
    /// Range: [0, inf), lower = closer
    /// The square root is omitted; it does not change the ordering.
    SquaredEuclidean,
}

impl DistanceMetric {
    /// Human-readable name for display
    pub fn name(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::SquaredEuclidean => "squared_euclidean",
        }
    }

    /// Parse from string (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "cosine" => Some(DistanceMetric::Cosine),
            "squared_euclidean" | "euclidean" | "l2" => Some(DistanceMetric::SquaredEuclidean),
            _ => None,
        }
    }
}

/// Key addressing a record for point delete
///
/// Records can be deleted either by their store-assigned id or by the
/// caller-supplied external id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocKey {
    /// Store-assigned record id
    Id(RecordId),
    /// Caller-supplied idempotency key
    External(String),
}

impl From<RecordId> for DocKey {
    fn from(id: RecordId) -> Self {
        DocKey::Id(id)
    }
}

impl From<&str> for DocKey {
    fn from(ext: &str) -> Self {
        DocKey::External(ext.to_string())
    }
}

impl From<String> for DocKey {
    fn from(ext: String) -> Self {
        DocKey::External(ext)
    }
}

/// Collection descriptor returned by registry operations
///
/// An owned copy; never a live handle into internal storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionInfo {
    /// Collection id
    pub id: CollectionId,
    /// Unique collection name
    pub name: String,
    /// Embedding dimension, immutable after creation
    pub embedding_dim: usize,
    /// Optional collection-level metadata
    pub metadata: Option<serde_json::Value>,
    /// Number of live records
    pub count: usize,
    /// Creation timestamp (microseconds since epoch)
    pub created_at: u64,
}

/// A document handed to the store for upsert
///
/// The store assigns the id; `external_id`, when set, keys the
/// idempotent upsert (a second upsert with the same external id
/// overwrites in place rather than inserting a duplicate).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Optional caller-supplied idempotency key, unique per collection
    pub external_id: Option<String>,
    /// Document text
    pub text: String,
    /// Optional JSON metadata
    pub metadata: Option<serde_json::Value>,
}

impl Document {
    /// Create a document without an external id (always inserts fresh)
    pub fn new(text: impl Into<String>) -> Self {
        Document {
            external_id: None,
            text: text.into(),
            metadata: None,
        }
    }

    /// Create a document keyed by an external id
    pub fn with_external_id(ext_id: impl Into<String>, text: impl Into<String>) -> Self {
        Document {
            external_id: Some(ext_id.into()),
            text: text.into(),
            metadata: None,
        }
    }

    /// Attach metadata
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Record stored in a collection
///
/// Returned by value from every read path — callers never hold
/// references into internal storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    /// Store-assigned record id
    pub id: RecordId,
    /// Internal sequence number (insertion order, tie-break key)
    pub seq: RecordSeq,
    /// Caller-supplied idempotency key, if any
    pub external_id: Option<String>,
    /// Document text
    pub text: String,
    /// Optional JSON metadata
    pub metadata: Option<serde_json::Value>,
    /// Embedding vector, length == collection embedding_dim
    pub vector: Vec<f32>,
    /// Bumped on every overwrite of this record
    pub version: u64,
    /// Creation timestamp (microseconds since epoch)
    pub created_at: u64,
    /// Last update timestamp (microseconds since epoch)
    pub updated_at: u64,
}

/// A search result: record plus its distance to the query
#[derive(Debug, Clone)]
pub struct SearchHit {
    /// The matched record (hydrated copy)
    pub record: Record,
    /// Distance under the query metric (lower = closer)
    pub distance: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_ids_unique() {
        let a = RecordId::new();
        let b = RecordId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_record_seq_ordering() {
        assert!(RecordSeq::new(1) < RecordSeq::new(2));
        assert_eq!(RecordSeq::new(7).as_u64(), 7);
    }

    #[test]
    fn test_metric_parse() {
        assert_eq!(DistanceMetric::parse("cosine"), Some(DistanceMetric::Cosine));
        assert_eq!(
            DistanceMetric::parse("L2"),
            Some(DistanceMetric::SquaredEuclidean)
        );
        assert_eq!(
            DistanceMetric::parse("euclidean"),
            Some(DistanceMetric::SquaredEuclidean)
        );
        assert_eq!(DistanceMetric::parse("manhattan"), None);
    }

    #[test]
    fn test_metric_name() {
        assert_eq!(DistanceMetric::Cosine.name(), "cosine");
        assert_eq!(DistanceMetric::SquaredEuclidean.name(), "squared_euclidean");
    }

    #[test]
    fn test_doc_key_conversions() {
        let id = RecordId::new();
        assert_eq!(DocKey::from(id), DocKey::Id(id));
        assert_eq!(DocKey::from("a1"), DocKey::External("a1".to_string()));
    }

    #[test]
    fn test_document_builders() {
        let doc = Document::with_external_id("a1", "hello")
            .with_metadata(serde_json::json!({"lang": "en"}));
        assert_eq!(doc.external_id.as_deref(), Some("a1"));
        assert_eq!(doc.text, "hello");
        assert!(doc.metadata.is_some());

        let plain = Document::new("anon");
        assert!(plain.external_id.is_none());
    }

    #[test]
    fn test_now_micros_monotonic_enough() {
        let a = now_micros();
        let b = now_micros();
        assert!(b >= a);
        assert!(a > 1_600_000_000_000_000); // after Sep 2020
    }
}
