//! Core types for corpusdb
//!
//! This crate defines the types shared across the workspace:
//!
//! - **Error / Result**: unified error taxonomy for all operations
//! - **Record / CollectionInfo**: the stored data model
//! - **DistanceMetric / SearchHit**: similarity search types
//! - **MetadataFilter**: scan-time metadata predicates
//! - **CorpusConfig**: store configuration loaded from `corpus.toml`
//!
//! Implementation logic (indexing, storage, retrieval) lives in the
//! engine and retrieval crates.

pub mod config;
pub mod error;
pub mod filter;
pub mod types;

pub use config::{CorpusConfig, DurabilityMode, IndexMode, IvfParams, CONFIG_FILE_NAME};
pub use error::{Error, Result};
pub use filter::{FilterCondition, FilterOp, JsonScalar, MetadataFilter};
pub use types::{
    now_micros, CollectionId, CollectionInfo, DistanceMetric, DocKey, Document, Record, RecordId,
    RecordSeq, SearchHit,
};
