//! corpus-retrieval: embedding gateway and retrieval orchestration
//!
//! Sits on top of `corpus-engine`: turns text into vectors through an
//! [`Embedder`] and answers text queries with hydrated records. The
//! engine stays embedding-agnostic; this crate is the only place that
//! knows a gateway exists.

pub mod embedder;
pub mod service;

pub use embedder::{Embedder, HashEmbedder, HttpEmbedder};
pub use service::Retriever;
