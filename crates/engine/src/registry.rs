//! Collection registry
//!
//! Maps collection names to their handles. Creation races resolve
//! through the concurrent map's entry API: exactly one creation wins,
//! later callers observe the created entry. No registry-wide lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use corpus_core::{CollectionId, CollectionInfo, Error, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value as JsonValue;

use crate::collection::{CollectionHandle, CollectionState};
use crate::index::IndexBackendFactory;

/// Validate a collection name
///
/// Rules: non-empty, at most 256 characters, no `/`, no null bytes,
/// no leading `_` (reserved for system use).
pub fn validate_collection_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidCollectionName {
            name: name.to_string(),
            reason: "collection name cannot be empty".to_string(),
        });
    }

    if name.len() > 256 {
        return Err(Error::InvalidCollectionName {
            name: name.to_string(),
            reason: "collection name cannot exceed 256 characters".to_string(),
        });
    }

    if name.contains('/') {
        return Err(Error::InvalidCollectionName {
            name: name.to_string(),
            reason: "collection name cannot contain '/'".to_string(),
        });
    }

    if name.contains('\0') {
        return Err(Error::InvalidCollectionName {
            name: name.to_string(),
            reason: "collection name cannot contain null bytes".to_string(),
        });
    }

    if name.starts_with('_') {
        return Err(Error::InvalidCollectionName {
            name: name.to_string(),
            reason: "collection names starting with '_' are reserved".to_string(),
        });
    }

    Ok(())
}

/// Registry of named collections
pub struct CollectionRegistry {
    collections: DashMap<String, Arc<CollectionHandle>>,
    /// Orders `list()` output by creation, even when timestamps tie
    next_creation_seq: AtomicU64,
    factory: IndexBackendFactory,
}

impl CollectionRegistry {
    /// New registry creating backends with the given factory
    pub fn new(factory: IndexBackendFactory) -> Self {
        CollectionRegistry {
            collections: DashMap::new(),
            next_creation_seq: AtomicU64::new(0),
            factory,
        }
    }

    /// Look up a collection by name
    pub fn get(&self, name: &str) -> Result<Arc<CollectionHandle>> {
        self.collections
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::CollectionNotFound {
                name: name.to_string(),
            })
    }

    /// Get an existing collection or atomically create it
    ///
    /// An existing name returns its handle, failing with
    /// `DimensionMismatch` if `dim` differs from the stored dimension.
    /// A new name creates the collection; `on_create` runs before the
    /// entry becomes visible (the WAL append) and aborts creation on
    /// failure. Concurrent calls with the same new name create exactly
    /// one collection.
    pub fn get_or_create(
        &self,
        name: &str,
        dim: usize,
        metadata: Option<JsonValue>,
        on_create: impl FnOnce(&CollectionHandle) -> Result<()>,
    ) -> Result<Arc<CollectionHandle>> {
        if let Some(existing) = self.collections.get(name) {
            let handle = Arc::clone(existing.value());
            drop(existing);
            check_dim(&handle, dim)?;
            return Ok(handle);
        }

        validate_collection_name(name)?;
        if dim == 0 {
            return Err(Error::invalid_argument(
                "embedding dimension must be > 0".to_string(),
            ));
        }

        match self.collections.entry(name.to_string()) {
            Entry::Occupied(occupied) => {
                // Lost the race; the winner's dimension governs.
                let handle = Arc::clone(occupied.get());
                check_dim(&handle, dim)?;
                Ok(handle)
            }
            Entry::Vacant(vacant) => {
                let handle = Arc::new(self.build_handle(name, dim, metadata));
                on_create(&handle)?;
                tracing::info!(
                    target: "corpus::registry",
                    collection = name,
                    dim,
                    "created collection"
                );
                vacant.insert(Arc::clone(&handle));
                Ok(handle)
            }
        }
    }

    /// Insert a collection rebuilt from the WAL, with its original
    /// identity. Used only during replay.
    pub fn restore(
        &self,
        id: CollectionId,
        name: &str,
        dim: usize,
        metadata: Option<JsonValue>,
        created_at: u64,
    ) -> Arc<CollectionHandle> {
        let creation_seq = self.next_creation_seq.fetch_add(1, Ordering::Relaxed);
        let handle = Arc::new(CollectionHandle {
            id,
            name: name.to_string(),
            embedding_dim: dim,
            metadata,
            created_at,
            creation_seq,
            state: parking_lot::RwLock::new(CollectionState::new(self.factory.create(dim))),
        });
        self.collections
            .insert(name.to_string(), Arc::clone(&handle));
        handle
    }

    /// Remove a collection; cascades to all its records (the handle,
    /// records and index drop together). Idempotent: a missing name
    /// returns None.
    pub fn delete(&self, name: &str) -> Option<Arc<CollectionHandle>> {
        let removed = self.collections.remove(name).map(|(_, handle)| handle);
        if removed.is_some() {
            tracing::info!(target: "corpus::registry", collection = name, "deleted collection");
        }
        removed
    }

    /// All collections, ordered by creation
    pub fn list(&self) -> Vec<CollectionInfo> {
        let mut handles: Vec<Arc<CollectionHandle>> = self
            .collections
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        handles.sort_by_key(|h| h.creation_seq);
        handles.iter().map(|h| h.info()).collect()
    }

    /// Number of collections
    pub fn len(&self) -> usize {
        self.collections.len()
    }

    /// True if no collections exist
    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    fn build_handle(&self, name: &str, dim: usize, metadata: Option<JsonValue>) -> CollectionHandle {
        let creation_seq = self.next_creation_seq.fetch_add(1, Ordering::Relaxed);
        CollectionHandle {
            id: CollectionId::new(),
            name: name.to_string(),
            embedding_dim: dim,
            metadata,
            created_at: corpus_core::now_micros(),
            creation_seq,
            state: parking_lot::RwLock::new(CollectionState::new(self.factory.create(dim))),
        }
    }
}

fn check_dim(handle: &CollectionHandle, dim: usize) -> Result<()> {
    if handle.embedding_dim != dim {
        return Err(Error::DimensionMismatch {
            expected: handle.embedding_dim,
            got: dim,
        });
    }
    Ok(())
}
