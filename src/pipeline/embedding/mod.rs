//! Embedding cache and vector-store plumbing.
//!
//! An embedding record is content-addressed: a fingerprint is embedded at
//! most once per process lifetime, and later sessions reuse its vectors by
//! copying points out of the record's home collection.

pub mod chunker;
pub mod manager;
pub mod memory;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::pipeline::cache::CacheError;
use crate::pipeline::fingerprint::Fingerprint;
use crate::providers::ProviderError;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("embedding provider failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("vector store error: {0}")]
    Store(#[from] VectorStoreError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("provider returned {got} vectors for {expected} chunks")]
    MismatchedVectors { expected: usize, got: usize },

    #[error("document produced no chunks to embed")]
    NoChunks,
}

#[derive(Error, Debug)]
pub enum VectorStoreError {
    #[error("collection not found: {0}")]
    CollectionMissing(String),

    #[error("point not found: {0}")]
    PointMissing(Uuid),

    #[error("vector store backend error: {0}")]
    Backend(String),
}

/// One embedded chunk in a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorPoint {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: serde_json::Value,
}

/// Vector store seam. The in-memory implementation backs tests; a real
/// backend implements the same operations.
pub trait VectorStore: Send + Sync {
    /// Create the collection if it does not exist.
    fn ensure_collection(&self, name: &str) -> Result<(), VectorStoreError>;

    fn delete_collection(&self, name: &str) -> Result<(), VectorStoreError>;

    fn upsert(&self, collection: &str, points: Vec<VectorPoint>) -> Result<(), VectorStoreError>;

    /// Copy points by id between collections without re-reading vectors on
    /// the client side. `from` and `to` may be the same collection; the
    /// call then changes nothing but still fails on any absent point.
    fn copy_points(
        &self,
        from: &str,
        to: &str,
        ids: &[Uuid],
    ) -> Result<(), VectorStoreError>;

    /// The `k` points most similar to `vector`, best first.
    fn query(
        &self,
        collection: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<VectorPoint>, VectorStoreError>;

    fn count(&self, collection: &str) -> Result<usize, VectorStoreError>;

    fn collection_exists(&self, name: &str) -> bool;
}

/// Cached embedding state for one fingerprint.
///
/// `home_collection` is where the vectors physically live; it survives as
/// long as this record does, even if the session that created it is torn
/// down. `sessions_used_in` is append-only reuse bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub fingerprint: Fingerprint,
    pub home_collection: String,
    pub point_ids: Vec<Uuid>,
    pub chunk_count: usize,
    pub chunking_version: u32,
    pub embedded_at: DateTime<Utc>,
    pub sessions_used_in: Vec<String>,
}

/// Deterministic point id for one chunk of one document. The same
/// fingerprint and chunk index always yield the same id.
pub fn point_id(fingerprint: &Fingerprint, chunk_index: usize) -> Uuid {
    let name = format!("{}:{chunk_index}", fingerprint.as_str());
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
}
