//! Session collections and the embed-once guarantee.
//!
//! Each batch works inside its own session collection. The first time a
//! fingerprint is seen anywhere, its chunks are embedded and upserted into
//! that session's collection, which becomes the fingerprint's home. Every
//! later session copies the points from home instead of re-embedding.
//! The per-fingerprint cache lock makes this hold under concurrency: a
//! second simultaneous miss waits, re-checks, and finds a hit.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};

use super::{chunker, point_id, EmbeddingError, EmbeddingRecord, VectorPoint, VectorStore};
use crate::pipeline::cache::MultiTierCache;
use crate::pipeline::fingerprint::Fingerprint;
use crate::providers::{EmbeddingProvider, RetryPolicy};

/// Whether a document's vectors were computed or reused. Feeds the
/// embedding tier's hit/miss counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedDisposition {
    Embedded,
    Reused,
}

pub struct VectorStoreManager {
    store: Arc<dyn VectorStore>,
    embedder: Box<dyn EmbeddingProvider>,
    retry: RetryPolicy,
    cache: Arc<MultiTierCache>,
}

impl VectorStoreManager {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Box<dyn EmbeddingProvider>,
        retry: RetryPolicy,
        cache: Arc<MultiTierCache>,
    ) -> Self {
        Self {
            store,
            embedder,
            retry,
            cache,
        }
    }

    pub fn session_collection(session_id: &str) -> String {
        format!("session-{session_id}")
    }

    /// Make one document's vectors available in `session_id`'s collection,
    /// embedding only if no prior session has embedded this fingerprint.
    pub fn ensure_embedded(
        &self,
        fingerprint: &Fingerprint,
        markdown: &str,
        session_id: &str,
    ) -> Result<EmbedDisposition, EmbeddingError> {
        let session = Self::session_collection(session_id);
        self.store.ensure_collection(&session)?;

        let lock = self.cache.fingerprint_lock(fingerprint);
        let _guard = match lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        // Re-check under the lock: a concurrent miss may have just filled it.
        if let Some(record) = self.cache.get_embedding(fingerprint) {
            match self.reuse(&record, fingerprint, &session) {
                Ok(()) => return Ok(EmbedDisposition::Reused),
                // A record can outlive its store contents (e.g. the store
                // was rebuilt). Fall through and embed fresh.
                Err(EmbeddingError::Store(e)) => {
                    warn!(
                        fingerprint = %fingerprint.short(),
                        home = %record.home_collection,
                        error = %e,
                        "Cached embedding unusable, re-embedding"
                    );
                }
                Err(other) => return Err(other),
            }
        }

        let chunks = chunker::chunk(markdown);
        if chunks.is_empty() {
            return Err(EmbeddingError::NoChunks);
        }
        let chunk_refs: Vec<&str> = chunks.iter().map(String::as_str).collect();
        let vectors = self.retry.run(|| self.embedder.embed(&chunk_refs))?;
        if vectors.len() != chunks.len() {
            return Err(EmbeddingError::MismatchedVectors {
                expected: chunks.len(),
                got: vectors.len(),
            });
        }

        let mut point_ids = Vec::with_capacity(chunks.len());
        let mut points = Vec::with_capacity(chunks.len());
        for (i, (chunk, vector)) in chunks.iter().zip(vectors).enumerate() {
            let id = point_id(fingerprint, i);
            point_ids.push(id);
            points.push(VectorPoint {
                id,
                vector,
                payload: json!({
                    "fingerprint": fingerprint.as_str(),
                    "chunk_index": i,
                    "text": chunk,
                }),
            });
        }
        self.store.upsert(&session, points)?;

        let chunk_count = chunks.len();
        self.cache.put_embedding(EmbeddingRecord {
            fingerprint: fingerprint.clone(),
            home_collection: session.clone(),
            point_ids,
            chunk_count,
            chunking_version: chunker::CHUNKING_VERSION,
            embedded_at: Utc::now(),
            sessions_used_in: vec![session.clone()],
        })?;

        info!(
            fingerprint = %fingerprint.short(),
            collection = %session,
            chunks = chunk_count,
            "Document embedded into home collection"
        );
        Ok(EmbedDisposition::Embedded)
    }

    fn reuse(
        &self,
        record: &EmbeddingRecord,
        fingerprint: &Fingerprint,
        session: &str,
    ) -> Result<(), EmbeddingError> {
        // When home is the requesting session itself this is a self-copy:
        // nothing moves, but every point id is still looked up, so a record
        // that outlived a rebuilt store surfaces as a store error here.
        self.store
            .copy_points(&record.home_collection, session, &record.point_ids)?;
        self.cache.update_embedding(fingerprint, |r| {
            if !r.sessions_used_in.iter().any(|s| s == session) {
                r.sessions_used_in.push(session.to_string());
            }
        })?;
        debug!(
            fingerprint = %fingerprint.short(),
            home = %record.home_collection,
            session = %session,
            "Reused cached embedding"
        );
        Ok(())
    }

    /// Tear down a session's collection unless it is home to any cached
    /// fingerprint, in which case the vectors must outlive the session.
    pub fn teardown_session(&self, session_id: &str) -> Result<(), EmbeddingError> {
        let session = Self::session_collection(session_id);
        if self.cache.home_collections().contains(&session) {
            debug!(collection = %session, "Session collection is a home, keeping it");
            return Ok(());
        }
        self.store.delete_collection(&session)?;
        Ok(())
    }
}
