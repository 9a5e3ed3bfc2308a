//! Multi-tier content-addressed cache.
//!
//! Four tiers keyed by fingerprint: parse results, classifications,
//! extractions, and embedding records. Entries never expire and are never
//! invalidated by time; a changed document is a different fingerprint and
//! therefore a different key. Tier membership is independent per
//! fingerprint.
//!
//! Writers to the same fingerprint serialize on a per-fingerprint lock, so
//! a second concurrent miss degenerates into a hit instead of duplicate
//! provider work. Writers to distinct fingerprints do not contend.

mod index;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};

use thiserror::Error;
use tracing::debug;

use crate::pipeline::embedding::EmbeddingRecord;
use crate::pipeline::fingerprint::Fingerprint;
use crate::pipeline::parsing::types::ParsedDocument;
use crate::pipeline::types::{ClassificationRecord, ExtractionRecord};

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub struct MultiTierCache {
    index_path: PathBuf,
    state: RwLock<index::IndexFile>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl MultiTierCache {
    /// Open the cache at `index_path`. A missing or corrupt index starts
    /// cold; it is not an error.
    pub fn open(index_path: impl Into<PathBuf>) -> Self {
        let index_path = index_path.into();
        let state = index::load(&index_path);
        debug!(
            parse = state.parse.len(),
            classification = state.classification.len(),
            extraction = state.extraction.len(),
            embedding = state.embedding.len(),
            "Cache index loaded"
        );
        Self {
            index_path,
            state: RwLock::new(state),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// The write lock for one fingerprint. Callers hold it across their
    /// check-miss-compute-store sequence; other fingerprints are unaffected.
    pub fn fingerprint_lock(&self, fingerprint: &Fingerprint) -> Arc<Mutex<()>> {
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Drop entries no caller holds any more, or the table grows with
        // every fingerprint ever seen.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry(fingerprint.as_str().to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // ──────────────────────────────────────────────
    // Parse tier
    // ──────────────────────────────────────────────

    /// Cached parse result, revalidated against the markdown artifact on
    /// disk. A record whose artifact has vanished is cold.
    pub fn get_parse(&self, fingerprint: &Fingerprint) -> Option<ParsedDocument> {
        let record = self.read(|s| s.parse.get(fingerprint.as_str()).cloned())?;
        if record.markdown_path.is_file() {
            Some(record)
        } else {
            debug!(
                fingerprint = %fingerprint.short(),
                artifact = %record.markdown_path.display(),
                "Parse cache entry has no artifact on disk, treating as cold"
            );
            None
        }
    }

    pub fn put_parse(&self, record: ParsedDocument) -> Result<(), CacheError> {
        self.write(|s| {
            s.parse.insert(record.fingerprint.as_str().to_string(), record);
        })
    }

    // ──────────────────────────────────────────────
    // Classification tier
    // ──────────────────────────────────────────────

    pub fn get_classification(&self, fingerprint: &Fingerprint) -> Option<ClassificationRecord> {
        self.read(|s| s.classification.get(fingerprint.as_str()).cloned())
    }

    pub fn put_classification(&self, record: ClassificationRecord) -> Result<(), CacheError> {
        self.write(|s| {
            s.classification
                .insert(record.fingerprint.as_str().to_string(), record);
        })
    }

    // ──────────────────────────────────────────────
    // Extraction tier
    // ──────────────────────────────────────────────

    pub fn get_extraction(&self, fingerprint: &Fingerprint) -> Option<ExtractionRecord> {
        self.read(|s| s.extraction.get(fingerprint.as_str()).cloned())
    }

    pub fn put_extraction(&self, record: ExtractionRecord) -> Result<(), CacheError> {
        self.write(|s| {
            s.extraction
                .insert(record.fingerprint.as_str().to_string(), record);
        })
    }

    // ──────────────────────────────────────────────
    // Embedding tier
    // ──────────────────────────────────────────────

    /// Cached embedding record. A record chunked under an older chunking
    /// scheme is cold: its point layout no longer matches what the current
    /// chunker would produce.
    pub fn get_embedding(&self, fingerprint: &Fingerprint) -> Option<EmbeddingRecord> {
        let record = self.read(|s| s.embedding.get(fingerprint.as_str()).cloned())?;
        if record.chunking_version == crate::pipeline::embedding::chunker::CHUNKING_VERSION {
            Some(record)
        } else {
            None
        }
    }

    pub fn put_embedding(&self, record: EmbeddingRecord) -> Result<(), CacheError> {
        self.write(|s| {
            s.embedding
                .insert(record.fingerprint.as_str().to_string(), record);
        })
    }

    /// Mutate one fingerprint's embedding record in place (e.g. to record
    /// reuse by another session). No-op if the record is absent.
    pub fn update_embedding(
        &self,
        fingerprint: &Fingerprint,
        mutate: impl FnOnce(&mut EmbeddingRecord),
    ) -> Result<(), CacheError> {
        self.write(|s| {
            if let Some(record) = s.embedding.get_mut(fingerprint.as_str()) {
                mutate(record);
            }
        })
    }

    /// All home collections currently referenced by the embedding tier.
    /// Session teardown must not destroy any of these.
    pub fn home_collections(&self) -> std::collections::BTreeSet<String> {
        self.read(|s| {
            s.embedding
                .values()
                .map(|r| r.home_collection.clone())
                .collect()
        })
    }

    // ──────────────────────────────────────────────

    fn read<T>(&self, f: impl FnOnce(&index::IndexFile) -> T) -> T {
        let guard = match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&guard)
    }

    fn write(&self, f: impl FnOnce(&mut index::IndexFile)) -> Result<(), CacheError> {
        let mut guard = match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard);
        index::persist(&self.index_path, &guard)
    }
}
