//! On-disk representation of the multi-tier cache index.
//!
//! One JSON document holds all four tiers, keyed by fingerprint. Writes go
//! through a temp file in the same directory followed by a rename, so a
//! crash mid-write leaves the previous index intact. A missing, corrupt, or
//! version-mismatched index is treated as cold, never as an error.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::CacheError;
use crate::pipeline::embedding::EmbeddingRecord;
use crate::pipeline::parsing::types::ParsedDocument;
use crate::pipeline::types::{ClassificationRecord, ExtractionRecord};

pub(super) const INDEX_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct IndexFile {
    pub version: u32,
    pub parse: BTreeMap<String, ParsedDocument>,
    pub classification: BTreeMap<String, ClassificationRecord>,
    pub extraction: BTreeMap<String, ExtractionRecord>,
    pub embedding: BTreeMap<String, EmbeddingRecord>,
}

impl Default for IndexFile {
    fn default() -> Self {
        Self {
            version: INDEX_VERSION,
            parse: BTreeMap::new(),
            classification: BTreeMap::new(),
            extraction: BTreeMap::new(),
            embedding: BTreeMap::new(),
        }
    }
}

/// Load the index, degrading to an empty (cold) index on any problem.
pub(super) fn load(path: &Path) -> IndexFile {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No cache index on disk, starting cold");
            return IndexFile::default();
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cache index unreadable, starting cold");
            return IndexFile::default();
        }
    };

    match serde_json::from_slice::<IndexFile>(&bytes) {
        Ok(index) if index.version == INDEX_VERSION => index,
        Ok(index) => {
            warn!(
                found = index.version,
                expected = INDEX_VERSION,
                "Cache index version mismatch, starting cold"
            );
            IndexFile::default()
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cache index corrupt, starting cold");
            IndexFile::default()
        }
    }
}

/// Atomically persist the index: write a sibling temp file, then rename
/// over the target.
pub(super) fn persist(path: &Path, index: &IndexFile) -> Result<(), CacheError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_vec_pretty(index)?;
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
