//! Configuration for the document intelligence pipeline.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Tunables for the pipeline. Build one with [`PipelineConfig::new`] and
/// adjust fields as needed; chunking parameters are deliberately NOT here —
/// they are global constants whose change requires cache re-versioning
/// (see `pipeline::embedding::chunker`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Root directory for persisted state (cache index, markdown artifacts).
    pub data_dir: PathBuf,
    /// Complexity score at or above which the comprehensive parser is used.
    pub router_threshold: f32,
    /// Bounded worker count for per-document fan-out within a stage.
    pub worker_threads: usize,
    /// Maximum attempts per external provider call.
    pub retry_max_attempts: u32,
    /// Base delay for exponential backoff between retries.
    pub retry_base_delay_ms: u64,
    /// Backoff cap.
    pub retry_max_delay_ms: u64,
    /// How much of a document's markdown the classifier sees.
    pub classification_sample_chars: usize,
}

impl PipelineConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            router_threshold: 0.3,
            worker_threads: 4,
            retry_max_attempts: 3,
            retry_base_delay_ms: 200,
            retry_max_delay_ms: 5_000,
            classification_sample_chars: 4_000,
        }
    }

    /// Where parsed markdown artifacts live. Artifact lifetime is the
    /// lifetime of the file on disk, not of any session.
    pub fn artifacts_dir(&self) -> PathBuf {
        self.data_dir.join("artifacts")
    }

    /// Path of the persisted multi-tier cache index.
    pub fn index_path(&self) -> PathBuf {
        self.data_dir.join("index.json")
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.artifacts_dir())
    }

    /// Config rooted in a throwaway location with retries tightened for tests.
    #[doc(hidden)]
    pub fn for_tests(data_dir: &Path) -> Self {
        Self {
            retry_max_attempts: 2,
            retry_base_delay_ms: 1,
            retry_max_delay_ms: 5,
            ..Self::new(data_dir)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = PipelineConfig::new("/tmp/planforge");
        assert!((config.router_threshold - 0.3).abs() < f32::EPSILON);
        assert_eq!(config.worker_threads, 4);
        assert_eq!(config.retry_max_attempts, 3);
        assert_eq!(config.classification_sample_chars, 4_000);
    }

    #[test]
    fn derived_paths_under_data_dir() {
        let config = PipelineConfig::new("/var/lib/planforge");
        assert_eq!(config.artifacts_dir(), PathBuf::from("/var/lib/planforge/artifacts"));
        assert_eq!(config.index_path(), PathBuf::from("/var/lib/planforge/index.json"));
    }

    #[test]
    fn ensure_dirs_creates_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::new(dir.path());
        config.ensure_dirs().unwrap();
        assert!(config.artifacts_dir().is_dir());
    }
}
