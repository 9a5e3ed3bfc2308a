//! End-to-end pipeline behavior with mock providers: caching across
//! sessions, confidence tiering, partial failure, status monotonicity, and
//! cross-document analysis.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use planforge::config::PipelineConfig;
use planforge::pipeline::embedding::memory::InMemoryVectorStore;
use planforge::pipeline::orchestrator::PipelineOrchestrator;
use planforge::pipeline::types::{BatchStage, ConflictKind, ConflictSeverity, DocumentType};
use planforge::providers::{
    Classification, Classifier, EmbeddingProvider, Extractor, ProviderError,
};

// ──────────────────────────────────────────────
// Mock providers
// ──────────────────────────────────────────────

/// Maps content markers to (type, confidence). Unmarked text classifies
/// with untrustworthy confidence.
struct MarkerClassifier;

impl Classifier for MarkerClassifier {
    fn classify(&self, text: &str) -> Result<Classification, ProviderError> {
        let (document_type, confidence) = if text.contains("shall") {
            (DocumentType::Requirements, 0.9)
        } else if text.contains("test case") {
            (DocumentType::TestPlan, 0.85)
        } else if text.contains("component diagram") {
            (DocumentType::ArchitectureDesign, 0.9)
        } else if text.contains("milestone") {
            (DocumentType::ProjectTimeline, 0.88)
        } else if text.contains("mitigation") {
            (DocumentType::RiskRegister, 0.87)
        } else if text.contains("overview") {
            (DocumentType::Specification, 0.6)
        } else {
            (DocumentType::Specification, 0.3)
        };
        Ok(Classification {
            document_type,
            confidence,
        })
    }
}

/// Type-specific strategy emits a typed title plus any `key: value` line it
/// recognizes; the generic strategy emits a summary.
struct LineExtractor;

impl Extractor for LineExtractor {
    fn extract(
        &self,
        text: &str,
        document_type: DocumentType,
    ) -> Result<BTreeMap<String, serde_json::Value>, ProviderError> {
        let mut fields = BTreeMap::new();
        if document_type == DocumentType::Unknown {
            fields.insert("title".into(), serde_json::json!("untitled document"));
            fields.insert(
                "summary".into(),
                serde_json::json!(text.lines().next().unwrap_or("")),
            );
            return Ok(fields);
        }

        fields.insert(
            "title".into(),
            serde_json::json!(format!("{document_type} document")),
        );
        for line in text.lines() {
            if let Some(value) = line.strip_prefix("database: ") {
                fields.insert("database".into(), serde_json::json!(value.trim()));
            }
            if let Some(value) = line.strip_prefix("priority: ") {
                let (req, priority) = value.split_once(" -> ").unwrap_or((value, "must"));
                fields.insert(
                    "requirements".into(),
                    serde_json::json!([{"text": req.trim(), "priority": priority.trim()}]),
                );
            }
        }
        Ok(fields)
    }
}

struct CountingEmbedder(Arc<AtomicUsize>);

impl EmbeddingProvider for CountingEmbedder {
    fn embed(&self, chunks: &[&str]) -> Result<Vec<Vec<f32>>, ProviderError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(chunks.iter().map(|c| vec![c.len() as f32, 0.5]).collect())
    }
}

// ──────────────────────────────────────────────
// Harness
// ──────────────────────────────────────────────

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

fn orchestrator(data_dir: &Path, embed_calls: Arc<AtomicUsize>) -> PipelineOrchestrator {
    init_tracing();
    PipelineOrchestrator::new(
        PipelineConfig::for_tests(data_dir),
        Arc::new(InMemoryVectorStore::new()),
        Box::new(MarkerClassifier),
        Box::new(LineExtractor),
        Box::new(CountingEmbedder(embed_calls)),
    )
    .unwrap()
}

fn write_docs(dir: &Path, docs: &[(&str, &str)]) -> Vec<PathBuf> {
    docs.iter()
        .map(|(name, content)| {
            let path = dir.join(name);
            fs::write(&path, content).unwrap();
            path
        })
        .collect()
}

// ──────────────────────────────────────────────
// Caching across sessions
// ──────────────────────────────────────────────

#[test]
fn repeat_document_is_embedded_exactly_once_across_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let embed_calls = Arc::new(AtomicUsize::new(0));
    let orch = orchestrator(dir.path(), embed_calls.clone());
    let paths = write_docs(
        dir.path(),
        &[("req.md", "# Requirements\nThe system shall respond.")],
    );

    let first = orch.run_batch("alpha", paths.clone()).wait().unwrap();
    let second = orch.run_batch("beta", paths.clone()).wait().unwrap();
    let third = orch.run_batch("gamma", paths).wait().unwrap();

    assert_eq!(embed_calls.load(Ordering::SeqCst), 1);
    assert_eq!(first.cache_stats.embedding_misses, 1);
    assert_eq!(second.cache_stats.embedding_hits, 1);
    assert_eq!(third.cache_stats.embedding_hits, 1);

    // Every other tier is also warm on the repeat runs.
    assert_eq!(second.cache_stats.parse_hits, 1);
    assert_eq!(second.cache_stats.classification_hits, 1);
    assert_eq!(second.cache_stats.extraction_hits, 1);
    assert_eq!(second.cache_stats.total_misses(), 0);

    // Each session still gets its own collection handle.
    assert_eq!(first.session_collection, "session-alpha");
    assert_eq!(second.session_collection, "session-beta");
}

#[test]
fn cache_survives_orchestrator_restart_for_text_tiers() {
    let dir = tempfile::tempdir().unwrap();
    let paths = write_docs(
        dir.path(),
        &[("req.md", "# Requirements\nThe system shall respond.")],
    );

    {
        let orch = orchestrator(dir.path(), Arc::new(AtomicUsize::new(0)));
        orch.run_batch("alpha", paths.clone()).wait().unwrap();
    }

    // Fresh orchestrator, same data dir, fresh (empty) vector store.
    let embed_calls = Arc::new(AtomicUsize::new(0));
    let orch = orchestrator(dir.path(), embed_calls.clone());
    let context = orch.run_batch("beta", paths).wait().unwrap();

    assert_eq!(context.cache_stats.parse_hits, 1);
    assert_eq!(context.cache_stats.classification_hits, 1);
    assert_eq!(context.cache_stats.extraction_hits, 1);
    // The in-memory store lost the vectors, so this one is re-embedded.
    assert_eq!(embed_calls.load(Ordering::SeqCst), 1);
}

// ──────────────────────────────────────────────
// Confidence tiering
// ──────────────────────────────────────────────

#[test]
fn extraction_tier_follows_classification_confidence() {
    let dir = tempfile::tempdir().unwrap();
    let orch = orchestrator(dir.path(), Arc::new(AtomicUsize::new(0)));
    let paths = write_docs(
        dir.path(),
        &[
            // 0.9: type-specific only.
            ("high.md", "# Login\nThe system shall authenticate users."),
            // 0.6: hybrid merge, type-specific precedence.
            ("mid.md", "# Platform\nA broad overview of the system."),
            // 0.3: relabeled unknown, generic only.
            ("low.md", "# Notes\nassorted meeting scribbles"),
        ],
    );

    let context = orch.run_batch("s1", paths).wait().unwrap();
    // Records come back in batch input order.
    let by_index = |idx: usize| (&context.classifications[idx], &context.extractions[idx]);

    let (high_c, high_e) = by_index(0);
    assert_eq!(high_c.document_type, DocumentType::Requirements);
    assert_eq!(high_e.fields["title"], serde_json::json!("requirements document"));
    assert!(!high_e.fields.contains_key("summary"));

    let (mid_c, mid_e) = by_index(1);
    assert_eq!(mid_c.document_type, DocumentType::Specification);
    // Merged: type-specific title wins, generic summary survives.
    assert_eq!(mid_e.fields["title"], serde_json::json!("specification document"));
    assert!(mid_e.fields.contains_key("summary"));
    assert!(mid_e.warnings.iter().any(|w| w.contains("hybrid")));

    let (low_c, low_e) = by_index(2);
    assert_eq!(low_c.document_type, DocumentType::Unknown);
    assert_eq!(low_e.document_type, DocumentType::Unknown);
    assert_eq!(low_e.fields["title"], serde_json::json!("untitled document"));
}

// ──────────────────────────────────────────────
// Partial failure
// ──────────────────────────────────────────────

#[test]
fn four_of_five_documents_complete_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let orch = orchestrator(dir.path(), Arc::new(AtomicUsize::new(0)));
    let mut paths = write_docs(
        dir.path(),
        &[
            ("a.md", "# A\nThe system shall respond."),
            ("b.md", "# B\ntest case inventory"),
            ("c.md", "# C\ncomponent diagram and interfaces"),
            ("d.md", "# D\nmilestone schedule"),
        ],
    );
    paths.insert(2, dir.path().join("does-not-exist.md"));

    let handle = orch.run_batch("s1", paths);
    let monitor = handle.monitor();
    let context = handle.wait().unwrap();

    assert_eq!(context.classifications.len(), 4);
    let status = monitor.status();
    assert_eq!(status.stage, BatchStage::Completed);
    assert_eq!(status.document_errors.len(), 1);
    assert_eq!(status.document_errors[0].stage, BatchStage::Parsing);
    assert!(status.document_errors[0]
        .source_path
        .ends_with("does-not-exist.md"));
}

#[test]
fn batch_fails_only_when_nothing_survives_parsing() {
    let dir = tempfile::tempdir().unwrap();
    let orch = orchestrator(dir.path(), Arc::new(AtomicUsize::new(0)));

    let handle = orch.run_batch("s1", vec![dir.path().join("ghost.md")]);
    let monitor = handle.monitor();
    assert!(handle.wait().is_err());
    assert_eq!(monitor.status().stage, BatchStage::Failed);
}

// ──────────────────────────────────────────────
// Status coherence
// ──────────────────────────────────────────────

#[test]
fn polled_status_is_monotonic_and_never_completed_early() {
    let dir = tempfile::tempdir().unwrap();
    let orch = orchestrator(dir.path(), Arc::new(AtomicUsize::new(0)));
    let paths = write_docs(
        dir.path(),
        &[
            ("a.md", "# A\nThe system shall respond."),
            ("b.md", "# B\ntest case inventory"),
            ("c.md", "# C\nmitigation table"),
            ("d.md", "# D\nmilestone dates"),
        ],
    );

    let handle = orch.run_batch("s1", paths);
    let monitor = handle.monitor();
    let poller = std::thread::spawn(move || {
        let mut last = 0u8;
        loop {
            let status = monitor.status();
            assert!(status.stage.rank() >= last, "stage went backwards");
            assert!(status.documents_processed <= status.documents_total);
            last = status.stage.rank();
            if status.stage.is_terminal() {
                break;
            }
            std::thread::yield_now();
        }
    });

    let context = handle.wait().unwrap();
    poller.join().unwrap();
    assert_eq!(context.classifications.len(), 4);
}

// ──────────────────────────────────────────────
// Cross-document analysis
// ──────────────────────────────────────────────

#[test]
fn coverage_conflicts_and_determinism() {
    let docs: &[(&str, &str)] = &[
        (
            "req.md",
            "# Requirements\nThe system shall persist orders.\ndatabase: postgres\npriority: orders survive restart -> must",
        ),
        (
            "arch.md",
            "# Architecture\ncomponent diagram of services\ndatabase: mongodb",
        ),
        ("plan.md", "# Test Plan\ntest case listing"),
    ];

    let run = || {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(dir.path(), Arc::new(AtomicUsize::new(0)));
        let paths = write_docs(dir.path(), docs);
        orch.run_batch("s1", paths).wait().unwrap().analysis
    };

    let analysis = run();

    // Three of six reference types present.
    assert!((analysis.coverage_score - 0.5).abs() < 1e-6);
    assert_eq!(analysis.gaps.len(), 3);
    assert!(analysis.gaps.contains(&DocumentType::RiskRegister));

    // The database disagreement is a high-severity technology conflict.
    let conflict = analysis
        .conflicts
        .iter()
        .find(|c| c.kind == ConflictKind::TechnologyConflict)
        .expect("expected a technology conflict");
    assert_eq!(conflict.severity, ConflictSeverity::High);
    assert_eq!(conflict.subject, "database");
    assert_eq!(conflict.values, vec!["postgres", "mongodb"]);

    // Identical batch input yields an identical report.
    let again = run();
    assert_eq!(
        serde_json::to_string(&analysis).unwrap(),
        serde_json::to_string(&again).unwrap()
    );
}

// ──────────────────────────────────────────────
// Format edge cases
// ──────────────────────────────────────────────

#[test]
fn unsupported_documents_fail_without_sinking_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let orch = orchestrator(dir.path(), Arc::new(AtomicUsize::new(0)));
    let good = dir.path().join("good.md");
    fs::write(&good, "# Fine\nThe system shall work.").unwrap();
    let blob = dir.path().join("image.bin");
    fs::write(&blob, [0x00u8, 0xFF, 0xFE, 0x80, 0x81, 0x00]).unwrap();

    let handle = orch.run_batch("s1", vec![good, blob]);
    let monitor = handle.monitor();
    let context = handle.wait().unwrap();

    assert_eq!(context.classifications.len(), 1);
    let errors = monitor.status().document_errors;
    assert_eq!(errors.len(), 1);
    assert!(errors[0].reason.contains("unsupported"));
}
