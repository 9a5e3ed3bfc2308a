//! Batch orchestration: the stage machine that drives documents from raw
//! files to a planning context.
//!
//! Stages run strictly in order; inside a stage, documents fan out across a
//! bounded worker pool and rejoin at a barrier before the next stage. A
//! document that fails a stage is recorded and excluded from later stages;
//! the batch itself fails only when nothing survives parsing. Status
//! snapshots are coherent at all times and never show a terminal stage
//! before the result exists.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::pipeline::analysis::CrossDocumentAnalyzer;
use crate::pipeline::cache::{CacheError, MultiTierCache};
use crate::pipeline::classification::DocumentClassifier;
use crate::pipeline::embedding::manager::{EmbedDisposition, VectorStoreManager};
use crate::pipeline::embedding::VectorStore;
use crate::pipeline::extraction::ContentExtractor;
use crate::pipeline::fingerprint::Fingerprint;
use crate::pipeline::format::{detect_format, DocumentFormat};
use crate::pipeline::parsing::router::ParserRouter;
use crate::pipeline::parsing::types::{ParsedDocument, ParserKind};
use crate::pipeline::types::{
    BatchStage, BatchStatus, CacheStats, ClassificationRecord, DocumentFailure, ExtractionRecord,
    PlanningContext,
};
use crate::providers::{Classifier, EmbeddingProvider, Extractor, RetryPolicy};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("no documents survived parsing ({} failures)", .failures.len())]
    AllDocumentsFailed { failures: Vec<DocumentFailure> },

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("batch worker panicked")]
    WorkerPanicked,
}

// ═══════════════════════════════════════════
// Batch state shared between runner and callers
// ═══════════════════════════════════════════

struct BatchState {
    status: Mutex<BatchStatus>,
    cancel: AtomicBool,
}

impl BatchState {
    fn new(batch_id: Uuid, session_id: &str, documents_total: usize) -> Self {
        let now = Utc::now();
        Self {
            status: Mutex::new(BatchStatus {
                batch_id,
                session_id: session_id.to_string(),
                stage: BatchStage::Parsing,
                documents_total,
                documents_processed: 0,
                document_errors: Vec::new(),
                started_at: now,
                updated_at: now,
            }),
            cancel: AtomicBool::new(false),
        }
    }

    fn with_status<T>(&self, f: impl FnOnce(&mut BatchStatus) -> T) -> T {
        let mut guard = match self.status.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let out = f(&mut guard);
        guard.updated_at = Utc::now();
        out
    }

    fn snapshot(&self) -> BatchStatus {
        self.with_status(|s| s.clone())
    }

    fn enter_stage(&self, stage: BatchStage) {
        self.with_status(|s| {
            s.stage = stage;
            s.documents_processed = 0;
        });
    }

    fn bump_processed(&self) {
        self.with_status(|s| s.documents_processed += 1);
    }

    fn push_failure(&self, failure: DocumentFailure) {
        self.with_status(|s| s.document_errors.push(failure));
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

/// Cloneable view of a running batch, for polling and cancellation from
/// other threads.
#[derive(Clone)]
pub struct BatchMonitor {
    state: Arc<BatchState>,
}

impl BatchMonitor {
    pub fn status(&self) -> BatchStatus {
        self.state.snapshot()
    }

    pub fn cancel(&self) {
        self.state.cancel.store(true, Ordering::SeqCst);
    }
}

/// Owner's handle to a running batch.
pub struct BatchHandle {
    state: Arc<BatchState>,
    join: JoinHandle<Result<PlanningContext, PipelineError>>,
}

impl BatchHandle {
    pub fn status(&self) -> BatchStatus {
        self.state.snapshot()
    }

    pub fn monitor(&self) -> BatchMonitor {
        BatchMonitor {
            state: self.state.clone(),
        }
    }

    pub fn cancel(&self) {
        self.state.cancel.store(true, Ordering::SeqCst);
    }

    /// Block until the batch reaches a terminal stage.
    pub fn wait(self) -> Result<PlanningContext, PipelineError> {
        self.join.join().map_err(|_| PipelineError::WorkerPanicked)?
    }
}

// ═══════════════════════════════════════════
// Orchestrator
// ═══════════════════════════════════════════

struct Inner {
    config: PipelineConfig,
    cache: Arc<MultiTierCache>,
    router: ParserRouter,
    classifier: DocumentClassifier,
    extractor: ContentExtractor,
    vectors: VectorStoreManager,
}

pub struct PipelineOrchestrator {
    inner: Arc<Inner>,
}

impl PipelineOrchestrator {
    pub fn new(
        config: PipelineConfig,
        store: Arc<dyn VectorStore>,
        classifier: Box<dyn Classifier>,
        extractor: Box<dyn Extractor>,
        embedder: Box<dyn EmbeddingProvider>,
    ) -> Result<Self, PipelineError> {
        config.ensure_dirs()?;
        let cache = Arc::new(MultiTierCache::open(config.index_path()));
        let retry = RetryPolicy::new(
            config.retry_max_attempts,
            std::time::Duration::from_millis(config.retry_base_delay_ms),
            std::time::Duration::from_millis(config.retry_max_delay_ms),
        );
        Ok(Self {
            inner: Arc::new(Inner {
                router: ParserRouter::new(config.router_threshold),
                classifier: DocumentClassifier::new(
                    classifier,
                    retry,
                    config.classification_sample_chars,
                ),
                extractor: ContentExtractor::new(extractor, retry),
                vectors: VectorStoreManager::new(store, embedder, retry, cache.clone()),
                cache,
                config,
            }),
        })
    }

    /// Start a batch in a background thread and return its handle.
    pub fn run_batch(&self, session_id: &str, paths: Vec<PathBuf>) -> BatchHandle {
        let batch_id = Uuid::new_v4();
        let state = Arc::new(BatchState::new(batch_id, session_id, paths.len()));
        let inner = self.inner.clone();
        let runner_state = state.clone();
        let session = session_id.to_string();

        info!(%batch_id, session_id = %session, documents = paths.len(), "Batch started");

        let join = std::thread::spawn(move || {
            let runner = BatchRunner {
                inner,
                state: runner_state,
                session,
                stats: Mutex::new(CacheStats::default()),
            };
            runner.run(paths)
        });

        BatchHandle { state, join }
    }
}

// ═══════════════════════════════════════════
// Per-batch runner
// ═══════════════════════════════════════════

/// One parsed document travelling through the stages.
struct Doc {
    source_path: PathBuf,
    fingerprint: Fingerprint,
    markdown: String,
    parser_used: ParserKind,
    parse_errors: Vec<String>,
    /// Parse came from cache; the artifact already exists on disk.
    from_cache: bool,
}

struct BatchRunner {
    inner: Arc<Inner>,
    state: Arc<BatchState>,
    session: String,
    stats: Mutex<CacheStats>,
}

impl BatchRunner {
    fn run(&self, paths: Vec<PathBuf>) -> Result<PlanningContext, PipelineError> {
        let docs = self.stage_parsing(paths);
        if docs.is_empty() {
            self.state.enter_stage(BatchStage::Failed);
            warn!(session_id = %self.session, "No documents survived parsing, batch failed");
            return Err(PipelineError::AllDocumentsFailed {
                failures: self.state.snapshot().document_errors,
            });
        }

        let docs = self.stage_converting(docs);
        let docs = self.stage_embedding(docs);
        let classified = self.stage_classifying(docs);
        let extracted = self.stage_extracting(classified);

        self.state.enter_stage(BatchStage::Analyzing);
        let classifications: Vec<ClassificationRecord> =
            extracted.iter().map(|(_, c, _)| c.clone()).collect();
        let extractions: Vec<ExtractionRecord> =
            extracted.iter().map(|(_, _, e)| e.clone()).collect();
        let analysis = CrossDocumentAnalyzer::analyze(&classifications, &extractions);

        if self.state.is_cancelled() {
            if let Err(e) = self.inner.vectors.teardown_session(&self.session) {
                warn!(session_id = %self.session, error = %e, "Session teardown after cancel failed");
            }
        }

        let stats = match self.stats.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        let context = PlanningContext {
            session_id: self.session.clone(),
            classifications,
            extractions,
            analysis,
            session_collection: VectorStoreManager::session_collection(&self.session),
            cache_stats: stats,
        };

        // Terminal stage is entered only once the result is fully built, so
        // a poller can never observe Completed early.
        self.state.enter_stage(BatchStage::Completed);
        info!(
            session_id = %self.session,
            documents = context.classifications.len(),
            conflicts = context.analysis.conflicts.len(),
            "Batch completed"
        );
        Ok(context)
    }

    // ──────────────────────────────────────────────
    // Stages
    // ──────────────────────────────────────────────

    fn stage_parsing(&self, paths: Vec<PathBuf>) -> Vec<Doc> {
        self.state.enter_stage(BatchStage::Parsing);
        let results = self.fan_out(&paths, |path| self.parse_one(path));
        self.keep_survivors(BatchStage::Parsing, paths, results, |p| p.clone())
    }

    fn parse_one(&self, path: &PathBuf) -> Result<Doc, String> {
        let detection = detect_format(path).map_err(|e| format!("read failed: {e}"))?;
        let bytes = std::fs::read(path).map_err(|e| format!("read failed: {e}"))?;
        let fingerprint = Fingerprint::of_bytes(&bytes);
        if detection.format == DocumentFormat::Unsupported {
            return Err(format!("unsupported format: {}", detection.mime_type));
        }

        if let Some(cached) = self.inner.cache.get_parse(&fingerprint) {
            let markdown = std::fs::read_to_string(&cached.markdown_path)
                .map_err(|e| format!("cached artifact unreadable: {e}"))?;
            self.count(|s| s.parse_hits += 1);
            return Ok(Doc {
                source_path: path.clone(),
                fingerprint,
                markdown,
                parser_used: cached.parser_used,
                parse_errors: cached.parse_errors,
                from_cache: true,
            });
        }
        self.count(|s| s.parse_misses += 1);

        let outcome = self
            .inner
            .router
            .parse(&bytes, detection.format)
            .map_err(|e| e.to_string())?;
        Ok(Doc {
            source_path: path.clone(),
            fingerprint,
            markdown: outcome.markdown,
            parser_used: outcome.parser_used,
            parse_errors: outcome.parse_errors,
            from_cache: false,
        })
    }

    /// Write markdown artifacts and fill the parse cache for fresh parses.
    /// Cache writes are non-fatal, so every document survives this stage.
    fn stage_converting(&self, docs: Vec<Doc>) -> Vec<Doc> {
        self.state.enter_stage(BatchStage::Converting);
        for doc in &docs {
            if !doc.from_cache && !self.state.is_cancelled() {
                self.persist_parse(doc);
            }
            self.state.bump_processed();
        }
        docs
    }

    /// A failed artifact write only costs the warm-cache entry; the
    /// document itself continues with its in-memory markdown.
    fn persist_parse(&self, doc: &Doc) {
        let artifact = self
            .inner
            .config
            .artifacts_dir()
            .join(format!("{}.md", doc.fingerprint.short()));
        let stored = std::fs::write(&artifact, &doc.markdown)
            .map_err(CacheError::from)
            .and_then(|()| {
                self.inner.cache.put_parse(ParsedDocument {
                    fingerprint: doc.fingerprint.clone(),
                    source_path: doc.source_path.clone(),
                    markdown_path: artifact,
                    parser_used: doc.parser_used,
                    parse_errors: doc.parse_errors.clone(),
                })
            });
        if let Err(e) = stored {
            warn!(fingerprint = %doc.fingerprint.short(), error = %e, "Parse cache write failed");
        }
    }

    /// Embedding failures are flagged, not fatal to the document: its
    /// classification and extraction still have value without vectors.
    fn stage_embedding(&self, docs: Vec<Doc>) -> Vec<Doc> {
        self.state.enter_stage(BatchStage::Embedding);
        let results = self.fan_out(&docs, |doc| {
            self.inner
                .vectors
                .ensure_embedded(&doc.fingerprint, &doc.markdown, &self.session)
                .map_err(|e| e.to_string())
        });

        for (doc, result) in docs.iter().zip(results) {
            match result {
                Ok(EmbedDisposition::Reused) => self.count(|s| s.embedding_hits += 1),
                Ok(EmbedDisposition::Embedded) => self.count(|s| s.embedding_misses += 1),
                Err(reason) => self.state.push_failure(DocumentFailure {
                    source_path: doc.source_path.clone(),
                    stage: BatchStage::Embedding,
                    reason,
                }),
            }
        }
        docs
    }

    fn stage_classifying(&self, docs: Vec<Doc>) -> Vec<(Doc, ClassificationRecord)> {
        self.state.enter_stage(BatchStage::Classifying);
        let results = self.fan_out(&docs, |doc| {
            if let Some(record) = self.inner.cache.get_classification(&doc.fingerprint) {
                self.count(|s| s.classification_hits += 1);
                return Ok(record);
            }
            self.count(|s| s.classification_misses += 1);
            let record = self
                .inner
                .classifier
                .classify(&doc.fingerprint, &doc.markdown)
                .map_err(|e| e.to_string())?;
            if let Err(e) = self.inner.cache.put_classification(record.clone()) {
                warn!(fingerprint = %doc.fingerprint.short(), error = %e, "Classification cache write failed");
            }
            Ok(record)
        });

        let mut survivors = Vec::new();
        for (doc, result) in docs.into_iter().zip(results) {
            match result {
                Ok(record) => survivors.push((doc, record)),
                Err(reason) => self.state.push_failure(DocumentFailure {
                    source_path: doc.source_path,
                    stage: BatchStage::Classifying,
                    reason,
                }),
            }
        }
        survivors
    }

    fn stage_extracting(
        &self,
        docs: Vec<(Doc, ClassificationRecord)>,
    ) -> Vec<(Doc, ClassificationRecord, ExtractionRecord)> {
        self.state.enter_stage(BatchStage::Extracting);
        let results = self.fan_out(&docs, |(doc, classification)| {
            if let Some(record) = self.inner.cache.get_extraction(&doc.fingerprint) {
                self.count(|s| s.extraction_hits += 1);
                return Ok(record);
            }
            self.count(|s| s.extraction_misses += 1);
            // Provider failures are already folded into the record as
            // warnings; only a cache write can go wrong, and that is not
            // worth dropping the document over.
            let record = self.inner.extractor.extract(&doc.markdown, classification);
            if let Err(e) = self.inner.cache.put_extraction(record.clone()) {
                warn!(fingerprint = %doc.fingerprint.short(), error = %e, "Extraction cache write failed");
            }
            Ok(record)
        });

        let mut survivors = Vec::new();
        for ((doc, classification), result) in docs.into_iter().zip(results) {
            match result {
                Ok(record) => survivors.push((doc, classification, record)),
                Err(reason) => self.state.push_failure(DocumentFailure {
                    source_path: doc.source_path,
                    stage: BatchStage::Extracting,
                    reason,
                }),
            }
        }
        survivors
    }

    // ──────────────────────────────────────────────
    // Fan-out machinery
    // ──────────────────────────────────────────────

    /// Run `work` over `inputs` on a bounded pool, preserving input order
    /// in the results. Cancellation short-circuits not-yet-started items.
    fn fan_out<I, O>(
        &self,
        inputs: &[I],
        work: impl Fn(&I) -> Result<O, String> + Sync,
    ) -> Vec<Result<O, String>>
    where
        I: Sync,
        O: Send,
    {
        let next = AtomicUsize::new(0);
        let slots: Vec<Mutex<Option<Result<O, String>>>> =
            (0..inputs.len()).map(|_| Mutex::new(None)).collect();
        let workers = self.inner.config.worker_threads.max(1).min(inputs.len().max(1));

        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    let i = next.fetch_add(1, Ordering::SeqCst);
                    if i >= inputs.len() {
                        break;
                    }
                    let result = if self.state.is_cancelled() {
                        Err("cancelled".to_string())
                    } else {
                        work(&inputs[i])
                    };
                    let mut slot = match slots[i].lock() {
                        Ok(guard) => guard,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    *slot = Some(result);
                    drop(slot);
                    self.state.bump_processed();
                });
            }
        });

        slots
            .into_iter()
            .map(|slot| {
                match slot.into_inner() {
                    Ok(inner) => inner,
                    Err(poisoned) => poisoned.into_inner(),
                }
                .unwrap_or_else(|| Err("worker produced no result".to_string()))
            })
            .collect()
    }

    fn keep_survivors<I, O>(
        &self,
        stage: BatchStage,
        inputs: Vec<I>,
        results: Vec<Result<O, String>>,
        path_of: impl Fn(&I) -> PathBuf,
    ) -> Vec<O> {
        let mut survivors = Vec::new();
        for (input, result) in inputs.iter().zip(results) {
            match result {
                Ok(out) => survivors.push(out),
                Err(reason) => self.state.push_failure(DocumentFailure {
                    source_path: path_of(input),
                    stage,
                    reason,
                }),
            }
        }
        survivors
    }

    fn count(&self, f: impl FnOnce(&mut CacheStats)) {
        let mut guard = match self.stats.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard);
    }
}
