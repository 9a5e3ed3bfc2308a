//! Core types shared across the document intelligence pipeline.
//!
//! These types model the full lifecycle:
//! Files → Parsing → Conversion → Embedding → Classification → Extraction → Analysis.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::fingerprint::Fingerprint;

// ═══════════════════════════════════════════
// Document Type
// ═══════════════════════════════════════════

/// The project document types the pipeline understands.
///
/// The six concrete variants form the reference set used for gap and
/// coverage analysis; `Unknown` is assigned when classification confidence
/// is too low to trust a type-specific reading.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Specification,
    Requirements,
    TestPlan,
    ArchitectureDesign,
    ProjectTimeline,
    RiskRegister,
    Unknown,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Specification => "specification",
            Self::Requirements => "requirements",
            Self::TestPlan => "test_plan",
            Self::ArchitectureDesign => "architecture_design",
            Self::ProjectTimeline => "project_timeline",
            Self::RiskRegister => "risk_register",
            Self::Unknown => "unknown",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "specification" => Some(Self::Specification),
            "requirements" => Some(Self::Requirements),
            "test_plan" => Some(Self::TestPlan),
            "architecture_design" => Some(Self::ArchitectureDesign),
            "project_timeline" => Some(Self::ProjectTimeline),
            "risk_register" => Some(Self::RiskRegister),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    /// The reference set of typical project document types.
    /// Coverage is measured against this set; `Unknown` is not part of it.
    pub fn reference_set() -> &'static [DocumentType] {
        &[
            Self::Specification,
            Self::Requirements,
            Self::TestPlan,
            Self::ArchitectureDesign,
            Self::ProjectTimeline,
            Self::RiskRegister,
        ]
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ═══════════════════════════════════════════
// Classification & Extraction records (cached by fingerprint)
// ═══════════════════════════════════════════

/// Output of the document classifier, cached by fingerprint.
/// Immutable once written; a re-classification supersedes the cached
/// record only on explicit cache bypass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationRecord {
    pub fingerprint: Fingerprint,
    pub document_type: DocumentType,
    /// Classifier confidence, clamped to [0.0, 1.0].
    pub confidence: f32,
    pub classified_at: DateTime<Utc>,
}

/// Structured fields extracted from a document, cached by fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionRecord {
    pub fingerprint: Fingerprint,
    /// The type the extraction strategy was resolved against (post-tiering).
    pub document_type: DocumentType,
    pub fields: BTreeMap<String, serde_json::Value>,
    pub warnings: Vec<String>,
    pub extracted_at: DateTime<Utc>,
}

// ═══════════════════════════════════════════
// Batch state machine
// ═══════════════════════════════════════════

/// Stages of a batch, in strict processing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStage {
    Parsing,
    Converting,
    Embedding,
    Classifying,
    Extracting,
    Analyzing,
    Completed,
    Failed,
}

impl BatchStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parsing => "parsing",
            Self::Converting => "converting",
            Self::Embedding => "embedding",
            Self::Classifying => "classifying",
            Self::Extracting => "extracting",
            Self::Analyzing => "analyzing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Position in the stage ordering. Terminal states rank last so a
    /// status poller can assert monotonic, non-reverting progression.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Parsing => 0,
            Self::Converting => 1,
            Self::Embedding => 2,
            Self::Classifying => 3,
            Self::Extracting => 4,
            Self::Analyzing => 5,
            Self::Completed => 6,
            Self::Failed => 6,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for BatchStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single document's failure, recorded at the stage where it occurred.
/// Failures are data, not exceptions: the document is excluded from later
/// stages and the batch proceeds with the rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentFailure {
    pub source_path: PathBuf,
    pub stage: BatchStage,
    pub reason: String,
}

/// Read-only snapshot of a batch, safe to query at any time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchStatus {
    pub batch_id: Uuid,
    pub session_id: String,
    pub stage: BatchStage,
    pub documents_total: usize,
    /// Documents that have completed the current stage (success or failure).
    pub documents_processed: usize,
    pub document_errors: Vec<DocumentFailure>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ═══════════════════════════════════════════
// Analysis report
// ═══════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictSeverity {
    Low,
    Medium,
    High,
}

impl ConflictSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// The fixed conflict categories the analyzer detects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Two documents assert different values for the same technical attribute.
    TechnologyConflict,
    /// The same requirement appears with different priority labels.
    PriorityConflict,
}

impl ConflictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TechnologyConflict => "technology_conflict",
            Self::PriorityConflict => "priority_conflict",
        }
    }
}

/// A detected cross-document contradiction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    pub kind: ConflictKind,
    pub severity: ConflictSeverity,
    /// The contested attribute name or normalized requirement text.
    pub subject: String,
    /// Fingerprints of the documents involved, first-seen order.
    pub affected_docs: Vec<Fingerprint>,
    /// The contradicting values, aligned with `affected_docs`.
    pub values: Vec<String>,
}

/// Cross-document findings for one batch. Derived and recomputed per
/// batch, never cached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub present_types: BTreeSet<DocumentType>,
    /// Expected-but-absent types, in reference-set order.
    pub gaps: Vec<DocumentType>,
    pub conflicts: Vec<Conflict>,
    /// |present_types ∩ reference set| / |reference set|, clamped to [0, 1].
    pub coverage_score: f32,
    /// Mean classification confidence across surviving documents.
    pub confidence_score: f32,
}

// ═══════════════════════════════════════════
// Cache statistics
// ═══════════════════════════════════════════

/// Hit/miss counters per cache tier, reported in the planning context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub parse_hits: usize,
    pub parse_misses: usize,
    pub classification_hits: usize,
    pub classification_misses: usize,
    pub extraction_hits: usize,
    pub extraction_misses: usize,
    pub embedding_hits: usize,
    pub embedding_misses: usize,
}

impl CacheStats {
    pub fn total_hits(&self) -> usize {
        self.parse_hits + self.classification_hits + self.extraction_hits + self.embedding_hits
    }

    pub fn total_misses(&self) -> usize {
        self.parse_misses
            + self.classification_misses
            + self.extraction_misses
            + self.embedding_misses
    }
}

// ═══════════════════════════════════════════
// Planning context (handed to the plan-generation collaborator)
// ═══════════════════════════════════════════

/// The structured, de-duplicated planning context produced by a completed
/// batch. `session_collection` is an opaque handle for similarity queries,
/// not a raw connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanningContext {
    pub session_id: String,
    pub classifications: Vec<ClassificationRecord>,
    pub extractions: Vec<ExtractionRecord>,
    pub analysis: AnalysisReport,
    pub session_collection: String,
    pub cache_stats: CacheStats,
}
