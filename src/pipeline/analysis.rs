//! Cross-document analysis: gaps, conflicts, and coverage.
//!
//! A pure function over the batch's classifications and extractions. Same
//! inputs in the same order always produce the same report, so the report
//! is recomputed per batch and never cached.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::pipeline::fingerprint::Fingerprint;
use crate::pipeline::types::{
    AnalysisReport, ClassificationRecord, Conflict, ConflictKind, ConflictSeverity, DocumentType,
    ExtractionRecord,
};

/// A technical attribute the conflict detector watches. Field keys matching
/// the pattern are compared across documents under the canonical subject.
struct TechRule {
    subject: &'static str,
    pattern: Regex,
}

fn tech_rules() -> &'static [TechRule] {
    static RULES: OnceLock<Vec<TechRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        [
            ("database", r"^(database|db|db_engine|datastore)$"),
            ("language", r"^(language|programming_language|implementation_language)$"),
            ("framework", r"^(framework|web_framework|ui_framework)$"),
            ("cloud_provider", r"^(cloud|cloud_provider|hosting)$"),
            ("message_queue", r"^(message_queue|queue|broker)$"),
        ]
        .into_iter()
        .map(|(subject, pattern)| TechRule {
            subject,
            pattern: Regex::new(pattern).unwrap(),
        })
        .collect()
    })
}

pub struct CrossDocumentAnalyzer;

impl CrossDocumentAnalyzer {
    /// Analyze one batch. `classifications` and `extractions` are the
    /// surviving documents in batch input order; that order fixes conflict
    /// ordering.
    pub fn analyze(
        classifications: &[ClassificationRecord],
        extractions: &[ExtractionRecord],
    ) -> AnalysisReport {
        let present_types: BTreeSet<DocumentType> = classifications
            .iter()
            .map(|c| c.document_type)
            .filter(|t| *t != DocumentType::Unknown)
            .collect();

        let gaps: Vec<DocumentType> = DocumentType::reference_set()
            .iter()
            .copied()
            .filter(|t| !present_types.contains(t))
            .collect();

        let mut conflicts = detect_technology_conflicts(extractions);
        conflicts.extend(detect_priority_conflicts(extractions));

        let reference_len = DocumentType::reference_set().len() as f32;
        let coverage_score = (present_types.len() as f32 / reference_len).clamp(0.0, 1.0);

        let confidence_score = if classifications.is_empty() {
            0.0
        } else {
            let sum: f32 = classifications.iter().map(|c| c.confidence).sum();
            (sum / classifications.len() as f32).clamp(0.0, 1.0)
        };

        debug!(
            present = present_types.len(),
            gaps = gaps.len(),
            conflicts = conflicts.len(),
            coverage_score,
            "Cross-document analysis complete"
        );

        AnalysisReport {
            present_types,
            gaps,
            conflicts,
            coverage_score,
            confidence_score,
        }
    }
}

/// One subject's observations in first-seen order.
struct Observations {
    subject: String,
    docs: Vec<Fingerprint>,
    values: Vec<String>,
}

fn detect_technology_conflicts(extractions: &[ExtractionRecord]) -> Vec<Conflict> {
    let mut observed: Vec<Observations> = Vec::new();

    for extraction in extractions {
        for (key, value) in &extraction.fields {
            let Some(rule) = tech_rules().iter().find(|r| r.pattern.is_match(key)) else {
                continue;
            };
            let Some(value) = scalar_string(value) else {
                continue;
            };
            record_observation(&mut observed, rule.subject, &extraction.fingerprint, value);
        }
    }

    observed
        .into_iter()
        .filter(|o| o.values.iter().collect::<BTreeSet<_>>().len() > 1)
        .map(|o| Conflict {
            kind: ConflictKind::TechnologyConflict,
            severity: ConflictSeverity::High,
            subject: o.subject,
            affected_docs: o.docs,
            values: o.values,
        })
        .collect()
}

fn detect_priority_conflicts(extractions: &[ExtractionRecord]) -> Vec<Conflict> {
    let mut observed: Vec<Observations> = Vec::new();

    for extraction in extractions {
        let Some(serde_json::Value::Array(requirements)) = extraction.fields.get("requirements")
        else {
            continue;
        };
        for requirement in requirements {
            let Some(obj) = requirement.as_object() else {
                continue;
            };
            let text = obj
                .get("text")
                .or_else(|| obj.get("requirement"))
                .or_else(|| obj.get("description"))
                .and_then(|v| v.as_str());
            let priority = obj.get("priority").and_then(|v| v.as_str());
            let (Some(text), Some(priority)) = (text, priority) else {
                continue;
            };
            let subject = normalize_text(text);
            record_observation(
                &mut observed,
                &subject,
                &extraction.fingerprint,
                priority.trim().to_lowercase(),
            );
        }
    }

    observed
        .into_iter()
        .filter(|o| o.values.iter().collect::<BTreeSet<_>>().len() > 1)
        .map(|o| Conflict {
            kind: ConflictKind::PriorityConflict,
            severity: ConflictSeverity::Medium,
            subject: o.subject,
            affected_docs: o.docs,
            values: o.values,
        })
        .collect()
}

fn record_observation(
    observed: &mut Vec<Observations>,
    subject: &str,
    fingerprint: &Fingerprint,
    value: String,
) {
    if let Some(entry) = observed.iter_mut().find(|o| o.subject == subject) {
        // One observation per document per subject; first wins.
        if !entry.docs.contains(fingerprint) {
            entry.docs.push(fingerprint.clone());
            entry.values.push(value);
        }
    } else {
        observed.push(Observations {
            subject: subject.to_string(),
            docs: vec![fingerprint.clone()],
            values: vec![value],
        });
    }
}

fn scalar_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.trim().to_lowercase()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Lowercase with collapsed whitespace, for requirement identity.
fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
