//! Structured field extraction, tiered by classification confidence.
//!
//! High-confidence documents get their type-specific strategy; mid-band
//! documents get a hybrid of the type-specific and generic strategies with
//! type-specific fields winning collisions; untrusted labels run generic
//! only. The provider models a strategy per document type, with the
//! `Unknown` type selecting its generic strategy.
//!
//! Extraction never fails a document: a provider error is caught and
//! recorded as a partial result with empty fields and a warning.

use std::collections::BTreeMap;

use chrono::Utc;
use tracing::{info, warn};

use crate::pipeline::classification::ExtractionTier;
use crate::pipeline::types::{ClassificationRecord, DocumentType, ExtractionRecord};
use crate::providers::{Extractor, ProviderError, RetryPolicy};

pub struct ContentExtractor {
    provider: Box<dyn Extractor>,
    retry: RetryPolicy,
}

impl ContentExtractor {
    pub fn new(provider: Box<dyn Extractor>, retry: RetryPolicy) -> Self {
        Self { provider, retry }
    }

    /// Extract structured fields from a document's markdown, applying the
    /// tier implied by the classification's confidence. Provider failures
    /// degrade to an empty field map plus a warning.
    pub fn extract(
        &self,
        markdown: &str,
        classification: &ClassificationRecord,
    ) -> ExtractionRecord {
        let tier = ExtractionTier::for_confidence(classification.confidence);
        let mut warnings = Vec::new();

        let (document_type, fields) = match (tier, classification.document_type) {
            // An unknown label always runs generic, whatever the confidence.
            (_, DocumentType::Unknown) | (ExtractionTier::Generic, _) => {
                warnings.push(format!(
                    "classification confidence {:.2} below trust threshold; generic extraction only",
                    classification.confidence
                ));
                let fields = self.call_or_empty(markdown, DocumentType::Unknown, &mut warnings);
                (DocumentType::Unknown, fields)
            }
            (ExtractionTier::TypeSpecific, ty) => {
                let fields = self.call_or_empty(markdown, ty, &mut warnings);
                (ty, fields)
            }
            (ExtractionTier::Hybrid, ty) => {
                let specific = self.call_or_empty(markdown, ty, &mut warnings);
                let generic = self.call_or_empty(markdown, DocumentType::Unknown, &mut warnings);
                warnings.push(format!(
                    "mid-band confidence {:.2}; hybrid extraction merged generic fields",
                    classification.confidence
                ));
                (ty, merge_fields(specific, generic))
            }
        };

        info!(
            fingerprint = %classification.fingerprint.short(),
            document_type = %document_type,
            field_count = fields.len(),
            warning_count = warnings.len(),
            "Extraction complete"
        );

        ExtractionRecord {
            fingerprint: classification.fingerprint.clone(),
            document_type,
            fields,
            warnings,
            extracted_at: Utc::now(),
        }
    }

    /// Run one strategy; on provider failure return an empty map and push
    /// the diagnostic.
    fn call_or_empty(
        &self,
        markdown: &str,
        document_type: DocumentType,
        warnings: &mut Vec<String>,
    ) -> BTreeMap<String, serde_json::Value> {
        match self.retry.run(|| self.provider.extract(markdown, document_type)) {
            Ok(fields) => fields,
            Err(e) => {
                warn!(
                    strategy = %document_type,
                    error = %e,
                    "Extraction strategy failed, recording partial result"
                );
                warnings.push(format!("{document_type} extraction failed: {e}"));
                BTreeMap::new()
            }
        }
    }
}

/// Union of both field maps; on key collision the type-specific value wins.
fn merge_fields(
    specific: BTreeMap<String, serde_json::Value>,
    generic: BTreeMap<String, serde_json::Value>,
) -> BTreeMap<String, serde_json::Value> {
    let mut merged = generic;
    merged.extend(specific);
    merged
}
