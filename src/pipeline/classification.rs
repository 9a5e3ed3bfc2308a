//! Document classification and the confidence tiers that drive extraction.
//!
//! The classifier sees a bounded sample of the document's markdown and
//! returns a type with a confidence. Confidence decides how much the rest
//! of the pipeline trusts the label:
//!
//! - at or above [`TYPE_SPECIFIC_MIN`]: type-specific extraction only
//! - between [`HYBRID_MIN`] and [`TYPE_SPECIFIC_MIN`]: hybrid extraction,
//!   type-specific fields take precedence over generic ones
//! - below [`HYBRID_MIN`]: the label is relabeled `Unknown` and only the
//!   generic strategy runs

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info};

use crate::pipeline::fingerprint::Fingerprint;
use crate::pipeline::types::{ClassificationRecord, DocumentType};
use crate::providers::{Classifier, ProviderError, RetryPolicy};

/// Confidence at or above which the classified type is trusted outright.
pub const TYPE_SPECIFIC_MIN: f32 = 0.8;

/// Confidence at or above which the type is usable, hedged with the
/// generic strategy. Below this the label is discarded.
pub const HYBRID_MIN: f32 = 0.5;

#[derive(Error, Debug)]
pub enum ClassificationError {
    #[error("classification provider failed: {0}")]
    Provider(#[from] ProviderError),
}

/// How the extractor should treat a classified document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionTier {
    /// Run only the strategy for the classified type.
    TypeSpecific,
    /// Run both the type-specific and generic strategies and merge,
    /// type-specific fields winning collisions.
    Hybrid,
    /// Run only the generic strategy.
    Generic,
}

impl ExtractionTier {
    pub fn for_confidence(confidence: f32) -> Self {
        if confidence >= TYPE_SPECIFIC_MIN {
            Self::TypeSpecific
        } else if confidence >= HYBRID_MIN {
            Self::Hybrid
        } else {
            Self::Generic
        }
    }
}

pub struct DocumentClassifier {
    provider: Box<dyn Classifier>,
    retry: RetryPolicy,
    sample_chars: usize,
}

impl DocumentClassifier {
    pub fn new(provider: Box<dyn Classifier>, retry: RetryPolicy, sample_chars: usize) -> Self {
        Self {
            provider,
            retry,
            sample_chars,
        }
    }

    /// Classify a parsed document's markdown. Provider confidence is clamped
    /// to [0, 1]; below [`HYBRID_MIN`] the type is relabeled `Unknown` so no
    /// later stage acts on an untrusted label.
    pub fn classify(
        &self,
        fingerprint: &Fingerprint,
        markdown: &str,
    ) -> Result<ClassificationRecord, ClassificationError> {
        let sample = truncate_chars(markdown, self.sample_chars);
        let raw = self.retry.run(|| self.provider.classify(sample))?;

        let confidence = raw.confidence.clamp(0.0, 1.0);
        let document_type = if confidence < HYBRID_MIN {
            debug!(
                fingerprint = %fingerprint.short(),
                proposed = %raw.document_type,
                confidence,
                "Low-confidence classification relabeled as unknown"
            );
            DocumentType::Unknown
        } else {
            raw.document_type
        };

        info!(
            fingerprint = %fingerprint.short(),
            document_type = %document_type,
            confidence,
            "Document classified"
        );

        Ok(ClassificationRecord {
            fingerprint: fingerprint.clone(),
            document_type,
            confidence,
            classified_at: Utc::now(),
        })
    }
}

/// First `max` characters on a char boundary.
fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
