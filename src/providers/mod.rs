//! External provider seams: classification, extraction, and embedding.
//!
//! Any text-understanding or embedding backend satisfying these traits is
//! substitutable. Providers can be stacked in a ranked chain that tries
//! each in order and stops at the first success.

use std::collections::BTreeMap;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;

use crate::pipeline::types::DocumentType;

#[derive(Error, Debug)]
pub enum ProviderError {
    /// The call exceeded its bounded timeout. Treated like any other
    /// transient error: retry, then fail the document.
    #[error("provider call timed out: {0}")]
    Timeout(String),

    #[error("provider rate limited: {0}")]
    RateLimited(String),

    #[error("provider backend error: {0}")]
    Backend(String),

    #[error("provider returned an unusable response: {0}")]
    InvalidResponse(String),

    #[error("all providers in chain failed, last error: {0}")]
    ChainExhausted(String),
}

impl ProviderError {
    /// Transient errors are worth retrying; structural ones are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::RateLimited(_) | Self::Backend(_))
    }
}

/// Classification result from a text-understanding backend.
#[derive(Debug, Clone)]
pub struct Classification {
    pub document_type: DocumentType,
    pub confidence: f32,
}

/// `Classify(text) -> (type, confidence)`.
pub trait Classifier: Send + Sync {
    fn classify(&self, text: &str) -> Result<Classification, ProviderError>;
}

/// `Extract(text, type) -> fields`. The `Unknown` type selects the
/// provider's generic extraction strategy.
pub trait Extractor: Send + Sync {
    fn extract(
        &self,
        text: &str,
        document_type: DocumentType,
    ) -> Result<BTreeMap<String, serde_json::Value>, ProviderError>;
}

/// `Embed([]chunk) -> [][]float`. Must return one vector per input chunk.
pub trait EmbeddingProvider: Send + Sync {
    fn embed(&self, chunks: &[&str]) -> Result<Vec<Vec<f32>>, ProviderError>;
}

// ──────────────────────────────────────────────
// Ranked fallback chains
// ──────────────────────────────────────────────

fn chain_try<T>(
    label: &str,
    count: usize,
    mut call: impl FnMut(usize) -> Result<T, ProviderError>,
) -> Result<T, ProviderError> {
    let mut last: Option<ProviderError> = None;
    for i in 0..count {
        match call(i) {
            Ok(value) => return Ok(value),
            Err(e) => {
                tracing::warn!(provider = label, rank = i, error = %e, "Provider failed, trying next in chain");
                last = Some(e);
            }
        }
    }
    Err(ProviderError::ChainExhausted(
        last.map(|e| e.to_string()).unwrap_or_else(|| "empty chain".into()),
    ))
}

/// Ranked list of classifiers; first success wins.
pub struct ClassifierChain {
    providers: Vec<Box<dyn Classifier>>,
}

impl ClassifierChain {
    pub fn new(providers: Vec<Box<dyn Classifier>>) -> Self {
        Self { providers }
    }
}

impl Classifier for ClassifierChain {
    fn classify(&self, text: &str) -> Result<Classification, ProviderError> {
        chain_try("classifier", self.providers.len(), |i| {
            self.providers[i].classify(text)
        })
    }
}

/// Ranked list of extractors; first success wins.
pub struct ExtractorChain {
    providers: Vec<Box<dyn Extractor>>,
}

impl ExtractorChain {
    pub fn new(providers: Vec<Box<dyn Extractor>>) -> Self {
        Self { providers }
    }
}

impl Extractor for ExtractorChain {
    fn extract(
        &self,
        text: &str,
        document_type: DocumentType,
    ) -> Result<BTreeMap<String, serde_json::Value>, ProviderError> {
        chain_try("extractor", self.providers.len(), |i| {
            self.providers[i].extract(text, document_type)
        })
    }
}

/// Ranked list of embedding providers; first success wins.
pub struct EmbedderChain {
    providers: Vec<Box<dyn EmbeddingProvider>>,
}

impl EmbedderChain {
    pub fn new(providers: Vec<Box<dyn EmbeddingProvider>>) -> Self {
        Self { providers }
    }
}

impl EmbeddingProvider for EmbedderChain {
    fn embed(&self, chunks: &[&str]) -> Result<Vec<Vec<f32>>, ProviderError> {
        chain_try("embedder", self.providers.len(), |i| {
            self.providers[i].embed(chunks)
        })
    }
}

// ──────────────────────────────────────────────
// Retry with bounded exponential backoff
// ──────────────────────────────────────────────

/// Bounded exponential backoff with jitter for transient provider errors.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Single attempt, no sleeping. Useful in tests.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Run `op` until it succeeds, returns a non-transient error, or the
    /// attempt budget is exhausted.
    pub fn run<T>(
        &self,
        mut op: impl FnMut() -> Result<T, ProviderError>,
    ) -> Result<T, ProviderError> {
        let mut attempt = 0u32;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt + 1 < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    tracing::debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient provider error, backing off"
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay);
        if exp.is_zero() {
            return exp;
        }
        // Jitter: 50-100% of the exponential delay.
        let millis = exp.as_millis() as u64;
        let jittered = rand::thread_rng().gen_range(millis / 2..=millis);
        Duration::from_millis(jittered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingClassifier;
    impl Classifier for FailingClassifier {
        fn classify(&self, _text: &str) -> Result<Classification, ProviderError> {
            Err(ProviderError::Backend("down".into()))
        }
    }

    struct FixedClassifier(DocumentType, f32);
    impl Classifier for FixedClassifier {
        fn classify(&self, _text: &str) -> Result<Classification, ProviderError> {
            Ok(Classification {
                document_type: self.0,
                confidence: self.1,
            })
        }
    }

    #[test]
    fn chain_falls_through_to_second_provider() {
        let chain = ClassifierChain::new(vec![
            Box::new(FailingClassifier),
            Box::new(FixedClassifier(DocumentType::TestPlan, 0.9)),
        ]);
        let result = chain.classify("test plan for release 2").unwrap();
        assert_eq!(result.document_type, DocumentType::TestPlan);
    }

    #[test]
    fn chain_stops_at_first_success() {
        let chain = ClassifierChain::new(vec![
            Box::new(FixedClassifier(DocumentType::Requirements, 0.8)),
            Box::new(FixedClassifier(DocumentType::TestPlan, 0.9)),
        ]);
        let result = chain.classify("the system shall").unwrap();
        assert_eq!(result.document_type, DocumentType::Requirements);
    }

    #[test]
    fn exhausted_chain_reports_last_error() {
        let chain = ClassifierChain::new(vec![Box::new(FailingClassifier)]);
        let err = chain.classify("anything").unwrap_err();
        assert!(matches!(err, ProviderError::ChainExhausted(_)));
        assert!(err.to_string().contains("down"));
    }

    #[test]
    fn empty_chain_is_exhausted() {
        let chain = ClassifierChain::new(vec![]);
        assert!(matches!(
            chain.classify("x"),
            Err(ProviderError::ChainExhausted(_))
        ));
    }

    #[test]
    fn retry_retries_transient_until_success() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2));
        let result: Result<u32, _> = policy.run(|| {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ProviderError::Timeout("slow".into()))
            } else {
                Ok(42)
            }
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn retry_gives_up_after_max_attempts() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2));
        let result: Result<(), _> = policy.run(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ProviderError::RateLimited("429".into()))
        });
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn retry_does_not_retry_structural_errors() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2));
        let result: Result<(), _> = policy.run(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ProviderError::InvalidResponse("not json".into()))
        });
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn timeout_is_transient() {
        assert!(ProviderError::Timeout("t".into()).is_transient());
        assert!(ProviderError::RateLimited("r".into()).is_transient());
        assert!(!ProviderError::InvalidResponse("i".into()).is_transient());
    }
}
