//! Routes each document to the cheapest parser its structure allows, and
//! falls back to the other parser when the first choice fails.

use tracing::{debug, warn};

use super::complexity::ComplexitySignals;
use super::comprehensive::ComprehensiveParser;
use super::fast::FastParser;
use super::types::{DocumentParser, ParseOutcome, ParserKind};
use super::ParseError;
use crate::pipeline::format::DocumentFormat;

pub struct ParserRouter {
    fast: Box<dyn DocumentParser>,
    comprehensive: Box<dyn DocumentParser>,
    /// Complexity score at or above which the comprehensive parser is
    /// preferred.
    threshold: f32,
}

impl ParserRouter {
    pub fn new(threshold: f32) -> Self {
        Self {
            fast: Box::new(FastParser),
            comprehensive: Box::new(ComprehensiveParser),
            threshold,
        }
    }

    /// Swap in custom parser backends (test seam, or heavier format support).
    pub fn with_parsers(
        fast: Box<dyn DocumentParser>,
        comprehensive: Box<dyn DocumentParser>,
        threshold: f32,
    ) -> Self {
        Self {
            fast,
            comprehensive,
            threshold,
        }
    }

    /// Parse a document. The preferred parser is chosen from the complexity
    /// score; on failure the other parser is tried, and a degraded fallback
    /// is recorded in `parse_errors` rather than failing the document.
    pub fn parse(&self, bytes: &[u8], format: DocumentFormat) -> Result<ParseOutcome, ParseError> {
        let preview = String::from_utf8_lossy(bytes);
        let score = ComplexitySignals::scan(&preview).score();

        let (first, second) = if score < self.threshold {
            (&self.fast, &self.comprehensive)
        } else {
            (&self.comprehensive, &self.fast)
        };

        debug!(
            score,
            threshold = self.threshold,
            preferred = %first.kind(),
            "routing document"
        );

        let first_err = match first.parse(bytes, format) {
            Ok(markdown) => {
                return Ok(ParseOutcome {
                    markdown,
                    parser_used: first.kind(),
                    parse_errors: Vec::new(),
                    complexity_score: score,
                })
            }
            Err(e) => e,
        };

        warn!(
            parser = %first.kind(),
            error = %first_err,
            "preferred parser failed, falling back"
        );

        match second.parse(bytes, format) {
            Ok(markdown) => {
                let mut parse_errors = vec![format!(
                    "{} parser failed ({first_err}); fell back to {}",
                    first.kind(),
                    second.kind()
                )];
                // Falling back DOWN to the fast parser on a complex document
                // loses structure; flag the degradation.
                if second.kind() == ParserKind::Fast && score >= self.threshold {
                    parse_errors.push(format!(
                        "structure may be degraded: complexity {score:.2} parsed without structure recovery"
                    ));
                }
                Ok(ParseOutcome {
                    markdown,
                    parser_used: second.kind(),
                    parse_errors,
                    complexity_score: score,
                })
            }
            Err(second_err) => {
                let (fast_err, comprehensive_err) = match first.kind() {
                    ParserKind::Fast => (first_err, second_err),
                    ParserKind::Comprehensive => (second_err, first_err),
                };
                Err(ParseError::BothParsersFailed {
                    fast: fast_err.to_string(),
                    comprehensive: comprehensive_err.to_string(),
                })
            }
        }
    }
}
