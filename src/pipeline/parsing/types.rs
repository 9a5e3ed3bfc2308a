//! Parser seam types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ParseError;
use crate::pipeline::fingerprint::Fingerprint;
use crate::pipeline::format::DocumentFormat;

/// Which parser produced a document's markdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParserKind {
    Fast,
    Comprehensive,
}

impl ParserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Comprehensive => "comprehensive",
        }
    }
}

impl std::fmt::Display for ParserKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A document parser backend. The built-in fast and comprehensive parsers
/// handle text formats; heavier backends (PDF renderers, OCR) slot in
/// behind the same trait.
pub trait DocumentParser: Send + Sync {
    fn kind(&self) -> ParserKind;

    /// Convert raw document bytes into markdown.
    fn parse(&self, bytes: &[u8], format: DocumentFormat) -> Result<String, ParseError>;
}

/// What the router produced for one document, before the markdown artifact
/// is written to disk.
#[derive(Debug, Clone)]
pub struct ParseOutcome {
    pub markdown: String,
    pub parser_used: ParserKind,
    /// Diagnostics for degraded output (e.g. last-resort fast parse of a
    /// structurally complex document). Not fatal.
    pub parse_errors: Vec<String>,
    pub complexity_score: f32,
}

/// A parsed document with its on-disk markdown artifact. Immutable once
/// written; its lifetime is the artifact's, not any session's.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedDocument {
    pub fingerprint: Fingerprint,
    pub source_path: PathBuf,
    pub markdown_path: PathBuf,
    pub parser_used: ParserKind,
    pub parse_errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parser_kind_display() {
        assert_eq!(ParserKind::Fast.to_string(), "fast");
        assert_eq!(ParserKind::Comprehensive.to_string(), "comprehensive");
    }

    #[test]
    fn parser_kind_serde() {
        let json = serde_json::to_string(&ParserKind::Comprehensive).unwrap();
        assert_eq!(json, "\"comprehensive\"");
    }
}
