//! The fast parser: a cheap line-oriented pass for text formats.
//!
//! Good enough for prose-dominated documents. It preserves markdown as-is,
//! normalizes line endings, and strips control characters, but makes no
//! attempt to recover structure from tables or embedded markup.

use super::types::{DocumentParser, ParserKind};
use super::ParseError;
use crate::pipeline::format::DocumentFormat;

pub struct FastParser;

impl DocumentParser for FastParser {
    fn kind(&self) -> ParserKind {
        ParserKind::Fast
    }

    fn parse(&self, bytes: &[u8], format: DocumentFormat) -> Result<String, ParseError> {
        match format {
            DocumentFormat::Markdown | DocumentFormat::PlainText | DocumentFormat::Html => {}
            other => return Err(ParseError::UnsupportedFormat(other.to_string())),
        }

        let text = std::str::from_utf8(bytes)
            .map_err(|e| ParseError::Encoding(e.to_string()))?;

        let cleaned = sanitize(text);
        if cleaned.trim().is_empty() {
            return Err(ParseError::EmptyOutput);
        }
        Ok(cleaned)
    }
}

/// Normalize line endings and drop control characters (except newline/tab).
fn sanitize(text: &str) -> String {
    text.replace("\r\n", "\n")
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}
