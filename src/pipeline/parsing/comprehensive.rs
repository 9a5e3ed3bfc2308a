//! The comprehensive parser: a structure-aware pass for documents the fast
//! parser would flatten.
//!
//! Recovers headings from underline and HTML markup, squares off pipe and
//! tab-separated tables, annotates embedded images, and marks page breaks.
//! Costs more than the fast pass; the router only sends documents here when
//! their complexity score warrants it.

use super::types::{DocumentParser, ParserKind};
use super::ParseError;
use crate::pipeline::format::DocumentFormat;

pub struct ComprehensiveParser;

impl DocumentParser for ComprehensiveParser {
    fn kind(&self) -> ParserKind {
        ParserKind::Comprehensive
    }

    fn parse(&self, bytes: &[u8], format: DocumentFormat) -> Result<String, ParseError> {
        match format {
            DocumentFormat::Markdown | DocumentFormat::PlainText | DocumentFormat::Html => {}
            other => return Err(ParseError::UnsupportedFormat(other.to_string())),
        }

        let text = String::from_utf8_lossy(bytes);
        let normalized = text.replace("\r\n", "\n");

        let mut out = String::with_capacity(normalized.len());
        let lines: Vec<&str> = normalized.lines().collect();
        let mut i = 0;

        while i < lines.len() {
            let line = lines[i];

            // Setext headings: a line underlined with === or ---.
            if i + 1 < lines.len() && !line.trim().is_empty() {
                let under = lines[i + 1].trim();
                if under.len() >= 3 && under.chars().all(|c| c == '=') {
                    out.push_str(&format!("# {}\n", line.trim()));
                    i += 2;
                    continue;
                }
                if under.len() >= 3 && under.chars().all(|c| c == '-') && !line.contains('|') {
                    out.push_str(&format!("## {}\n", line.trim()));
                    i += 2;
                    continue;
                }
            }

            // Form feeds mark page boundaries.
            if line.contains('\u{0C}') {
                let parts: Vec<&str> = line.split('\u{0C}').collect();
                for (idx, part) in parts.iter().enumerate() {
                    if !part.trim().is_empty() {
                        out.push_str(&convert_line(part));
                        out.push('\n');
                    }
                    if idx + 1 < parts.len() {
                        out.push_str("\n---\n\n");
                    }
                }
                i += 1;
                continue;
            }

            out.push_str(&convert_line(line));
            out.push('\n');
            i += 1;
        }

        let cleaned: String = out
            .chars()
            .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
            .collect();

        if cleaned.trim().is_empty() {
            return Err(ParseError::EmptyOutput);
        }
        Ok(cleaned)
    }
}

fn convert_line(line: &str) -> String {
    let trimmed = line.trim_end();

    // Tab-separated rows become pipe tables.
    if trimmed.matches('\t').count() >= 2 {
        let cells: Vec<&str> = trimmed.split('\t').map(str::trim).collect();
        return format!("| {} |", cells.join(" | "));
    }

    let mut s = trimmed.to_string();

    // Minimal HTML recovery: heading tags and images; strip leftover tags.
    for (open, close, prefix) in [
        ("<h1>", "</h1>", "# "),
        ("<h2>", "</h2>", "## "),
        ("<h3>", "</h3>", "### "),
    ] {
        if let Some(start) = s.find(open) {
            if let Some(end) = s.find(close) {
                let inner = s[start + open.len()..end].trim().to_string();
                s = format!("{prefix}{inner}");
            }
        }
    }
    if s.contains("<img") {
        s = s.replace("<img", "![embedded image](image)").replace("/>", "").replace('>', "");
    }

    s
}
