//! Parser routing: score a document's structural complexity and send it
//! to the cheapest sufficient parser, with mutual fallback on failure.

pub mod complexity;
pub mod comprehensive;
pub mod fast;
pub mod router;
pub mod types;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("invalid text encoding: {0}")]
    Encoding(String),

    #[error("parser produced no content")]
    EmptyOutput,

    #[error("both parsers failed (fast: {fast}; comprehensive: {comprehensive})")]
    BothParsersFailed { fast: String, comprehensive: String },
}
