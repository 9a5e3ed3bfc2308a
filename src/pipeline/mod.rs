//! The document intelligence pipeline.
//!
//! Raw project documents go in; a structured, de-duplicated planning
//! context comes out. Every expensive step is content-addressed by the
//! document's fingerprint, so repeat documents cost nothing no matter
//! which session brings them.

pub mod analysis;
pub mod cache;
pub mod classification;
pub mod embedding;
pub mod extraction;
pub mod fingerprint;
pub mod format;
pub mod orchestrator;
pub mod parsing;
pub mod types;
