//! planforge — document intelligence and caching for project planning.
//!
//! Feed a batch of project documents (specs, requirements, test plans,
//! timelines, risk registers) through parsing, embedding, classification,
//! extraction, and cross-document analysis, with aggressive
//! content-addressed caching at every tier. The output is a
//! [`pipeline::types::PlanningContext`] ready for a plan-generation
//! collaborator.
//!
//! ```no_run
//! use std::sync::Arc;
//! use planforge::config::PipelineConfig;
//! use planforge::pipeline::embedding::memory::InMemoryVectorStore;
//! use planforge::pipeline::orchestrator::PipelineOrchestrator;
//! # use planforge::providers::{Classifier, Extractor, EmbeddingProvider};
//! # fn providers() -> (Box<dyn Classifier>, Box<dyn Extractor>, Box<dyn EmbeddingProvider>) { unimplemented!() }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let (classifier, extractor, embedder) = providers();
//! let orchestrator = PipelineOrchestrator::new(
//!     PipelineConfig::new("/var/lib/planforge"),
//!     Arc::new(InMemoryVectorStore::new()),
//!     classifier,
//!     extractor,
//!     embedder,
//! )?;
//! let handle = orchestrator.run_batch("session-1", vec!["spec.md".into()]);
//! let context = handle.wait()?;
//! println!("coverage: {:.0}%", context.analysis.coverage_score * 100.0);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod pipeline;
pub mod providers;

pub use config::PipelineConfig;
pub use pipeline::orchestrator::{BatchHandle, BatchMonitor, PipelineOrchestrator, PipelineError};
pub use pipeline::types::PlanningContext;
