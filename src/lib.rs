//! Library root for the `tos_trust` crate
//! Scores Terms of Service documents with a language model.

// Core error handling
pub mod api_errors;
pub mod errors;

// Configuration & CLI
pub mod cli;
pub mod config_loader;

// Content acquisition
pub mod acquisition;
pub mod browser;
pub mod normalizer;
pub mod static_fetch;

// Evaluation & interpretation
pub mod evaluation;
pub mod interpreter;

// Orchestration & response
pub mod composer;
pub mod pipeline;

// Web server interface
pub mod web;

pub use acquisition::{AcquiredDocument, AcquisitionMethod, AnalysisRequest};
pub use composer::AnalysisResponse;
pub use errors::{AcquisitionError, EvaluationError, PipelineError};
pub use interpreter::{ScoreScale, ScoreSource, TrustVerdict};
pub use pipeline::Analyzer;
