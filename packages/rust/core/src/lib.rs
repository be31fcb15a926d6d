//! Core question-answering logic for IncidentQA.
//!
//! This crate ties together keyword extraction, log search, documentation
//! retrieval, and answer synthesis into one pipeline (see [`Pipeline`]).

pub mod extractor;
pub mod pipeline;
pub mod synthesizer;

pub use extractor::{KeywordExtractor, parse_intent};
pub use pipeline::{
    BackendHealth, CLARIFICATION_TEXT, FAILURE_TEXT, Pipeline, PipelineReport, ProgressReporter,
    SilentProgress,
};
pub use synthesizer::{NO_RELEVANT_INFORMATION, ResponseSynthesizer};
