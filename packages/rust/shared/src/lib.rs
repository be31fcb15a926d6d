//! Shared types, error model, and configuration for incidentqa.
//!
//! This crate is the foundation depended on by all other incidentqa crates.
//! It provides:
//! - [`IncidentQaError`] — the unified error type
//! - Domain types ([`ExtractedIntent`], [`SearchJob`], [`LogMatch`], [`DocSnippet`], [`Answer`])
//! - Configuration ([`AppConfig`], [`Credentials`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ConfluenceConfig, Credentials, JoinMode, OpenAiConfig, PipelineConfig, Secret,
    SplunkConfig, config_dir, config_file_path, init_config, init_config_at, load_config,
    load_config_from, load_config_or_default, resolve_credentials, resolve_credentials_with,
};
pub use error::{IncidentQaError, Result};
pub use types::{
    Answer, AnswerKind, DocSnippet, ExtractedIntent, JobId, JobStatus, LogMatch, Query, QueryId,
    SearchJob, SourceLink,
};
