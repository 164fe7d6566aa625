//! Shared types, error model, and configuration for lexpipe.
//!
//! This crate is the foundation depended on by all other lexpipe crates.
//! It provides:
//! - [`LexpipeError`] — the unified error type
//! - Domain types ([`LegislationEntry`], [`Article`], [`ParsedDocument`],
//!   [`RawObligation`], [`ValidatedObligation`], [`PipelineJob`])
//! - The declarative jurisdiction/domain tables
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod jurisdiction;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BatchPoliciesConfig, CompletionConfig, DefaultsConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, resolve_api_key,
};
pub use error::{LexpipeError, Result};
pub use jurisdiction::{
    DOMAIN_KEYWORDS, JURISDICTIONS, JurisdictionSpec, classify_domain, has_obligation_markers,
    jurisdiction,
};
pub use types::{
    Article, Frequency, JobId, JobStatus, LegalDomain, LegislationEntry, ObligationId,
    ObligationStatus, ParsedDocument, PipelineJob, RawObligation, ValidatedObligation,
};
