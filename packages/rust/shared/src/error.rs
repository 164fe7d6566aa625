//! Error types for lexpipe.
//!
//! Library crates use [`LexpipeError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all lexpipe operations.
#[derive(Debug, thiserror::Error)]
pub enum LexpipeError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/feed error during acquisition or batch fetch.
    #[error("fetch error: {0}")]
    Fetch(String),

    /// Segmentation input too short after normalization — the wrong content
    /// region was extracted from the source document.
    #[error("empty document: normalized text is {length} chars (minimum {minimum})")]
    EmptyDocument { length: usize, minimum: usize },

    /// No article boundaries matched — the document is not in the expected
    /// legislative format. Not retryable.
    #[error("no articles found for jurisdiction {jurisdiction}")]
    NoArticlesFound { jurisdiction: String },

    /// Completion-service call or response-parse failure. Retryable per batch.
    #[error("extraction error: {0}")]
    Extraction(String),

    /// Per-item persistence failure during publishing.
    #[error("publish error: {0}")]
    Publish(String),

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Feed or document parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LexpipeError>;

impl LexpipeError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether a retry can meaningfully change the outcome.
    ///
    /// Segmentation failures signal a content mismatch upstream, so retrying
    /// the same input is pointless. Fetch and extraction failures are
    /// transient until proven otherwise.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Fetch(_) | Self::Extraction(_) | Self::Storage(_))
    }
}
