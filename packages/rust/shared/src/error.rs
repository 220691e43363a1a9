//! Error types for jobdex.
//!
//! Library crates use [`JobdexError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Boxed error used to carry the underlying cause of an adapter failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Top-level error type for all jobdex operations.
#[derive(Debug, thiserror::Error)]
pub enum JobdexError {
    /// The parameter mapping could not be canonically serialized.
    #[error("invalid parameter set: {message}")]
    InvalidParameterSet { message: String },

    /// A job manifest is unreadable or disagrees with its directory name.
    #[error("job '{job_id}' is corrupted: {reason}")]
    ManifestCorruption { job_id: String, reason: String },

    /// One or more jobs were found corrupted during a crawl or check.
    #[error("{} corrupted job(s): {}", job_ids.len(), job_ids.join(", "))]
    JobsCorrupted { job_ids: Vec<String> },

    /// No directed path exists between two formats in the conversion network.
    #[error("no conversion path from '{source_format}' to '{target_format}'")]
    NoConversionPath {
        source_format: String,
        target_format: String,
    },

    /// An adapter on the selected conversion path failed.
    #[error("adapter '{adapter}' failed: {source}")]
    Adapter {
        adapter: String,
        #[source]
        source: BoxError,
    },

    /// A document references a sub-crawler the access descriptor no longer provides.
    #[error("crawler '{crawler_id}' not found in access descriptor {descriptor:?}")]
    CrawlerNotFound {
        crawler_id: String,
        descriptor: PathBuf,
    },

    /// The in-memory collection only supports `{"_id": ...}` filters.
    #[error("unsupported query: {0}")]
    UnsupportedQuery(String),

    /// An access descriptor could not be loaded or names an unknown plugin.
    #[error("plugin error in {path:?}: {message}")]
    Plugin { path: PathBuf, message: String },

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// JSON/TOML parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (inconsistent key, invalid identity, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, JobdexError>;

impl JobdexError {
    /// Create an invalid-parameter-set error from any displayable message.
    pub fn invalid_parameter_set(msg: impl Into<String>) -> Self {
        Self::InvalidParameterSet {
            message: msg.into(),
        }
    }

    /// Create a manifest corruption error for a job.
    pub fn corrupted(job_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ManifestCorruption {
            job_id: job_id.into(),
            reason: reason.into(),
        }
    }

    /// Wrap an adapter failure.
    pub fn adapter(adapter: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Adapter {
            adapter: adapter.into(),
            source: source.into(),
        }
    }

    /// Create a plugin error for an access descriptor.
    pub fn plugin(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::Plugin {
            path: path.into(),
            message: msg.into(),
        }
    }

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

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
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

    /// Whether this error marks a corrupted job rather than a plain failure.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::ManifestCorruption { .. } | Self::JobsCorrupted { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = JobdexError::config("missing database path");
        assert_eq!(err.to_string(), "config error: missing database path");

        let err = JobdexError::JobsCorrupted {
            job_ids: vec!["abc".into(), "def".into()],
        };
        assert_eq!(err.to_string(), "2 corrupted job(s): abc, def");
    }

    #[test]
    fn corruption_is_distinguishable() {
        assert!(JobdexError::corrupted("abc", "missing manifest").is_corruption());
        assert!(!JobdexError::parse("bad json").is_corruption());
    }

    #[test]
    fn adapter_error_keeps_source() {
        let cause = std::io::Error::other("boom");
        let err = JobdexError::adapter("text->json", cause);
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("text->json"));
    }
}
