//! Error types for buildgate.
//!
//! Library crates use [`BuildGateError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

use crate::types::Violation;

/// Top-level error type for all buildgate operations.
#[derive(Debug, thiserror::Error)]
pub enum BuildGateError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// One or more toolchain versions do not satisfy the declared ranges.
    #[error("version requirements not met: {}", format_violations(.violations))]
    Precondition { violations: Vec<Violation> },

    /// The bundling engine finished but reported build errors.
    #[error("build failed with errors")]
    Compilation { summary: String },

    /// The bundling engine could not be run or returned an unreadable report.
    #[error("bundling engine error: {0}")]
    Engine(String),

    /// No transform rule matches the requested file.
    #[error("unsupported asset type: no transform rule matches {path}")]
    UnsupportedAsset { path: String },

    /// A version string or range could not be parsed.
    #[error("invalid version '{input}': {message}")]
    Version { input: String, message: String },

    /// Data validation error (unsafe clean target, bad template, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, BuildGateError>;

fn format_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl BuildGateError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a version parse error for the given input.
    pub fn version(input: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Version {
            input: input.into(),
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
}
