//! Unified error type for the clipforge merge engine.
//!
//! All crates funnel their failures into [`Error`]. Each variant maps onto a
//! stable [`ErrorKind`] via [`Error::kind`], which is what callers and the
//! outcome log see. Diagnostic text captured from external tools is kept out
//! of the `Display` output and is only reachable through
//! [`Error::diagnostic`].

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Unified error type covering all failure modes of a merge job.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The input has no decodable video stream, is empty, or is unreadable.
    #[error("invalid media {}: {reason}", path.display())]
    InvalidMedia {
        /// The offending input.
        path: PathBuf,
        /// Short description of what is wrong with it.
        reason: String,
    },

    /// The probing tool could not be invoked or produced unparsable output.
    #[error("probe failed for {}: {message}", path.display())]
    ProbeFailure {
        /// The file being probed.
        path: PathBuf,
        /// Short description of the failure.
        message: String,
    },

    /// Normalising one input to the target profile failed.
    #[error("standardization failed for {}", path.display())]
    StandardizationFailure {
        /// The input that could not be standardized.
        path: PathBuf,
        /// Untrusted encoder output, for operator logs only.
        diagnostic: String,
    },

    /// The concatenation subprocess failed or produced no output.
    #[error("merge execution failed ({mode})")]
    MergeExecutionFailed {
        /// Executor mode that failed ("copy" or "filter-graph").
        mode: String,
        /// Untrusted encoder output, for operator logs only.
        diagnostic: String,
    },

    /// The produced file did not pass verification.
    #[error("output verification failed: {0}")]
    OutputVerificationFailed(String),

    /// The job was cancelled by its caller.
    #[error("merge cancelled")]
    Cancelled,

    /// A caller-imposed budget (time, disk) was exceeded.
    #[error("resource budget exhausted: {0}")]
    ResourceExhausted(String),

    /// An external tool (ffmpeg, ffprobe) could not be run.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Caller-supplied data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Stable classification of a failure, reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidMedia,
    ProbeFailure,
    StandardizationFailure,
    MergeExecutionFailed,
    OutputVerificationFailed,
    Cancelled,
    ResourceExhausted,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InvalidMedia => "invalid_media",
            Self::ProbeFailure => "probe_failure",
            Self::StandardizationFailure => "standardization_failure",
            Self::MergeExecutionFailed => "merge_execution_failed",
            Self::OutputVerificationFailed => "output_verification_failed",
            Self::Cancelled => "cancelled",
            Self::ResourceExhausted => "resource_exhausted",
        };
        f.write_str(s)
    }
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidMedia { .. } | Error::Validation(_) => ErrorKind::InvalidMedia,
            Error::ProbeFailure { .. } => ErrorKind::ProbeFailure,
            Error::StandardizationFailure { .. } => ErrorKind::StandardizationFailure,
            Error::MergeExecutionFailed { .. }
            | Error::Tool { .. }
            | Error::Io { .. }
            | Error::Internal(_) => ErrorKind::MergeExecutionFailed,
            Error::OutputVerificationFailed(_) => ErrorKind::OutputVerificationFailed,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::ResourceExhausted(_) => ErrorKind::ResourceExhausted,
        }
    }

    /// Captured tool diagnostics, if any. Not suitable for end users.
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            Error::StandardizationFailure { diagnostic, .. }
            | Error::MergeExecutionFailed { diagnostic, .. } => Some(diagnostic),
            Error::Tool { message, .. } => Some(message),
            _ => None,
        }
    }

    /// Whether the orchestrator may answer this error with its single
    /// re-encode fallback.
    pub fn is_fallback_eligible(&self) -> bool {
        matches!(
            self,
            Error::MergeExecutionFailed { .. } | Error::OutputVerificationFailed(_)
        )
    }

    /// Convenience constructor for [`Error::InvalidMedia`].
    pub fn invalid_media(path: &Path, reason: impl Into<String>) -> Self {
        Error::InvalidMedia {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Convenience constructor for [`Error::ProbeFailure`].
    pub fn probe_failure(path: &Path, message: impl Into<String>) -> Self {
        Error::ProbeFailure {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::MergeExecutionFailed`].
    pub fn merge_failed(mode: impl fmt::Display, diagnostic: impl Into<String>) -> Self {
        Error::MergeExecutionFailed {
            mode: mode.to_string(),
            diagnostic: diagnostic.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
