//! Error types for resource, cache and transaction operations.
//!
//! The [`Result`] type alias provides a convenient shorthand for operations that may fail.
//!
//! # Error Categories
//!
//! | Category | Variants | Retried |
//! |----------|----------|---------|
//! | Caller bugs | `PreliminaryPath`, `TransactionClosed`, `InvalidPath` | No |
//! | Backend | `Backend` | Only the no-fork conflict shape |
//! | Conversion | `Import`, `Export` | No |
//! | Algorithms | `CyclicReference`, `RetryExhausted`, `NoForkViolation`, `AncestorDepthExceeded` | No |
//! | Transport | `Http`, `Json` | No |
//! | Configuration | `Config` | No |
//!
//! The enum is `Clone` so a single failure can be handed to every caller
//! sharing one in-flight request.
//!
//! # Examples
//!
//! ```
//! use agora_http::{AgoraError, BackendErrorItem};
//!
//! let err = AgoraError::Backend(vec![BackendErrorItem::new(
//!     "data.adhocracy_core.sheets.versions.IVersionable.follows",
//!     "body",
//!     "No fork allowed",
//! )]);
//! assert!(err.is_no_fork_conflict());
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, AgoraError>;

/// One entry of the backend's error envelope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendErrorItem {
    pub name: String,
    pub location: String,
    pub description: String,
}

impl BackendErrorItem {
    pub fn new(
        name: impl Into<String>,
        location: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
            description: description.into(),
        }
    }

    /// Placeholder used when the error body could not be parsed at all
    /// (typically an HTML page from a 5xx).
    pub fn unknown() -> Self {
        Self::new("unknown", "unknown", "unknown")
    }
}

/// Body of a failed response: `{status: "error", errors: [...]}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendErrorEnvelope {
    #[serde(default)]
    pub status: String,
    pub errors: Vec<BackendErrorItem>,
}

/// Render one backend error for display.
pub fn format_error(error: &BackendErrorItem) -> String {
    if error.location == "internal" {
        "Internal Error".to_string()
    } else {
        error.description.clone()
    }
}

fn join_errors(errors: &[BackendErrorItem]) -> String {
    errors
        .iter()
        .map(|e| format!("{} ({}): {}", e.name, e.location, e.description))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors that can occur while talking to the backend.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum AgoraError {
    /// A persisted path was required but a preliminary one was given.
    #[error("attempt to http-{method} preliminary path: {path}")]
    PreliminaryPath { method: &'static str, path: String },

    /// Validation or conflict errors reported by the server.
    #[error("backend error: {}", join_errors(.0))]
    Backend(Vec<BackendErrorItem>),

    /// Malformed wire data or unknown content type on the way in.
    #[error("import error: {0}")]
    Import(String),

    /// Resource cannot be serialized for the server.
    #[error("export error: {0}")]
    Export(String),

    /// No posting order exists for a set of resources.
    #[error("cyclic reference among preliminary paths: {}", .0.join(", "))]
    CyclicReference(Vec<String>),

    /// The no-fork retry loop ran out of attempts.
    #[error("tried to post new version of {path} {attempts} times, giving up")]
    RetryExhausted { path: String, attempts: u32 },

    /// A transaction was used after `commit()`.
    #[error("transaction already committed")]
    TransactionClosed,

    /// The LAST tag of a no-fork item does not hold exactly one head.
    #[error("cannot handle LAST tag of {path}: {heads:?}")]
    NoForkViolation { path: String, heads: Vec<String> },

    /// Parent walk did not terminate within the configured depth.
    #[error("ancestor lookup from {path} exceeded depth {depth}")]
    AncestorDepthExceeded { path: String, depth: usize },

    /// String is not a valid resource path.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Transport failure (connection refused, timeout, ...).
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(String),

    /// Invalid client configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for AgoraError {
    fn from(err: serde_json::Error) -> Self {
        AgoraError::Json(err.to_string())
    }
}

impl AgoraError {
    /// Backend error list, if this is a backend error.
    #[inline]
    #[must_use]
    pub fn backend_errors(&self) -> Option<&[BackendErrorItem]> {
        match self {
            AgoraError::Backend(errors) => Some(errors),
            _ => None,
        }
    }

    /// Check whether this is the single "No fork allowed" rejection that a
    /// concurrent version post produces.
    ///
    /// Exactly one error is required; its name must point at the
    /// versionable `follows` field or at `root_versions`, its location must
    /// be `body` and its description must start with `No fork allowed`.
    #[must_use]
    pub fn is_no_fork_conflict(&self) -> bool {
        let Some([error]) = self.backend_errors() else {
            return false;
        };
        let name_matches = (error.name.starts_with("data.")
            && error.name.ends_with(".IVersionable.follows"))
            || error.name == "root_versions"
            || error.name == "root_version";
        name_matches
            && error.location == "body"
            && error.description.starts_with("No fork allowed")
    }

    /// Check whether the caller misused the API (as opposed to a runtime failure).
    #[inline]
    #[must_use]
    pub fn is_programming_error(&self) -> bool {
        matches!(
            self,
            AgoraError::PreliminaryPath { .. }
                | AgoraError::TransactionClosed
                | AgoraError::InvalidPath(_)
        )
    }
}
