//! Resource paths and preliminary placeholder names.
//!
//! A resource that has not been persisted yet has no server path. The client
//! gives it a placeholder written `@<n>` on the wire, which the batch endpoint
//! rewrites to the real path once the resource is created. [`ResourcePath`]
//! keeps the two cases apart at the type level.

use crate::core::error::{AgoraError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

/// Sentinel that starts every preliminary path. Never used by the server.
pub const PRELIMINARY_PREFIX: char = '@';

/// Path of a resource, either assigned by the server or a client placeholder.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourcePath {
    /// Absolute server path or URL, e.g. `/organisation/proposal/`.
    Real(String),
    /// Placeholder for a resource created within the current batch.
    Preliminary(u64),
}

impl ResourcePath {
    pub fn real(path: impl Into<String>) -> Self {
        ResourcePath::Real(path.into())
    }

    #[inline]
    pub fn is_preliminary(&self) -> bool {
        matches!(self, ResourcePath::Preliminary(_))
    }

    /// The server path, or `None` for a placeholder.
    pub fn as_real(&self) -> Option<&str> {
        match self {
            ResourcePath::Real(path) => Some(path),
            ResourcePath::Preliminary(_) => None,
        }
    }

    /// The server path, failing with [`AgoraError::PreliminaryPath`] for a
    /// placeholder. `method` names the operation in the error.
    pub fn require_real(&self, method: &'static str) -> Result<&str> {
        match self {
            ResourcePath::Real(path) => Ok(path),
            ResourcePath::Preliminary(_) => Err(AgoraError::PreliminaryPath {
                method,
                path: self.to_string(),
            }),
        }
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourcePath::Real(path) => f.write_str(path),
            ResourcePath::Preliminary(n) => write!(f, "{}{}", PRELIMINARY_PREFIX, n),
        }
    }
}

impl FromStr for ResourcePath {
    type Err = AgoraError;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(rest) = s.strip_prefix(PRELIMINARY_PREFIX) {
            return rest
                .parse::<u64>()
                .map(ResourcePath::Preliminary)
                .map_err(|_| AgoraError::InvalidPath(s.to_string()));
        }
        if s.is_empty() {
            return Err(AgoraError::InvalidPath(s.to_string()));
        }
        Ok(ResourcePath::Real(s.to_string()))
    }
}

impl From<&str> for ResourcePath {
    /// Lenient conversion for literals; malformed placeholders become real paths.
    fn from(s: &str) -> Self {
        s.parse().unwrap_or_else(|_| ResourcePath::Real(s.to_string()))
    }
}

impl Serialize for ResourcePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ResourcePath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Generator for process-unique preliminary paths.
///
/// Shared by every transaction of one service so placeholders never collide.
#[derive(Debug, Default)]
pub struct PreliminaryNames {
    next: AtomicU64,
}

impl PreliminaryNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a fresh placeholder. Strictly increasing per instance.
    pub fn next_preliminary(&self) -> ResourcePath {
        ResourcePath::Preliminary(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// Sentinel check on a wire string.
    #[inline]
    pub fn is_preliminary(path: &str) -> bool {
        path.starts_with(PRELIMINARY_PREFIX)
    }
}

/// Canonical cache key form: exactly one trailing slash.
pub fn normalize_path(path: &str) -> String {
    let mut normalized = path.trim_end_matches('/').to_string();
    normalized.push('/');
    normalized
}

/// Split `http://host/a/b/` into (`http://host`, `/a/b/`). Plain paths have an
/// empty origin.
fn split_origin(path: &str) -> (&str, &str) {
    if let Some(scheme_end) = path.find("://") {
        let host_start = scheme_end + 3;
        match path[host_start..].find('/') {
            Some(i) => path.split_at(host_start + i),
            None => (path, ""),
        }
    } else {
        ("", path)
    }
}

/// Parent collection of a path, with a trailing slash. The root is its own
/// parent.
///
/// ```
/// use agora_http::core::types::parent_path;
///
/// assert_eq!(parent_path("/a/b/"), "/a/");
/// assert_eq!(parent_path("/a/b"), "/a/");
/// assert_eq!(parent_path("/"), "/");
/// ```
pub fn parent_path(path: &str) -> String {
    let (origin, rest) = split_origin(path);
    let trimmed = rest.trim_end_matches('/');
    let parent = match trimmed.rfind('/') {
        Some(i) => &trimmed[..=i],
        None => "/",
    };
    format!("{}{}", origin, parent)
}

/// Whether `path` has no parent above it.
pub fn is_root_path(path: &str) -> bool {
    let (_, rest) = split_origin(path);
    rest.trim_end_matches('/').is_empty()
}

/// Append a child segment to a collection path.
pub fn join_path(base: &str, segment: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        segment.trim_start_matches('/')
    )
}
