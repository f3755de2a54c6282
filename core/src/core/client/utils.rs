//! Utility functions for the resource client.

use std::collections::BTreeMap;

/// Serialize query parameters in key order. Used as the cache subkey, so
/// equal parameter maps always give equal strings.
pub fn query_string(params: &BTreeMap<String, String>) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter())
        .finish()
}

/// Resolve `path` against the backend root. Only paths starting with `/`
/// are prefixed; full URLs pass through.
pub fn build_url(rest_url: &str, path: &str) -> String {
    if path.starts_with('/') {
        format!("{}{}", rest_url.trim_end_matches('/'), path)
    } else {
        path.to_string()
    }
}
