//! Normalizing and logging backend error responses.

use crate::core::error::{AgoraError, BackendErrorEnvelope, BackendErrorItem};
use crate::core::types::{BatchItemResponse, HttpResponse};
use serde_json::Value;
use tracing::warn;

fn errors_from_value(body: &Value) -> Vec<BackendErrorItem> {
    serde_json::from_value::<BackendErrorEnvelope>(body.clone())
        .map(|envelope| envelope.errors)
        .unwrap_or_else(|_| vec![BackendErrorItem::unknown()])
}

/// Log a failed response and turn it into [`AgoraError::Backend`].
///
/// Bodies that are not a JSON error envelope (HTML error pages from a 5xx)
/// yield a single `unknown` item. Responses with status 410 are not logged.
pub fn log_backend_error(url: &str, response: &HttpResponse) -> AgoraError {
    let errors = match response.body_json::<Value>() {
        Ok(body) => errors_from_value(&body),
        Err(_) => vec![BackendErrorItem::unknown()],
    };
    if response.status != 410 {
        warn!(
            "http response with error status {} from {}: {}",
            response.status,
            url,
            response.body_str().unwrap_or("<binary>")
        );
    }
    AgoraError::Backend(errors)
}

/// Log a failed batch and turn it into [`AgoraError::Backend`].
///
/// Batch processing stops at the first failing operation, so the error is in
/// the last entry.
pub fn log_backend_batch_error(url: &str, status: u16, responses: &[BatchItemResponse]) -> AgoraError {
    let errors = match responses.last() {
        Some(last) => errors_from_value(&last.body),
        None => vec![BackendErrorItem::unknown()],
    };
    if status != 410 {
        warn!(
            "batch request to {} failed after {} operations: {:?}",
            url,
            responses.len(),
            errors
        );
    }
    AgoraError::Backend(errors)
}
