//! HTTP response and the structured bodies the backend sends back.

use crate::core::error::{AgoraError, Result};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Raw HTTP response.
#[derive(Clone, Debug, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        HttpResponse {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    /// Response with a JSON body.
    pub fn json(status: u16, body: &Value) -> Self {
        Self::new(status, body.to_string()).with_header("content-type", "application/json")
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    pub fn body_json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl Default for HttpResponse {
    fn default() -> Self {
        HttpResponse {
            status: 200,
            headers: BTreeMap::new(),
            body: Bytes::new(),
        }
    }
}

/// Paths the server reports as touched by a write.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatedResources {
    #[serde(default)]
    pub changed_descendants: Vec<String>,
    #[serde(default)]
    pub created: Vec<String>,
    #[serde(default)]
    pub modified: Vec<String>,
    #[serde(default)]
    pub removed: Vec<String>,
}

impl UpdatedResources {
    pub fn is_empty(&self) -> bool {
        self.changed_descendants.is_empty()
            && self.created.is_empty()
            && self.modified.is_empty()
            && self.removed.is_empty()
    }

    /// Merge another report into this one.
    pub fn extend(&mut self, other: UpdatedResources) {
        self.changed_descendants.extend(other.changed_descendants);
        self.created.extend(other.created);
        self.modified.extend(other.modified);
        self.removed.extend(other.removed);
    }
}

/// Methods the backend allows on a resource, from an OPTIONS response.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResourceOptions {
    pub get: bool,
    pub put: bool,
    pub post: bool,
    pub delete: bool,
    pub head: bool,
    pub options: bool,
    /// Full body, e.g. to read which sheets a PUT accepts.
    pub raw: Value,
}

impl ResourceOptions {
    /// A method is allowed when its name is a key of the body.
    pub fn from_body(raw: Value) -> Self {
        let has = |key: &str| raw.get(key).is_some();
        Self {
            get: has("GET"),
            put: has("PUT"),
            post: has("POST"),
            delete: has("DELETE"),
            head: has("HEAD"),
            options: has("OPTIONS"),
            raw,
        }
    }
}

/// One entry of a batch response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchItemResponse {
    pub code: u16,
    #[serde(default)]
    pub body: Value,
}

impl BatchItemResponse {
    #[inline]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }
}

/// Body of a batch response.
///
/// The backend sends either a bare array of results or an object holding
/// the results plus the side effects of the whole batch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchResponse {
    pub responses: Vec<BatchItemResponse>,
    pub updated_resources: Option<UpdatedResources>,
}

impl BatchResponse {
    pub fn from_value(value: Value) -> Result<Self> {
        #[derive(Deserialize)]
        struct Envelope {
            responses: Vec<BatchItemResponse>,
            #[serde(default)]
            updated_resources: Option<UpdatedResources>,
        }

        match value {
            Value::Array(_) => Ok(Self {
                responses: serde_json::from_value(value)?,
                updated_resources: None,
            }),
            Value::Object(_) => {
                let envelope: Envelope = serde_json::from_value(value)?;
                Ok(Self {
                    responses: envelope.responses,
                    updated_resources: envelope.updated_resources,
                })
            }
            other => Err(AgoraError::Import(format!(
                "batch response is neither array nor object: {}",
                other
            ))),
        }
    }
}
