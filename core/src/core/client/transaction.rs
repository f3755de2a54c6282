//! Batch transactions.
//!
//! A [`Transaction`] records `get`, `put` and `post` operations and sends
//! them as one request to the batch endpoint on [`commit`](Transaction::commit).
//! Posts get a preliminary path right away, so later operations in the same
//! transaction can refer to resources that do not exist yet; the server
//! rewrites those references when it processes the batch.
//!
//! # Example
//!
//! ```no_run
//! # use agora_http::{HttpService, Resource, ResourcePath, Result};
//! # async fn example(service: HttpService, item: Resource, version: Resource) -> Result<()> {
//! let mut tx = service.transaction();
//! let item_post = tx.post(&ResourcePath::real("/organisation/"), &item)?;
//! let mut version = version;
//! if let Some(first) = &item_post.first_version_path {
//!     version.set_follows(first);
//! }
//! let version_post = tx.post(&item_post.path, &version)?;
//! let version_get = tx.get(&version_post.path)?;
//! let results = tx.commit().await?;
//! let created = &results[version_get.index];
//! # Ok(())
//! # }
//! ```

use crate::core::client::HttpService;
use crate::core::convert::{export_resource, ExportOptions};
use crate::core::error::{AgoraError, Result};
use crate::core::types::{Method, Resource, ResourcePath};
use futures::future::{BoxFuture, FutureExt};
use serde::{Serialize, Serializer};
use serde_json::Value;

fn serialize_method<S: Serializer>(method: &Method, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(method.as_str())
}

/// One operation of a batch request.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BatchRequestItem {
    #[serde(serialize_with = "serialize_method")]
    pub method: Method,
    /// Target URL, or a preliminary path created earlier in the batch.
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Placeholder the server binds to the created resource.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_first_version_path: Option<String>,
}

/// Position of a recorded get or put in the batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpHandle {
    pub index: usize,
    pub path: ResourcePath,
}

/// Position and placeholders of a recorded post.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PostHandle {
    pub index: usize,
    /// Preliminary path of the resource to be created.
    pub path: ResourcePath,
    /// Preliminary path of the first version, for items.
    pub first_version_path: Option<ResourcePath>,
}

/// Recorder for one batch request. Unusable after `commit`.
pub struct Transaction {
    service: HttpService,
    ops: Vec<BatchRequestItem>,
    committed: bool,
}

impl Transaction {
    pub(crate) fn new(service: HttpService) -> Self {
        Self {
            service,
            ops: Vec::new(),
            committed: false,
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.committed {
            Err(AgoraError::TransactionClosed)
        } else {
            Ok(())
        }
    }

    fn target(&self, path: &ResourcePath) -> String {
        match path {
            ResourcePath::Real(p) => self.service.url(p),
            ResourcePath::Preliminary(_) => path.to_string(),
        }
    }

    fn push(&mut self, item: BatchRequestItem) -> usize {
        self.ops.push(item);
        self.ops.len() - 1
    }

    /// Record a read.
    pub fn get(&mut self, path: &ResourcePath) -> Result<OpHandle> {
        self.ensure_open()?;
        let index = self.push(BatchRequestItem {
            method: Method::Get,
            path: self.target(path),
            body: None,
            result_path: None,
            result_first_version_path: None,
        });
        Ok(OpHandle {
            index,
            path: path.clone(),
        })
    }

    /// Record a write to an existing resource.
    pub fn put(&mut self, path: &ResourcePath, resource: &Resource) -> Result<OpHandle> {
        self.ensure_open()?;
        let body = export_resource(self.service.meta(), resource, ExportOptions::default())?;
        let index = self.push(BatchRequestItem {
            method: Method::Put,
            path: self.target(path),
            body: Some(body),
            result_path: None,
            result_first_version_path: None,
        });
        Ok(OpHandle {
            index,
            path: path.clone(),
        })
    }

    /// Record a create under `parent`.
    ///
    /// Keeps a preliminary path already set on `resource`, otherwise allocates
    /// one. Items also get a first-version placeholder.
    pub fn post(&mut self, parent: &ResourcePath, resource: &Resource) -> Result<PostHandle> {
        self.ensure_open()?;
        let names = self.service.names();
        let path = if resource.path.is_preliminary() {
            resource.path.clone()
        } else {
            names.next_preliminary()
        };
        let first_version_path = if self.service.meta().is_item(&resource.content_type) {
            Some(
                resource
                    .first_version_path
                    .clone()
                    .filter(ResourcePath::is_preliminary)
                    .unwrap_or_else(|| names.next_preliminary()),
            )
        } else {
            None
        };

        let body = export_resource(
            self.service.meta(),
            resource,
            ExportOptions {
                creating: true,
                ..Default::default()
            },
        )?;
        let index = self.push(BatchRequestItem {
            method: Method::Post,
            path: self.target(parent),
            body: Some(body),
            result_path: Some(path.to_string()),
            result_first_version_path: first_version_path.as_ref().map(ToString::to_string),
        });
        Ok(PostHandle {
            index,
            path,
            first_version_path,
        })
    }

    /// Number of recorded operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Send all recorded operations as one batch.
    ///
    /// The transaction is closed as soon as this is called, before the
    /// request goes out. The results come back in submission order; index
    /// them with the handles returned when recording.
    pub fn commit(&mut self) -> BoxFuture<'static, Result<Vec<Resource>>> {
        if self.committed {
            return futures::future::ready(Err(AgoraError::TransactionClosed)).boxed();
        }
        self.committed = true;
        let ops = std::mem::take(&mut self.ops);
        let service = self.service.clone();
        async move { service.send_batch(ops).await }.boxed()
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("ops", &self.ops.len())
            .field("committed", &self.committed)
            .finish()
    }
}
