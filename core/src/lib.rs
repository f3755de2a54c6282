//! agora_http: resource, cache and batch-transaction client for a versioned
//! participation backend.
//!
//! - **types**: paths (real or preliminary), resources, sheets, requests and responses.
//! - **meta_api**: the schema table that drives import and export.
//! - **convert**: wire JSON to [`Resource`] and back.
//! - **client**: the push-invalidated cache, batch transactions and [`HttpService`].

pub mod core;

// Top-level re-exports for common usage
pub use crate::core::convert::{export_resource, import_resource, ElementsMode, ExportOptions};
pub use crate::core::error::{format_error, AgoraError, BackendErrorItem, Result};
pub use crate::core::meta_api::{fetch_meta_api, well_known, MetaApi};
pub use crate::core::traits::{
    AgoraRuntime, HttpNetwork, NativeRuntime, OfflinePush, PushChannel, PushRegistration,
};
pub use crate::core::types;
pub use crate::core::types::{
    GetOptions, HttpRequest, HttpResponse, Method, PreliminaryNames, Resource, ResourcePath,
    Sheet, UpdatedResources, WriteOptions,
};

pub use crate::core::client;
pub use crate::core::client::{
    ClientConfig, HttpCache, HttpService, NoForkPost, PushEvent, PushHub, Transaction,
};
