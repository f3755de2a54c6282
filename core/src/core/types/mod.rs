//! Core data types: paths, resources, requests and responses.

mod path;
mod request;
mod resource;
mod response;

pub use bytes::Bytes;
pub use path::{
    is_root_path, join_path, normalize_path, parent_path, PreliminaryNames, ResourcePath,
    PRELIMINARY_PREFIX,
};
pub use request::{GetOptions, HttpRequest, Method, WriteOptions};
pub use resource::{Resource, Sheet};
pub use response::{
    BatchItemResponse, BatchResponse, HttpResponse, ResourceOptions, UpdatedResources,
};
