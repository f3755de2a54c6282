//! Client-side resource, cache and transaction layer for a versioned REST backend.

pub mod client;
pub mod convert;
pub mod error;
pub mod meta_api;
pub mod traits;
pub mod types;

pub use error::{AgoraError, BackendErrorItem, Result};
pub use types::{Resource, ResourcePath, Sheet};

pub use client::{ClientConfig, HttpCache, HttpService, PushHub, Transaction};
