//! Resource client: cache, push hub, transactions and the HTTP façade.

pub mod backend_error;
mod cache;
mod config;
mod fetch;
pub mod native_network;
mod push;
pub mod retry;
pub mod topo;
mod transaction;
mod utils;

pub use backend_error::{log_backend_batch_error, log_backend_error};
pub use cache::HttpCache;
pub use config::ClientConfig;
pub use fetch::{HttpService, NoForkPost, Resolvable, USER_PATH_HEADER, USER_TOKEN_HEADER};
pub use native_network::NativeNetwork;
pub use push::{ClientRequest, PushAction, PushEvent, PushHub, ServerEvent};
pub use retry::{RetryConfig, RetryDecision, RetryState};
pub use topo::sort_topologically;
pub use transaction::{BatchRequestItem, OpHandle, PostHandle, Transaction};
pub use utils::*;
