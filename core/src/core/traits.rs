use crate::core::error::Result;
use crate::core::types::{HttpRequest, HttpResponse};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Abstraction for asynchronous runtime operations.
pub trait AgoraRuntime: Send + Sync + 'static {
    /// Yield execution for a duration.
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>;
}

/// Abstraction for network operations.
///
/// Implementations return every response the server sends, including
/// non-2xx ones; only transport failures become an `Err`.
#[async_trait]
pub trait HttpNetwork: Send + Sync + 'static {
    /// Perform a single HTTP request.
    async fn send(&self, req: HttpRequest) -> Result<HttpResponse>;
}

/// Callback fired with the path of a resource that changed on the server.
pub type PushCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Callback fired when the push connection is lost.
pub type DisconnectCallback = Arc<dyn Fn() + Send + Sync>;

/// Abstraction over the server push (websocket) channel.
pub trait PushChannel: Send + Sync + 'static {
    /// Whether change notifications are currently being delivered.
    fn is_connected(&self) -> bool;

    /// Ask to be told whenever `path` changes.
    fn register(&self, path: &str, callback: PushCallback) -> PushRegistration;

    /// Install a callback fired every time the connection drops, until the
    /// returned registration is dropped.
    fn on_disconnect(&self, callback: DisconnectCallback) -> PushRegistration;
}

/// Handle that keeps a push subscription alive.
///
/// Unregisters on [`unregister`](Self::unregister) or on drop, whichever
/// happens first.
pub struct PushRegistration {
    off: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl PushRegistration {
    pub fn new(off: impl FnOnce() + Send + 'static) -> Self {
        Self {
            off: Mutex::new(Some(Box::new(off))),
        }
    }

    /// A registration that does nothing, for channels that are offline.
    pub fn noop() -> Self {
        Self {
            off: Mutex::new(None),
        }
    }

    pub fn unregister(&self) {
        let off = self.off.lock().take();
        if let Some(off) = off {
            off();
        }
    }
}

impl Drop for PushRegistration {
    fn drop(&mut self) {
        self.unregister();
    }
}

impl std::fmt::Debug for PushRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushRegistration")
            .field("active", &self.off.lock().is_some())
            .finish()
    }
}

/// Push channel that is never connected. Every `memoize` goes to the network.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflinePush;

impl PushChannel for OfflinePush {
    fn is_connected(&self) -> bool {
        false
    }

    fn register(&self, _path: &str, _callback: PushCallback) -> PushRegistration {
        PushRegistration::noop()
    }

    fn on_disconnect(&self, _callback: DisconnectCallback) -> PushRegistration {
        PushRegistration::noop()
    }
}

/// Helper struct to provide default native runtime implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeRuntime;

impl AgoraRuntime for NativeRuntime {
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>> {
        Box::pin(tokio::time::sleep(duration))
    }
}
