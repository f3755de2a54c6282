//! Push hub: fans websocket change notifications out to cache entries.
//!
//! The backend pushes JSON messages over a websocket. This module does not own
//! the socket; a transport adapter feeds [`PushEvent`]s in (see
//! [`PushHub::spawn_pump`]) and drains subscribe/unsubscribe requests from
//! [`PushHub::outbox`].
//!
//! Wire format, server to client:
//!
//! ```text
//! {"event": "modified", "resource": "/adhocracy/proposal/"}
//! {"event": "new_child", "resource": "/adhocracy/", "child": "/adhocracy/proposal/"}
//! {"event": "new_version", "resource": "/adhocracy/proposal/", "version": "/adhocracy/proposal/VERSION_0000001/"}
//! {"status": "ok", "action": "subscribe", "resource": "/adhocracy/"}
//! ```
//!
//! Client to server:
//!
//! ```text
//! {"action": "subscribe", "resource": "/adhocracy/"}
//! ```

use crate::core::traits::{DisconnectCallback, PushCallback, PushChannel, PushRegistration};
use crate::core::types::normalize_path;
use async_channel::{Receiver, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::{debug, trace, warn};

/// Input from a transport adapter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PushEvent {
    Connected,
    Disconnected,
    /// Raw text frame from the server.
    Message(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushAction {
    Subscribe,
    Unsubscribe,
}

/// Request the transport should send to the server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRequest {
    pub action: PushAction,
    pub resource: String,
}

/// Change notification from the server.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ServerEvent {
    pub event: String,
    pub resource: String,
    #[serde(default)]
    pub child: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ServerMessage {
    Event(ServerEvent),
    Status {
        status: String,
        action: String,
        resource: String,
    },
    Error {
        error: String,
        #[serde(default)]
        details: String,
    },
}

struct HubState {
    connected: bool,
    subscribers: HashMap<String, Vec<(u64, PushCallback)>>,
    disconnect_listeners: Vec<(u64, DisconnectCallback)>,
    next_id: u64,
}

struct HubInner {
    state: Mutex<HubState>,
    outbox_tx: Sender<ClientRequest>,
    outbox_rx: Receiver<ClientRequest>,
}

impl HubInner {
    fn send(&self, action: PushAction, resource: &str) {
        let request = ClientRequest {
            action,
            resource: resource.to_string(),
        };
        if self.outbox_tx.try_send(request).is_err() {
            warn!("push outbox closed, dropping {:?} for {}", action, resource);
        }
    }

    fn unregister(&self, key: &str, id: u64) {
        let mut state = self.state.lock();
        let Some(list) = state.subscribers.get_mut(key) else {
            return;
        };
        list.retain(|(i, _)| *i != id);
        if list.is_empty() {
            state.subscribers.remove(key);
            let connected = state.connected;
            drop(state);
            if connected {
                self.send(PushAction::Unsubscribe, key);
            }
        }
    }
}

/// Concrete [`PushChannel`] keeping per-path subscriber lists.
#[derive(Clone)]
pub struct PushHub {
    inner: Arc<HubInner>,
}

impl Default for PushHub {
    fn default() -> Self {
        Self::new()
    }
}

impl PushHub {
    pub fn new() -> Self {
        let (outbox_tx, outbox_rx) = async_channel::unbounded();
        Self {
            inner: Arc::new(HubInner {
                state: Mutex::new(HubState {
                    connected: false,
                    subscribers: HashMap::new(),
                    disconnect_listeners: Vec::new(),
                    next_id: 0,
                }),
                outbox_tx,
                outbox_rx,
            }),
        }
    }

    /// Requests for the transport to forward to the server.
    pub fn outbox(&self) -> Receiver<ClientRequest> {
        self.inner.outbox_rx.clone()
    }

    /// Update the connection flag.
    ///
    /// Connecting re-subscribes every path that still has listeners. Losing
    /// the connection fires the disconnect listeners.
    pub fn set_connected(&self, connected: bool) {
        let mut state = self.inner.state.lock();
        let was = state.connected;
        state.connected = connected;
        if connected && !was {
            let paths: Vec<String> = state.subscribers.keys().cloned().collect();
            drop(state);
            debug!("push channel connected, resubscribing {} paths", paths.len());
            for path in paths {
                self.inner.send(PushAction::Subscribe, &path);
            }
        } else if !connected && was {
            let listeners: Vec<DisconnectCallback> = state
                .disconnect_listeners
                .iter()
                .map(|(_, cb)| cb.clone())
                .collect();
            drop(state);
            debug!("push channel disconnected");
            for listener in listeners {
                listener();
            }
        }
    }

    /// Tell everyone listening on `path` that it changed.
    pub fn dispatch_change(&self, path: &str) {
        let key = normalize_path(path);
        let callbacks: Vec<PushCallback> = self
            .inner
            .state
            .lock()
            .subscribers
            .get(&key)
            .map(|list| list.iter().map(|(_, cb)| cb.clone()).collect())
            .unwrap_or_default();
        debug!("push: {} ({} listeners)", key, callbacks.len());
        for callback in callbacks {
            callback(&key);
        }
    }

    /// Handle one text frame from the server.
    pub fn handle_message(&self, text: &str) {
        match serde_json::from_str::<ServerMessage>(text) {
            Ok(ServerMessage::Event(event)) => {
                trace!("push event {} on {}", event.event, event.resource);
                self.dispatch_change(&event.resource);
                if let Some(child) = &event.child {
                    self.dispatch_change(child);
                }
                if let Some(version) = &event.version {
                    self.dispatch_change(version);
                }
            }
            Ok(ServerMessage::Status {
                status,
                action,
                resource,
            }) => {
                trace!("push {} {}: {}", action, resource, status);
            }
            Ok(ServerMessage::Error { error, details }) => {
                warn!("push channel error: {} {}", error, details);
            }
            Err(err) => {
                debug!("ignoring malformed push message ({}): {}", err, text);
            }
        }
    }

    pub fn handle_event(&self, event: PushEvent) {
        match event {
            PushEvent::Connected => self.set_connected(true),
            PushEvent::Disconnected => self.set_connected(false),
            PushEvent::Message(text) => self.handle_message(&text),
        }
    }

    /// Drive the hub from a transport's event stream until it closes.
    ///
    /// A closed stream counts as a disconnect.
    pub fn spawn_pump(&self, events: Receiver<PushEvent>) -> tokio::task::JoinHandle<()> {
        let hub = self.clone();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                hub.handle_event(event);
            }
            hub.set_connected(false);
        })
    }

    /// Number of live registrations for `path`.
    pub fn subscriber_count(&self, path: &str) -> usize {
        self.inner
            .state
            .lock()
            .subscribers
            .get(&normalize_path(path))
            .map_or(0, Vec::len)
    }

    /// Number of installed disconnect listeners.
    pub fn disconnect_listener_count(&self) -> usize {
        self.inner.state.lock().disconnect_listeners.len()
    }
}

impl PushChannel for PushHub {
    fn is_connected(&self) -> bool {
        self.inner.state.lock().connected
    }

    fn register(&self, path: &str, callback: PushCallback) -> PushRegistration {
        let key = normalize_path(path);
        let mut state = self.inner.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        let list = state.subscribers.entry(key.clone()).or_default();
        let first = list.is_empty();
        list.push((id, callback));
        let connected = state.connected;
        drop(state);
        if first && connected {
            self.inner.send(PushAction::Subscribe, &key);
        }

        let weak: Weak<HubInner> = Arc::downgrade(&self.inner);
        PushRegistration::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.unregister(&key, id);
            }
        })
    }

    fn on_disconnect(&self, callback: DisconnectCallback) -> PushRegistration {
        let mut state = self.inner.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.disconnect_listeners.push((id, callback));
        drop(state);

        let weak: Weak<HubInner> = Arc::downgrade(&self.inner);
        PushRegistration::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner
                    .state
                    .lock()
                    .disconnect_listeners
                    .retain(|(i, _)| *i != id);
            }
        })
    }
}

impl std::fmt::Debug for PushHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("PushHub")
            .field("connected", &state.connected)
            .field("paths", &state.subscribers.len())
            .finish()
    }
}
