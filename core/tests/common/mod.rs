//! Shared fixtures for integration tests: a scripted network, a runtime
//! that records sleeps, and a small meta API.

#![allow(dead_code)]

use agora_http::{
    AgoraRuntime, ClientConfig, HttpNetwork, HttpRequest, HttpResponse, HttpService, MetaApi,
    Method, PushHub, Result,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

pub const REST: &str = "http://test";

pub const POOL: &str = "adhocracy_core.resources.pool.IBasicPool";
pub const PROPOSAL: &str = "adhocracy_core.resources.proposal.IProposal";
pub const PROPOSAL_VERSION: &str = "adhocracy_core.resources.proposal.IProposalVersion";
pub const TAG: &str = "adhocracy_core.resources.tag.ITag";

pub const TITLE_SHEET: &str = "adhocracy_core.sheets.title.ITitle";

pub fn url(path: &str) -> String {
    format!("{}{}", REST, path)
}

pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

pub fn meta_api() -> MetaApi {
    MetaApi::from_value(json!({
        "sheets": {
            "adhocracy_core.sheets.pool.IPool": {"fields": [
                {"name": "elements", "readable": true,
                 "valuetype": "adhocracy_core.schema.AbsolutePath", "containertype": "list"}
            ]},
            "adhocracy_core.sheets.versions.IVersionable": {"fields": [
                {"name": "follows", "readable": true, "creatable": true,
                 "valuetype": "adhocracy_core.schema.AbsolutePath", "containertype": "list"}
            ]},
            "adhocracy_core.sheets.tags.ITag": {"fields": [
                {"name": "elements", "readable": true, "editable": true,
                 "valuetype": "adhocracy_core.schema.AbsolutePath", "containertype": "list"}
            ]},
            "adhocracy_core.sheets.metadata.IMetadata": {"fields": [
                {"name": "creator", "readable": true,
                 "valuetype": "adhocracy_core.schema.AbsolutePath"},
                {"name": "hidden", "readable": true, "valuetype": "Boolean"}
            ]},
            "adhocracy_core.sheets.title.ITitle": {"fields": [
                {"name": "title", "readable": true, "editable": true, "valuetype": "String"},
                {"name": "slug", "readable": true, "valuetype": "String"}
            ]}
        },
        "resources": {
            "adhocracy_core.resources.pool.IBasicPool": {
                "sheets": ["adhocracy_core.sheets.pool.IPool", "adhocracy_core.sheets.metadata.IMetadata"],
                "super_types": ["adhocracy_core.interfaces.IPool"]
            },
            "adhocracy_core.resources.proposal.IProposal": {
                "sheets": ["adhocracy_core.sheets.pool.IPool", "adhocracy_core.sheets.metadata.IMetadata"],
                "super_types": ["adhocracy_core.interfaces.IItem", "adhocracy_core.interfaces.IPool"]
            },
            "adhocracy_core.resources.proposal.IProposalVersion": {
                "sheets": [
                    "adhocracy_core.sheets.versions.IVersionable",
                    "adhocracy_core.sheets.title.ITitle",
                    "adhocracy_core.sheets.metadata.IMetadata"
                ],
                "super_types": ["adhocracy_core.interfaces.IItemVersion"]
            },
            "adhocracy_core.resources.tag.ITag": {
                "sheets": ["adhocracy_core.sheets.tags.ITag"]
            }
        }
    }))
    .expect("fixture meta api")
}

/// Wire form of a resource.
pub fn wire(content_type: &str, path: &str, data: Value) -> Value {
    json!({"content_type": content_type, "path": path, "data": data})
}

pub fn ok(body: Value) -> HttpResponse {
    HttpResponse::json(200, &body)
}

pub fn backend_error(status: u16, name: &str, location: &str, description: &str) -> HttpResponse {
    HttpResponse::json(
        status,
        &json!({"status": "error", "errors": [
            {"name": name, "location": location, "description": description}
        ]}),
    )
}

pub fn no_fork_error() -> HttpResponse {
    backend_error(
        400,
        "data.adhocracy_core.sheets.versions.IVersionable.follows",
        "body",
        "No fork allowed - valid follows resources are: /proposals/p/VERSION_0000002/",
    )
}

pub fn last_tag(item: &str, heads: &[&str]) -> HttpResponse {
    ok(wire(
        TAG,
        &format!("{}LAST/", item),
        json!({"adhocracy_core.sheets.tags.ITag": {"elements": heads}}),
    ))
}

/// Network that answers from per-(method, url) queues and records requests.
///
/// The last queued response of a route is repeated once the queue runs dry.
#[derive(Default)]
pub struct MockNetwork {
    routes: Mutex<HashMap<(Method, String), VecDeque<HttpResponse>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on(&self, method: Method, url: &str, response: HttpResponse) {
        self.routes
            .lock()
            .entry((method, url.to_string()))
            .or_default()
            .push_back(response);
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    pub fn count(&self, method: Method, url: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.method == method && r.url == url)
            .count()
    }

    pub fn last_body(&self, method: Method, url: &str) -> Option<Value> {
        self.requests
            .lock()
            .iter()
            .rev()
            .find(|r| r.method == method && r.url == url)
            .and_then(|r| r.body.clone())
    }
}

#[async_trait]
impl HttpNetwork for MockNetwork {
    async fn send(&self, req: HttpRequest) -> Result<HttpResponse> {
        self.requests.lock().push(req.clone());
        // Let concurrent callers overlap while this request is "in flight".
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        let mut routes = self.routes.lock();
        let response = match routes.get_mut(&(req.method, req.url.clone())) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        Ok(response.unwrap_or_else(|| {
            backend_error(404, "path", "url", &format!("no route for {} {}", req.method, req.url))
        }))
    }
}

/// Runtime that records requested sleeps and returns immediately.
#[derive(Default)]
pub struct RecordingRuntime {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }
}

impl AgoraRuntime for RecordingRuntime {
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>> {
        self.sleeps.lock().push(duration);
        Box::pin(async {})
    }
}

pub fn config() -> ClientConfig {
    ClientConfig {
        rest_url: REST.to_string(),
        ..Default::default()
    }
}

pub struct Harness {
    pub service: HttpService,
    pub network: Arc<MockNetwork>,
    pub runtime: Arc<RecordingRuntime>,
    pub hub: PushHub,
}

/// Service wired to mocks, with the push channel connected.
pub fn harness() -> Harness {
    harness_with(config())
}

pub fn harness_with(config: ClientConfig) -> Harness {
    init_test_tracing();
    let network = MockNetwork::new();
    let runtime = RecordingRuntime::new();
    let hub = PushHub::new();
    hub.set_connected(true);
    let service = HttpService::new(
        config,
        meta_api(),
        network.clone(),
        Arc::new(hub.clone()),
        runtime.clone(),
    );
    Harness {
        service,
        network,
        runtime,
        hub,
    }
}
