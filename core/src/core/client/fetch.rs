//! Resource-aware HTTP client.
//!
//! [`HttpService`] is the entry point for the rest of an application: cached
//! reads, writes that invalidate what they touch, batch transactions, and the
//! two multi-request algorithms `deep_post` and `post_new_version_no_fork`.

use crate::core::client::backend_error::{log_backend_batch_error, log_backend_error};
use crate::core::client::native_network::NativeNetwork;
use crate::core::client::retry::{RetryConfig, RetryDecision, RetryState};
use crate::core::client::topo::sort_topologically;
use crate::core::client::transaction::{BatchRequestItem, Transaction};
use crate::core::client::utils::{build_url, query_string};
use crate::core::client::{ClientConfig, HttpCache};
use crate::core::convert::{export_resource, import_resource, ElementsMode, ExportOptions, PoolWarmup};
use crate::core::error::{AgoraError, Result};
use crate::core::meta_api::{well_known, MetaApi};
use crate::core::traits::{AgoraRuntime, HttpNetwork, NativeRuntime, PushChannel};
use crate::core::types::{
    is_root_path, join_path, parent_path, BatchResponse, GetOptions, HttpRequest, HttpResponse,
    Method, PreliminaryNames, Resource, ResourceOptions, ResourcePath, Sheet, UpdatedResources,
    WriteOptions,
};
use futures::future::FutureExt;
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// Headers carrying the logged-in user.
pub const USER_PATH_HEADER: &str = "X-User-Path";
pub const USER_TOKEN_HEADER: &str = "X-User-Token";

#[derive(Clone, Debug, PartialEq, Eq)]
struct Credentials {
    user_path: String,
    token: String,
}

/// Result of [`HttpService::post_new_version_no_fork`].
#[derive(Clone, Debug, PartialEq)]
pub struct NoForkPost {
    pub value: Resource,
    /// The version was re-based onto a newer head than the one asked for.
    pub parent_changed: bool,
}

/// Something that can be turned into a resource.
#[derive(Clone, Debug, PartialEq)]
pub enum Resolvable {
    Path(ResourcePath),
    Resource(Resource),
}

impl From<ResourcePath> for Resolvable {
    fn from(path: ResourcePath) -> Self {
        Resolvable::Path(path)
    }
}

impl From<Resource> for Resolvable {
    fn from(resource: Resource) -> Self {
        Resolvable::Resource(resource)
    }
}

struct ServiceInner {
    network: Arc<dyn HttpNetwork>,
    runtime: Arc<dyn AgoraRuntime>,
    cache: HttpCache,
    meta: Arc<MetaApi>,
    names: Arc<PreliminaryNames>,
    config: ClientConfig,
    credentials: RwLock<Option<Credentials>>,
}

/// Resource client with caching and batch support.
#[derive(Clone)]
pub struct HttpService {
    inner: Arc<ServiceInner>,
}

impl HttpService {
    pub fn new(
        config: ClientConfig,
        meta: MetaApi,
        network: Arc<dyn HttpNetwork>,
        push: Arc<dyn PushChannel>,
        runtime: Arc<dyn AgoraRuntime>,
    ) -> Self {
        let cache = HttpCache::new(push, &config);
        Self {
            inner: Arc::new(ServiceInner {
                network,
                runtime,
                cache,
                meta: Arc::new(meta),
                names: Arc::new(PreliminaryNames::new()),
                config,
                credentials: RwLock::new(None),
            }),
        }
    }

    /// Service over `reqwest` and tokio.
    pub fn native(config: ClientConfig, meta: MetaApi, push: Arc<dyn PushChannel>) -> Result<Self> {
        config.validate()?;
        let network = Arc::new(NativeNetwork::from_config(&config)?);
        Ok(Self::new(config, meta, network, push, Arc::new(NativeRuntime)))
    }

    pub fn cache(&self) -> &HttpCache {
        &self.inner.cache
    }

    pub fn meta(&self) -> &MetaApi {
        &self.inner.meta
    }

    pub fn names(&self) -> &PreliminaryNames {
        &self.inner.names
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Absolute URL for `path`.
    pub fn url(&self, path: &str) -> String {
        build_url(&self.inner.config.rest_url, path)
    }

    // ----- credentials -----

    /// Send `user_path` and `token` with every request from now on.
    ///
    /// Responses depend on permissions, so the whole cache is dropped.
    pub fn set_credentials(&self, user_path: impl Into<String>, token: impl Into<String>) {
        *self.inner.credentials.write() = Some(Credentials {
            user_path: user_path.into(),
            token: token.into(),
        });
        self.inner.cache.invalidate_all();
    }

    pub fn clear_credentials(&self) {
        *self.inner.credentials.write() = None;
        self.inner.cache.invalidate_all();
    }

    pub fn has_credentials(&self) -> bool {
        self.inner.credentials.read().is_some()
    }

    // ----- raw requests -----

    fn request(&self, method: Method, url: String) -> HttpRequest {
        let mut req = HttpRequest::new(method, url);
        if let Some(creds) = self.inner.credentials.read().as_ref() {
            req = req
                .with_header(USER_PATH_HEADER, creds.user_path.clone())
                .with_header(USER_TOKEN_HEADER, creds.token.clone());
        }
        req
    }

    fn reject_preliminary(method: &'static str, path: &str) -> Result<()> {
        if PreliminaryNames::is_preliminary(path) {
            return Err(AgoraError::PreliminaryPath {
                method,
                path: path.to_string(),
            });
        }
        Ok(())
    }

    async fn send(&self, req: HttpRequest) -> Result<HttpResponse> {
        self.inner.network.send(req).await
    }

    /// JSON body of a successful response, or the logged backend error.
    fn success_body(url: &str, response: &HttpResponse) -> Result<Value> {
        if !response.is_success() {
            return Err(log_backend_error(url, response));
        }
        if response.body.is_empty() {
            return Ok(Value::Null);
        }
        response.body_json()
    }

    pub async fn get_raw(&self, path: &str, params: &BTreeMap<String, String>) -> Result<HttpResponse> {
        Self::reject_preliminary("get", path)?;
        let req = self.request(Method::Get, self.url(path)).with_params(params.clone());
        self.send(req).await
    }

    pub async fn put_raw(&self, path: &str, body: Value) -> Result<HttpResponse> {
        Self::reject_preliminary("put", path)?;
        let req = self.request(Method::Put, self.url(path)).with_body(body);
        self.send(req).await
    }

    pub async fn post_raw(&self, path: &str, body: Value) -> Result<HttpResponse> {
        Self::reject_preliminary("post", path)?;
        let req = self.request(Method::Post, self.url(path)).with_body(body);
        self.send(req).await
    }

    // ----- reads -----

    pub async fn get(&self, path: &ResourcePath) -> Result<Resource> {
        self.get_with(path, &BTreeMap::new(), GetOptions::default()).await
    }

    /// GET memoized on `(path, query string)`.
    pub async fn get_with(
        &self,
        path: &ResourcePath,
        params: &BTreeMap<String, String>,
        opts: GetOptions,
    ) -> Result<Resource> {
        let raw = path.require_real("get")?;
        let url = self.url(raw);
        let subkey = query_string(params);

        let mut wire_params = params.clone();
        let warmup = if opts.warmup_pool_cache {
            let original = match params.get("elements") {
                Some(mode) => mode.parse()?,
                None => ElementsMode::Paths,
            };
            wire_params.insert("elements".into(), ElementsMode::Content.as_str().into());
            Some(original)
        } else {
            None
        };

        if opts.bypass_cache {
            return self.fetch_resource(url, wire_params, warmup).await;
        }
        let service = self.clone();
        let key = url.clone();
        self.inner
            .cache
            .memoize(&key, &subkey, move || {
                async move { service.fetch_resource(url, wire_params, warmup).await }.boxed()
            })
            .await
    }

    async fn fetch_resource(
        &self,
        url: String,
        params: BTreeMap<String, String>,
        warmup: Option<ElementsMode>,
    ) -> Result<Resource> {
        let response = self.get_raw(&url, &params).await?;
        let body = Self::success_body(&url, &response)?;
        let warmup = warmup.map(|original_elements| PoolWarmup {
            cache: &self.inner.cache,
            original_elements,
        });
        import_resource(&body, &self.inner.meta, &self.inner.names, warmup.as_ref())
    }

    /// OPTIONS: which methods the backend allows on `path`. Not cached.
    pub async fn options(&self, path: &ResourcePath) -> Result<ResourceOptions> {
        let raw = path.require_real("options")?;
        let url = self.url(raw);
        let response = self.send(self.request(Method::Options, url.clone())).await?;
        let body = Self::success_body(&url, &response)?;
        Ok(ResourceOptions::from_body(body))
    }

    /// Return a resource as-is, or fetch it if only a path is given.
    pub async fn resolve(&self, target: impl Into<Resolvable>) -> Result<Resource> {
        match target.into() {
            Resolvable::Resource(resource) => Ok(resource),
            Resolvable::Path(path) => self.get(&path).await,
        }
    }

    /// Walk from `path` up through its parents until `predicate` matches.
    ///
    /// Returns `None` once the root was checked without a match. Gives up with
    /// [`AgoraError::AncestorDepthExceeded`] after `max_ancestor_depth` reads.
    pub async fn resolve_ancestor<P>(&self, path: &ResourcePath, predicate: P) -> Result<Option<Resource>>
    where
        P: Fn(&Resource) -> bool,
    {
        let start = path.require_real("get")?.to_string();
        let mut current = start.clone();
        for _ in 0..self.inner.config.max_ancestor_depth {
            let resource = self.get(&ResourcePath::real(current.as_str())).await?;
            if predicate(&resource) {
                return Ok(Some(resource));
            }
            if is_root_path(&current) {
                return Ok(None);
            }
            current = parent_path(&current);
        }
        Err(AgoraError::AncestorDepthExceeded {
            path: start,
            depth: self.inner.config.max_ancestor_depth,
        })
    }

    // ----- writes -----

    fn export_body(&self, resource: &Resource, opts: &WriteOptions, creating: bool) -> Result<Value> {
        if opts.no_export {
            return Ok(unfiltered_wire(resource));
        }
        export_resource(
            &self.inner.meta,
            resource,
            ExportOptions {
                keep_metadata: opts.keep_metadata,
                creating,
            },
        )
    }

    fn resolve_updated(&self, updated: &UpdatedResources) -> UpdatedResources {
        let map = |paths: &[String]| paths.iter().map(|p| self.url(p)).collect();
        UpdatedResources {
            changed_descendants: map(&updated.changed_descendants),
            created: map(&updated.created),
            modified: map(&updated.modified),
            removed: map(&updated.removed),
        }
    }

    /// Invalidate what a write touched, then import its result.
    fn finish_write(&self, url: &str, body: Value) -> Result<Resource> {
        let updated = body
            .get("updated_resources")
            .cloned()
            .map(serde_json::from_value::<UpdatedResources>)
            .transpose()?
            .unwrap_or_default();
        let mut touched = vec![url.to_string()];
        if let Some(path) = body.get("path").and_then(Value::as_str) {
            touched.push(self.url(path));
        }
        self.inner
            .cache
            .invalidate_updated(&self.resolve_updated(&updated), &touched);
        import_resource(&body, &self.inner.meta, &self.inner.names, None)
    }

    pub async fn put(&self, path: &ResourcePath, resource: &Resource) -> Result<Resource> {
        self.put_with(path, resource, WriteOptions::default()).await
    }

    pub async fn put_with(
        &self,
        path: &ResourcePath,
        resource: &Resource,
        opts: WriteOptions,
    ) -> Result<Resource> {
        let raw = path.require_real("put")?;
        let url = self.url(raw);
        let body = self.export_body(resource, &opts, false)?;
        let response = self.put_raw(&url, body).await?;
        let body = Self::success_body(&url, &response)?;
        self.finish_write(&url, body)
    }

    /// Create `resource` inside the pool at `parent`.
    pub async fn post(&self, parent: &ResourcePath, resource: &Resource) -> Result<Resource> {
        self.post_with(parent, resource, WriteOptions::default()).await
    }

    pub async fn post_with(
        &self,
        parent: &ResourcePath,
        resource: &Resource,
        opts: WriteOptions,
    ) -> Result<Resource> {
        let raw = parent.require_real("post")?;
        let url = self.url(raw);
        let body = self.export_body(resource, &opts, true)?;
        let response = self.post_raw(&url, body).await?;
        let body = Self::success_body(&url, &response)?;
        self.finish_write(&url, body)
    }

    pub async fn delete(&self, path: &ResourcePath) -> Result<()> {
        let raw = path.require_real("delete")?;
        let url = self.url(raw);
        let response = self.send(self.request(Method::Delete, url.clone())).await?;
        let body = Self::success_body(&url, &response)?;
        let updated = body
            .get("updated_resources")
            .cloned()
            .map(serde_json::from_value::<UpdatedResources>)
            .transpose()?
            .unwrap_or_default();
        self.inner
            .cache
            .invalidate_updated(&self.resolve_updated(&updated), &[url]);
        Ok(())
    }

    /// Mark a resource hidden through its metadata sheet.
    pub async fn hide(&self, path: &ResourcePath, content_type: &str) -> Result<Resource> {
        let resource = Resource::new(content_type, path.clone())
            .with_sheet(well_known::METADATA, Sheet::new().with("hidden", true));
        self.put_with(
            path,
            &resource,
            WriteOptions {
                keep_metadata: true,
                ..Default::default()
            },
        )
        .await
    }

    /// Fresh local resource with preliminary paths, ready to be posted.
    pub fn new_resource(&self, content_type: &str) -> Result<Resource> {
        let schema = self.inner.meta.resource(content_type).ok_or_else(|| {
            AgoraError::Export(format!("unknown content type: {}", content_type))
        })?;
        let mut resource = Resource::new(content_type, self.inner.names.next_preliminary());
        if schema.is_item {
            resource.first_version_path = Some(self.inner.names.next_preliminary());
        }
        Ok(resource)
    }

    // ----- transactions -----

    pub fn transaction(&self) -> Transaction {
        Transaction::new(self.clone())
    }

    /// Run `callback` with a fresh transaction and return what it returns.
    /// The callback is responsible for calling `commit`.
    pub async fn with_transaction<F, Fut, T>(&self, callback: F) -> T
    where
        F: FnOnce(Transaction) -> Fut,
        Fut: Future<Output = T>,
    {
        callback(self.transaction()).await
    }

    pub(crate) async fn send_batch(&self, ops: Vec<BatchRequestItem>) -> Result<Vec<Resource>> {
        if ops.is_empty() {
            return Ok(Vec::new());
        }
        let url = self.url("/batch");
        let body = serde_json::to_value(&ops)?;
        debug!("batch of {} operations to {}", ops.len(), url);
        let response = self.send(self.request(Method::Post, url.clone()).with_body(body)).await?;

        let batch = match response.body_json::<Value>().and_then(BatchResponse::from_value) {
            Ok(batch) => batch,
            Err(_) if !response.is_success() => return Err(log_backend_error(&url, &response)),
            Err(err) => return Err(err),
        };
        if !response.is_success() || batch.responses.iter().any(|r| !r.is_success()) {
            return Err(log_backend_batch_error(&url, response.status, &batch.responses));
        }
        if batch.responses.len() != ops.len() {
            return Err(AgoraError::Import(format!(
                "batch returned {} results for {} operations",
                batch.responses.len(),
                ops.len()
            )));
        }

        let mut updated = batch.updated_resources.clone().unwrap_or_default();
        let mut touched = Vec::new();
        for (op, item) in ops.iter().zip(&batch.responses) {
            if let Some(more) = item.body.get("updated_resources") {
                updated.extend(serde_json::from_value(more.clone())?);
            }
            if op.method == Method::Get {
                continue;
            }
            match item.body.get("path").and_then(Value::as_str) {
                Some(path) => touched.push(self.url(path)),
                None if !PreliminaryNames::is_preliminary(&op.path) => touched.push(op.path.clone()),
                None => {}
            }
        }
        self.inner
            .cache
            .invalidate_updated(&self.resolve_updated(&updated), &touched);

        batch
            .responses
            .iter()
            .map(|item| import_resource(&item.body, &self.inner.meta, &self.inner.names, None))
            .collect()
    }

    /// Post a set of interdependent new resources in one batch.
    ///
    /// Each resource is posted after everything it references; the results
    /// come back in input order.
    pub async fn deep_post(&self, resources: Vec<Resource>) -> Result<Vec<Resource>> {
        let order = sort_topologically(&resources, &self.inner.meta)?;

        let mut tx = self.transaction();
        for &i in &order {
            let resource = &resources[i];
            let parent = resource.parent.as_ref().ok_or_else(|| {
                AgoraError::Export(format!("cannot post {} without a parent", resource.path))
            })?;
            tx.post(parent, resource)?;
        }
        let results = tx.commit().await?;

        let mut by_input: Vec<Option<Resource>> = vec![None; resources.len()];
        for (result, &i) in results.into_iter().zip(&order) {
            by_input[i] = Some(result);
        }
        by_input
            .into_iter()
            .map(|r| r.ok_or_else(|| AgoraError::Import("batch result missing".into())))
            .collect()
    }

    /// Head of a no-fork item's version ladder, read from its LAST tag.
    ///
    /// Always goes to the network. Fails with
    /// [`AgoraError::NoForkViolation`] unless the tag holds exactly one path.
    pub async fn get_newest_version_path_no_fork(&self, item: &ResourcePath) -> Result<ResourcePath> {
        let raw = item.require_real("get")?;
        let tag_path = ResourcePath::real(join_path(raw, well_known::LAST));
        let tag = self
            .get_with(&tag_path, &BTreeMap::new(), GetOptions::bypass())
            .await?;
        let heads = tag
            .sheet(well_known::TAG)
            .map(|sheet| sheet.string_list("elements"))
            .unwrap_or_default();
        match heads.as_slice() {
            [head] => head
                .parse()
                .map_err(|_| AgoraError::InvalidPath(head.clone())),
            _ => Err(AgoraError::NoForkViolation {
                path: raw.to_string(),
                heads,
            }),
        }
    }

    /// Append a version after `old_version_path`, re-basing onto the current
    /// head whenever the server reports a fork conflict.
    ///
    /// Waits with jittered exponential backoff between attempts and gives up
    /// with [`AgoraError::RetryExhausted`] once the attempt budget is spent.
    /// Any other error is returned unchanged.
    pub async fn post_new_version_no_fork(
        &self,
        old_version_path: &ResourcePath,
        resource: &Resource,
        root_versions: Option<Vec<ResourcePath>>,
    ) -> Result<NoForkPost> {
        let old = old_version_path.require_real("post")?;
        let item = ResourcePath::real(parent_path(old));

        let mut version = resource.clone();
        if let Some(root_versions) = root_versions {
            version.root_versions = root_versions;
        }

        let mut state = RetryState::new(RetryConfig::from_client_config(&self.inner.config));
        let mut follows = old_version_path.clone();
        let mut parent_changed = false;
        loop {
            state.record_attempt();
            version.set_follows(&follows);
            match self.post(&item, &version).await {
                Ok(value) => {
                    return Ok(NoForkPost {
                        value,
                        parent_changed,
                    })
                }
                Err(err) if err.is_no_fork_conflict() => match state.on_conflict() {
                    RetryDecision::Retry(wait) => {
                        warn!(
                            "no-fork conflict on {} (attempt {}), retrying in {:?}",
                            item, state.attempts, wait
                        );
                        self.inner.runtime.sleep(wait).await;
                        follows = self.get_newest_version_path_no_fork(&item).await?;
                        parent_changed = true;
                    }
                    RetryDecision::DontRetry => {
                        return Err(AgoraError::RetryExhausted {
                            path: item.to_string(),
                            attempts: state.attempts,
                        });
                    }
                },
                Err(err) => return Err(err),
            }
        }
    }
}

/// Body for `no_export` writes: every sheet and field as held locally.
fn unfiltered_wire(resource: &Resource) -> Value {
    let mut wire = json!({
        "content_type": resource.content_type,
        "data": resource.data,
    });
    if !resource.root_versions.is_empty() {
        wire["root_versions"] = json!(resource.root_versions);
    }
    wire
}

impl std::fmt::Debug for HttpService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpService")
            .field("rest_url", &self.inner.config.rest_url)
            .field("cache", &self.inner.cache)
            .finish()
    }
}
