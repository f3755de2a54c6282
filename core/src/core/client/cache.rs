//! Response cache with push-driven invalidation.
//!
//! Entries are keyed by normalized path; each entry holds one shared future
//! per request subkey (usually the query string) plus the push registration
//! that invalidates it. Concurrent callers for the same key share a single
//! in-flight request.
//!
//! The cache is only trusted while the push channel is connected. When it is
//! not, [`HttpCache::memoize`] always calls the producer and
//! [`HttpCache::put_cached`] is a no-op.

use crate::core::client::ClientConfig;
use crate::core::error::Result;
use crate::core::traits::{PushChannel, PushRegistration};
use crate::core::types::{normalize_path, parent_path, Resource, UpdatedResources};
use futures::future::{BoxFuture, FutureExt, Shared};
use moka::sync::Cache;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

type SharedResource = Shared<BoxFuture<'static, Result<Resource>>>;

/// One cached path.
struct CacheItem {
    registration: Option<PushRegistration>,
    /// subkey -> (ticket, request)
    promises: Mutex<HashMap<String, (u64, SharedResource)>>,
}

impl CacheItem {
    fn unregister(&self) {
        if let Some(registration) = &self.registration {
            registration.unregister();
        }
    }
}

struct CacheInner {
    entries: Cache<String, Arc<CacheItem>>,
    push: Arc<dyn PushChannel>,
    non_resource_urls: HashSet<String>,
    next_ticket: AtomicU64,
    /// Uninstalls the disconnect listener when the cache goes away.
    _disconnect: PushRegistration,
}

impl CacheInner {
    fn invalidate(&self, path: &str) {
        let key = normalize_path(path);
        if let Some(item) = self.entries.remove(&key) {
            item.unregister();
            debug!("invalidate: {}", key);
        }
    }

    fn invalidate_all(&self) {
        let keys: Vec<String> = self.entries.iter().map(|(k, _)| (*k).clone()).collect();
        for key in keys {
            self.invalidate(&key);
        }
    }

    /// Forget a failed request, unless the slot was reused meanwhile.
    fn drop_failed(&self, key: &str, subkey: &str, ticket: u64) {
        if let Some(item) = self.entries.get(key) {
            let mut promises = item.promises.lock();
            if promises.get(subkey).map(|(t, _)| *t) == Some(ticket) {
                promises.remove(subkey);
                debug!("dropped failed request: {} {}", key, subkey);
            }
        }
    }
}

/// Path-keyed cache of resource requests.
#[derive(Clone)]
pub struct HttpCache {
    inner: Arc<CacheInner>,
}

impl HttpCache {
    pub fn new(push: Arc<dyn PushChannel>, config: &ClientConfig) -> Self {
        let entries = Cache::builder()
            .max_capacity(config.cache_capacity)
            .time_to_live(config.cache_max_age())
            .eviction_listener(|_key, item: Arc<CacheItem>, _cause| item.unregister())
            .build();
        let inner = Arc::new_cyclic(|weak: &Weak<CacheInner>| {
            // A dropped connection may have swallowed any number of notifications.
            let weak = weak.clone();
            let disconnect = push.on_disconnect(Arc::new(move || {
                if let Some(inner) = weak.upgrade() {
                    debug!("push channel closed, invalidating cache");
                    inner.invalidate_all();
                }
            }));
            CacheInner {
                entries,
                push,
                non_resource_urls: config.non_resource_urls().into_iter().collect(),
                next_ticket: AtomicU64::new(0),
                _disconnect: disconnect,
            }
        });

        Self { inner }
    }

    fn get_or_set_cached(&self, key: &str) -> Arc<CacheItem> {
        self.inner.entries.get_with(key.to_string(), || {
            let registration = if self.inner.non_resource_urls.contains(key) {
                None
            } else {
                let weak: Weak<CacheInner> = Arc::downgrade(&self.inner);
                let path = key.to_string();
                Some(self.inner.push.register(
                    key,
                    Arc::new(move |_changed: &str| {
                        if let Some(inner) = weak.upgrade() {
                            inner.invalidate(&path);
                        }
                    }),
                ))
            };
            Arc::new(CacheItem {
                registration,
                promises: Mutex::new(HashMap::new()),
            })
        })
    }

    /// Return the in-flight or completed request for `(path, subkey)`, or
    /// start one with `producer` and remember it.
    ///
    /// A request that fails is forgotten so the next call retries. The
    /// producer runs without any cache lock held, so it may itself use the
    /// cache.
    pub fn memoize<F>(
        &self,
        path: &str,
        subkey: &str,
        producer: F,
    ) -> BoxFuture<'static, Result<Resource>>
    where
        F: FnOnce() -> BoxFuture<'static, Result<Resource>>,
    {
        if !self.inner.push.is_connected() {
            return producer();
        }

        let key = normalize_path(path);
        let item = self.get_or_set_cached(&key);
        if let Some((_, shared)) = item.promises.lock().get(subkey) {
            debug!("cache hit: {} {}", key, subkey);
            return shared.clone().boxed();
        }

        debug!("cache miss: {} {}", key, subkey);
        let ticket = self.inner.next_ticket.fetch_add(1, Ordering::Relaxed);
        let weak = Arc::downgrade(&self.inner);
        let request = producer();
        let (failed_key, failed_subkey) = (key.clone(), subkey.to_string());
        let shared = async move {
            let result = request.await;
            if result.is_err() {
                if let Some(inner) = weak.upgrade() {
                    inner.drop_failed(&failed_key, &failed_subkey, ticket);
                }
            }
            result
        }
        .boxed()
        .shared();

        // The producer may have filled the slot; first one in wins.
        let mut promises = item.promises.lock();
        if let Some((_, existing)) = promises.get(subkey) {
            return existing.clone().boxed();
        }
        promises.insert(subkey.to_string(), (ticket, shared.clone()));
        shared.boxed()
    }

    /// Force a resolved value into the cache.
    pub fn put_cached(&self, path: &str, subkey: &str, value: Resource) {
        if !self.inner.push.is_connected() {
            return;
        }
        let key = normalize_path(path);
        let item = self.get_or_set_cached(&key);
        let ticket = self.inner.next_ticket.fetch_add(1, Ordering::Relaxed);
        let ready = futures::future::ready(Ok(value)).boxed().shared();
        item.promises.lock().insert(subkey.to_string(), (ticket, ready));
        debug!("seeded: {} {}", key, subkey);
    }

    /// Remove and unsubscribe the entry for `path`. Idempotent.
    pub fn invalidate(&self, path: &str) {
        self.inner.invalidate(path);
    }

    /// Invalidate every path the server reported as touched, the parents of
    /// created, modified and removed paths, and each posted path together with
    /// its parent.
    pub fn invalidate_updated(&self, updated: &UpdatedResources, posted: &[String]) {
        let mut paths: BTreeSet<String> = BTreeSet::new();
        paths.extend(updated.changed_descendants.iter().map(|p| normalize_path(p)));
        for path in updated
            .created
            .iter()
            .chain(&updated.modified)
            .chain(&updated.removed)
            .chain(posted)
        {
            paths.insert(normalize_path(path));
            paths.insert(parent_path(path));
        }
        for path in paths {
            self.inner.invalidate(&path);
        }
    }

    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }

    /// Whether any request for `path` is cached.
    pub fn contains(&self, path: &str) -> bool {
        self.inner.entries.contains_key(&normalize_path(path))
    }

    /// Whether a request for `(path, subkey)` is cached.
    pub fn is_cached(&self, path: &str, subkey: &str) -> bool {
        self.inner
            .entries
            .get(&normalize_path(path))
            .is_some_and(|item| item.promises.lock().contains_key(subkey))
    }
}

impl std::fmt::Debug for HttpCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCache")
            .field("entries", &self.inner.entries.entry_count())
            .field("connected", &self.inner.push.is_connected())
            .finish()
    }
}
