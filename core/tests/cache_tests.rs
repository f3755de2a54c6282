mod common;

use agora_http::{
    well_known, AgoraError, BackendErrorItem, ClientConfig, GetOptions, HttpResponse, Method,
    PushHub, ResourcePath,
};
use common::*;
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;

fn pool_body(path: &str) -> serde_json::Value {
    wire(POOL, &url(path), json!({"adhocracy_core.sheets.pool.IPool": {"elements": []}}))
}

#[tokio::test]
async fn test_concurrent_gets_share_one_request() {
    let h = harness();
    h.network.on(Method::Get, &url("/pool/"), ok(pool_body("/pool/")));

    let path = ResourcePath::real("/pool/");
    let (a, b) = tokio::join!(h.service.get(&path), h.service.get(&path));

    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(h.network.count(Method::Get, &url("/pool/")), 1);
}

#[tokio::test]
async fn test_sequential_gets_hit_cache() {
    let h = harness();
    h.network.on(Method::Get, &url("/pool/"), ok(pool_body("/pool/")));

    h.service.get(&ResourcePath::real("/pool/")).await.unwrap();
    h.service.get(&ResourcePath::real("/pool")).await.unwrap();

    assert_eq!(h.network.count(Method::Get, &url("/pool/")), 1);
}

#[tokio::test]
async fn test_different_params_are_different_entries() {
    let h = harness();
    h.network.on(Method::Get, &url("/pool/"), ok(pool_body("/pool/")));

    let mut params = BTreeMap::new();
    params.insert("depth".to_string(), "2".to_string());
    h.service.get(&ResourcePath::real("/pool/")).await.unwrap();
    h.service
        .get_with(&ResourcePath::real("/pool/"), &params, GetOptions::default())
        .await
        .unwrap();

    assert_eq!(h.network.count(Method::Get, &url("/pool/")), 2);
}

#[tokio::test]
async fn test_disconnected_gets_always_hit_network() {
    let h = harness();
    h.hub.set_connected(false);
    h.network.on(Method::Get, &url("/pool/"), ok(pool_body("/pool/")));

    let path = ResourcePath::real("/pool/");
    h.service.get(&path).await.unwrap();
    h.service.get(&path).await.unwrap();

    assert_eq!(h.network.count(Method::Get, &url("/pool/")), 2);
}

#[tokio::test]
async fn test_bypass_cache() {
    let h = harness();
    h.network.on(Method::Get, &url("/pool/"), ok(pool_body("/pool/")));

    let path = ResourcePath::real("/pool/");
    h.service.get(&path).await.unwrap();
    h.service
        .get_with(&path, &BTreeMap::new(), GetOptions::bypass())
        .await
        .unwrap();

    assert_eq!(h.network.count(Method::Get, &url("/pool/")), 2);
}

#[tokio::test]
async fn test_put_invalidates_path_and_parent() {
    let h = harness();
    h.network.on(Method::Get, &url("/pool/"), ok(pool_body("/pool/")));
    h.network.on(
        Method::Get,
        &url("/pool/a/"),
        ok(wire(PROPOSAL_VERSION, &url("/pool/a/"), json!({TITLE_SHEET: {"title": "old"}}))),
    );
    h.network.on(
        Method::Put,
        &url("/pool/a/"),
        ok(json!({"content_type": PROPOSAL_VERSION, "path": url("/pool/a/")})),
    );

    let pool = ResourcePath::real("/pool/");
    let a = ResourcePath::real("/pool/a/");
    h.service.get(&pool).await.unwrap();
    let resource = h.service.get(&a).await.unwrap();
    assert!(h.service.cache().contains(&url("/pool/")));
    assert!(h.service.cache().contains(&url("/pool/a/")));

    h.service.put(&a, &resource).await.unwrap();
    assert!(!h.service.cache().contains(&url("/pool/")));
    assert!(!h.service.cache().contains(&url("/pool/a/")));

    h.service.get(&pool).await.unwrap();
    h.service.get(&a).await.unwrap();
    assert_eq!(h.network.count(Method::Get, &url("/pool/")), 2);
    assert_eq!(h.network.count(Method::Get, &url("/pool/a/")), 2);
}

#[tokio::test]
async fn test_write_invalidates_reported_updates() {
    let h = harness();
    h.network.on(Method::Get, &url("/other/x/"), ok(pool_body("/other/x/")));
    h.network.on(Method::Get, &url("/other/"), ok(pool_body("/other/")));
    h.network.on(
        Method::Post,
        &url("/pool/"),
        ok(json!({
            "content_type": PROPOSAL_VERSION,
            "path": url("/pool/new/"),
            "updated_resources": {"modified": [url("/other/x/")]}
        })),
    );

    h.service.get(&ResourcePath::real("/other/x/")).await.unwrap();
    h.service.get(&ResourcePath::real("/other/")).await.unwrap();
    let version = h.service.new_resource(PROPOSAL_VERSION).unwrap();
    h.service.post(&ResourcePath::real("/pool/"), &version).await.unwrap();

    assert!(!h.service.cache().contains(&url("/other/x/")));
    assert!(!h.service.cache().contains(&url("/other/")));
}

#[tokio::test]
async fn test_push_notification_invalidates_entry() {
    let h = harness();
    h.network.on(Method::Get, &url("/pool/"), ok(pool_body("/pool/")));

    let path = ResourcePath::real("/pool/");
    h.service.get(&path).await.unwrap();
    h.hub
        .handle_message(&json!({"event": "modified", "resource": url("/pool/")}).to_string());
    h.service.get(&path).await.unwrap();

    assert_eq!(h.network.count(Method::Get, &url("/pool/")), 2);
}

#[tokio::test]
async fn test_disconnect_invalidates_everything() {
    let h = harness();
    h.network.on(Method::Get, &url("/pool/"), ok(pool_body("/pool/")));
    h.network.on(Method::Get, &url("/other/"), ok(pool_body("/other/")));

    h.service.get(&ResourcePath::real("/pool/")).await.unwrap();
    h.service.get(&ResourcePath::real("/other/")).await.unwrap();
    h.hub.set_connected(false);

    assert!(!h.service.cache().contains(&url("/pool/")));
    assert!(!h.service.cache().contains(&url("/other/")));
}

#[tokio::test]
async fn test_expired_entry_refetches_and_resubscribes_once() {
    let h = harness_with(ClientConfig {
        cache_max_age_ms: 50,
        ..config()
    });
    h.network.on(Method::Get, &url("/pool/"), ok(pool_body("/pool/")));

    let path = ResourcePath::real("/pool/");
    h.service.get(&path).await.unwrap();
    assert_eq!(h.hub.subscriber_count(&url("/pool/")), 1);

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(!h.service.cache().contains(&url("/pool/")));

    h.service.get(&path).await.unwrap();
    assert_eq!(h.network.count(Method::Get, &url("/pool/")), 2);
    assert_eq!(h.hub.subscriber_count(&url("/pool/")), 1);
}

#[tokio::test]
async fn test_failed_get_is_not_cached() {
    let h = harness();
    h.network.on(Method::Get, &url("/pool/"), HttpResponse::new(502, "<html>Bad Gateway</html>"));
    h.network.on(Method::Get, &url("/pool/"), ok(pool_body("/pool/")));

    let path = ResourcePath::real("/pool/");
    let err = h.service.get(&path).await.unwrap_err();
    assert_eq!(err, AgoraError::Backend(vec![BackendErrorItem::unknown()]));

    h.service.get(&path).await.unwrap();
    assert_eq!(h.network.count(Method::Get, &url("/pool/")), 2);
}

#[tokio::test]
async fn test_warmup_seeds_elements() {
    let h = harness();
    h.network.on(
        Method::Get,
        &url("/pool/"),
        ok(wire(
            POOL,
            &url("/pool/"),
            json!({"adhocracy_core.sheets.pool.IPool": {"elements": [
                wire(PROPOSAL_VERSION, &url("/pool/a/"), json!({TITLE_SHEET: {"title": "a"}})),
                wire(PROPOSAL_VERSION, &url("/pool/b/"), json!({TITLE_SHEET: {"title": "b"}}))
            ]}}),
        )),
    );

    let pool = h
        .service
        .get_with(&ResourcePath::real("/pool/"), &BTreeMap::new(), GetOptions::warmup())
        .await
        .unwrap();

    let request = &h.network.requests()[0];
    assert_eq!(request.params.get("elements").map(String::as_str), Some("content"));
    assert_eq!(
        pool.sheet(well_known::POOL).unwrap().get("elements"),
        Some(&json!([url("/pool/a/"), url("/pool/b/")]))
    );

    let a = h.service.get(&ResourcePath::real(url("/pool/a/"))).await.unwrap();
    assert_eq!(a.sheet(TITLE_SHEET).unwrap().get("title"), Some(&json!("a")));
    assert_eq!(h.network.count(Method::Get, &url("/pool/a/")), 0);
}

#[tokio::test]
async fn test_warmup_keeps_content_when_requested() {
    let h = harness();
    let element = wire(PROPOSAL_VERSION, &url("/pool/a/"), json!({}));
    h.network.on(
        Method::Get,
        &url("/pool/"),
        ok(wire(
            POOL,
            &url("/pool/"),
            json!({"adhocracy_core.sheets.pool.IPool": {"elements": [element.clone()]}}),
        )),
    );

    let mut params = BTreeMap::new();
    params.insert("elements".to_string(), "content".to_string());
    let pool = h
        .service
        .get_with(&ResourcePath::real("/pool/"), &params, GetOptions::warmup())
        .await
        .unwrap();

    assert_eq!(
        pool.sheet(well_known::POOL).unwrap().get("elements"),
        Some(&json!([element]))
    );
}

#[tokio::test]
async fn test_unrelated_push_hub_does_not_touch_cache() {
    let h = harness();
    h.network.on(Method::Get, &url("/pool/"), ok(pool_body("/pool/")));
    h.service.get(&ResourcePath::real("/pool/")).await.unwrap();

    let other = PushHub::new();
    other.set_connected(true);
    other.dispatch_change(&url("/pool/"));

    assert!(h.service.cache().contains(&url("/pool/")));
}
