//! Simple GET request example
//!
//! Loads the meta API from a running backend, then fetches and prints one
//! resource.
//!
//! Run with: cargo run --example simple_get -- http://localhost:6541 /adhocracy/

use agora_http::client::NativeNetwork;
use agora_http::{
    fetch_meta_api, ClientConfig, HttpService, NativeRuntime, OfflinePush, ResourcePath,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let config = ClientConfig {
        rest_url: args.next().unwrap_or_else(|| ClientConfig::default().rest_url),
        ..Default::default()
    };
    let path = ResourcePath::real(args.next().unwrap_or_else(|| "/".to_string()));

    println!("Simple GET Request Example");
    println!("==========================\n");

    let network = Arc::new(NativeNetwork::from_config(&config)?);
    let meta = fetch_meta_api(network.as_ref(), &config).await?;
    println!("Meta API: {} resource types\n", meta.resource_count());

    // No websocket here, so nothing is cached.
    let service = HttpService::new(
        config,
        meta,
        network,
        Arc::new(OfflinePush),
        Arc::new(NativeRuntime),
    );

    match service.get(&path).await {
        Ok(resource) => {
            println!("Content type: {}", resource.content_type);
            println!("Path: {}", resource.path);
            for (sheet, fields) in &resource.data {
                println!("  {}: {} fields", sheet, fields.fields().count());
            }
        }
        Err(e) => {
            eprintln!("Request failed: {}", e);
        }
    }

    Ok(())
}
