use crate::core::client::ClientConfig;
use crate::core::error::{AgoraError, Result};
use crate::core::traits::HttpNetwork;
use crate::core::types::{HttpRequest, HttpResponse, Method};
use async_trait::async_trait;
use reqwest::Client;
use std::collections::BTreeMap;
use tracing::trace;

/// [`HttpNetwork`] over a `reqwest` client.
pub struct NativeNetwork {
    client: Client,
}

impl NativeNetwork {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client with the configured request timeout.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .pool_idle_timeout(std::time::Duration::from_secs(90))
            .build()
            .map_err(|e| AgoraError::Config(e.to_string()))?;
        Ok(Self::new(client))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl HttpNetwork for NativeNetwork {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Put => reqwest::Method::PUT,
            Method::Post => reqwest::Method::POST,
            Method::Delete => reqwest::Method::DELETE,
            Method::Options => reqwest::Method::OPTIONS,
        };
        trace!("{} {} {:?}", request.method, request.url, request.params);

        let mut req_builder = self.client.request(method, &request.url);
        if !request.params.is_empty() {
            req_builder = req_builder.query(&request.params);
        }
        for (k, v) in &request.headers {
            req_builder = req_builder.header(k, v);
        }
        if let Some(body) = &request.body {
            req_builder = req_builder.json(body);
        }

        let response = req_builder
            .send()
            .await
            .map_err(|e| AgoraError::Http(e.to_string()))?;

        let status = response.status().as_u16();
        let mut headers = BTreeMap::new();
        for (k, v) in response.headers() {
            if let Ok(val) = v.to_str() {
                headers.insert(k.as_str().to_string(), val.to_string());
            }
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| AgoraError::Http(e.to_string()))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
