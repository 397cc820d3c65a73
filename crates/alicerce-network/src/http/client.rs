//! HTTP client implementation backed by reqwest

use crate::config::NetworkConfig;
use crate::error::TransportError;
use crate::traits::{HttpClient, HttpRequest, HttpResponse};
use async_trait::async_trait;
use std::collections::HashMap;

/// An [`HttpClient`] sending requests with a pooled [`reqwest::Client`].
///
/// Retries are not handled here: the HTTP network stack drives them from
/// the resource's retry policies.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Create a new client with default configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying client can't be built (e.g. the TLS
    /// backend fails to initialize).
    pub fn new() -> Result<Self, TransportError> {
        Self::with_config(&NetworkConfig::default())
    }

    /// Create a new client with the timeouts and pool settings of `config`
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying client can't be built.
    pub fn with_config(config: &NetworkConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .build()
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        Ok(Self { client })
    }

    /// Wrap an existing reqwest client
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut req = self.client.request(request.method, request.url);

        for (key, value) in &request.headers {
            req = req.header(key.as_str(), value.as_str());
        }

        if let Some(body) = request.body {
            req = req.body(body);
        }

        let response = req.send().await?;

        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(key, value)| Some((key.to_string(), value.to_str().ok()?.to_string())))
            .collect();

        let body = response.bytes().await?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
