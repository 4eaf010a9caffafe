//! HTTP transport backed by reqwest.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::{Network, NetworkError};
use crate::http::{Headers, Request, Response};

/// reqwest-backed [`Network`].
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpNetwork {
    client: Client,
}

impl HttpNetwork {
    /// Create a client with no request timeout; transfers are bounded only by
    /// the transport.
    pub fn new() -> Result<Self, NetworkError> {
        Self::build(None)
    }

    /// Create a client that gives up on a transfer after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Result<Self, NetworkError> {
        Self::build(Some(timeout))
    }

    fn build(timeout: Option<Duration>) -> Result<Self, NetworkError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| {
            NetworkError::InvalidRequest(format!("failed to build HTTP client: {}", e))
        })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone());
        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| NetworkError::transport(&request.url, e))?;

        let status = response.status().as_u16();
        let headers: Headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)))
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| NetworkError::transport(&request.url, e))?;

        debug!(url = %request.url, status, bytes = body.len(), "Network fetch complete");

        Ok(Response {
            status,
            headers,
            body: body.to_vec(),
        })
    }
}
