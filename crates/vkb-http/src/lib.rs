//! reqwest adapter for the core `Transport` port.
//!
//! TLS is rustls with its bundled roots, so certificates are verified.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use vkb_core::{
    errors::{Error, TransportError},
    ports::{HttpResponse, Transport},
    Result,
};

#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("vkb/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::External(format!("http client build failed: {e}")))?;
        Ok(Self { http })
    }

    /// Use a preconfigured client (proxies, custom roots).
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(
        &self,
        url: &str,
        timeout: Duration,
    ) -> std::result::Result<HttpResponse, TransportError> {
        let resp = self
            .http
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(map_err)?;
        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(map_err)?;
        debug!(status, bytes = body.len(), "http get");
        Ok(HttpResponse::new(status, body))
    }
}

// reqwest errors carry the request URL, and ours hold the access token.
fn map_err(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Request(e.without_url().to_string())
    }
}
