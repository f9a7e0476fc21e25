//! HTTP(S) collaborator boundary
//!
//! The resolver only needs two things from an HTTP transport: the fully
//! read response body and the `Content-Encoding` header (for gzip
//! inference). [`HttpOpener`] captures exactly that, with a reqwest-backed
//! default implementation.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;

/// A fetched HTTP response: materialized body plus the transport's
/// content-encoding hint.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub body: Bytes,
    pub content_encoding: Option<String>,
}

impl HttpResponse {
    pub fn new(body: Bytes, content_encoding: Option<String>) -> Self {
        Self {
            body,
            content_encoding,
        }
    }

    /// True when the transport declared a gzip-compressed body.
    pub fn is_gzip(&self) -> bool {
        self.content_encoding.as_deref() == Some("gzip")
    }
}

/// Opens a URL and reads the whole response body.
#[async_trait]
pub trait HttpOpener: Send + Sync {
    async fn open(&self, url: &str) -> Result<HttpResponse>;
}

/// Default opener backed by reqwest.
///
/// Built without reqwest's automatic decompression so both the
/// `Content-Encoding` header and the raw body reach the caller untouched.
#[derive(Debug, Default)]
pub struct ReqwestOpener {
    client: reqwest::Client,
}

impl ReqwestOpener {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HttpOpener for ReqwestOpener {
    async fn open(&self, url: &str) -> Result<HttpResponse> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("failed to fetch URL: {url}"))?;

        let status = response.status();
        if !status.is_success() {
            bail!("HTTP request failed with status {status} for URL: {url}");
        }

        let content_encoding = response
            .headers()
            .get(reqwest::header::CONTENT_ENCODING)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        let body = response
            .bytes()
            .await
            .with_context(|| format!("failed to read response body from: {url}"))?;

        tracing::debug!("fetched {} bytes from: {}", body.len(), url);

        Ok(HttpResponse::new(body, content_encoding))
    }
}
