//! HTTP transport primitive used by the Mattermost client.
//!
//! The rest of the crate only needs "send a request with this method and
//! relative path, give me status + headers + body". Keeping that behind a
//! trait lets the unit tests script the server without a socket.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Method, StatusCode, Url};

use crate::error::{EmojiFsError, Result};

/// Raw answer from the remote side. Non-2xx statuses are still returned here;
/// classification happens in the client.
#[derive(Debug, Clone)]
pub struct RemoteResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RemoteResponse {
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue `method` against `path`, relative to the transport's base URL.
    /// `Err` means the request never produced a response.
    async fn send(&self, method: Method, path: &str) -> Result<RemoteResponse>;
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub base_url: String,
    pub token: String,
    pub timeout: Duration,
}

impl TransportConfig {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// reqwest-backed transport carrying the bearer token on every request.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let base_url = normalize_base_url(&config.base_url)?;

        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.token))
            .map_err(|e| EmojiFsError::InvalidConfig(format!("token is not a valid header: {e}")))?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("emojifs/", env!("CARGO_PKG_VERSION"))),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| EmojiFsError::InvalidConfig(format!("cannot build HTTP client: {e}")))?;

        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, method: Method, path: &str) -> Result<RemoteResponse> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| EmojiFsError::remote(format!("{method} {path}"), e))?;

        let resp = self
            .client
            .request(method.clone(), url)
            .send()
            .await
            .map_err(|e| EmojiFsError::remote(format!("{method} {path}"), e))?;

        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp
            .bytes()
            .await
            .map_err(|e| EmojiFsError::remote(format!("{method} {path}"), e))?;

        Ok(RemoteResponse {
            status,
            headers,
            body,
        })
    }
}

/// `Url::join` drops the last path segment unless the base ends in '/', which
/// would break instances served below a prefix such as `https://host/chat`.
fn normalize_base_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw)
        .map_err(|e| EmojiFsError::InvalidConfig(format!("invalid base url '{raw}': {e}")))?;
    if url.cannot_be_a_base() {
        return Err(EmojiFsError::InvalidConfig(format!(
            "'{raw}' cannot be used as a base url"
        )));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
