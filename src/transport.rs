//! Pluggable HTTP transport.
//!
//! The request pipeline talks to the network only through [`HttpTransport`],
//! so tests (or callers with special networking needs) can substitute their
//! own implementation. [`ReqwestTransport`] is the default.

use std::{fmt, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use reqwest::{header::HeaderMap, Method, StatusCode, Url};
use serde::de::DeserializeOwned;

use crate::{error::REQUEST_ID_HEADER, multipart::MultipartBody, MemoryApiError, Result};

/// Request payload handed to the transport.
#[derive(Clone, Debug, PartialEq)]
pub enum RequestBody {
    /// Serialized JSON, sent with `Content-Type: application/json`.
    Json(Bytes),
    /// A file upload. The transport encodes it as `multipart/form-data`
    /// and sets the content type with the boundary.
    Multipart(MultipartBody),
}

/// One physical HTTP request, fully prepared by the pipeline.
#[derive(Clone, Debug)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<RequestBody>,
    /// Per-attempt timeout the transport should enforce.
    pub timeout: Duration,
}

/// Raw response as received from the transport.
#[derive(Clone, Debug)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpResponse {
    /// Deserializes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|err| {
            MemoryApiError::Decode(format!(
                "invalid response JSON: {err}; body: {}",
                String::from_utf8_lossy(&self.body)
            ))
        })
    }

    /// Body as (lossy) UTF-8 text.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn request_id(&self) -> Option<&str> {
        self.headers
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
    }
}

/// Failure below the HTTP layer.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("transport timed out")]
    Timeout,
    #[error("request failed: {0}")]
    Request(String),
    #[error("failed to read response body: {0}")]
    Body(String),
    #[error("transport has been closed")]
    Closed,
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connect(err.to_string())
        } else if err.is_body() || err.is_decode() {
            Self::Body(err.to_string())
        } else {
            Self::Request(err.to_string())
        }
    }
}

/// Sends prepared requests. Implementations must be safe for concurrent use.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError>;

    /// Releases pooled connections. Called at most once, and only by a
    /// client that owns the transport.
    fn close(&self) {}
}

/// [`HttpTransport`] backed by a pooled `reqwest::Client`.
pub struct ReqwestTransport {
    http: Mutex<Option<reqwest::Client>>,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::from_client(reqwest::Client::new())
    }

    /// Wraps a preconfigured `reqwest::Client` (proxies, TLS roots, ...).
    pub fn from_client(http: reqwest::Client) -> Self {
        Self {
            http: Mutex::new(Some(http)),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.http.lock().is_none()
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        // Cloning shares the pool; the lock is not held across the await.
        let http = self.http.lock().clone().ok_or(TransportError::Closed)?;

        let mut builder = http
            .request(request.method, request.url)
            .headers(request.headers)
            .timeout(request.timeout);
        match request.body {
            Some(RequestBody::Json(body)) => builder = builder.body(body),
            Some(RequestBody::Multipart(body)) => {
                let form = body
                    .to_form()
                    .map_err(|err| TransportError::Request(err.to_string()))?;
                builder = builder.multipart(form);
            }
            None => {}
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    fn close(&self) {
        self.http.lock().take();
    }
}
