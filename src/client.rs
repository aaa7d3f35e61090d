use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use bytes::Bytes;
use chrono::Utc;
use reqwest::{
    header::{self, HeaderMap, HeaderValue},
    Method, Url,
};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use crate::{
    backoff,
    documents::Documents,
    memories::Memories,
    multipart::FileUpload,
    transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, RequestBody},
    ApiRequest, ClientOptions, MemoryApiError, Result, TransportError,
};

/// `User-Agent` sent unless overridden through [`ClientOptions::headers`].
pub const USER_AGENT: &str = concat!("memory-api-http/", env!("CARGO_PKG_VERSION"));

/// HTTP client for the memory API.
///
/// Every call goes through one retry loop: transient failures (network
/// errors, timeouts, 429 and 5xx responses) are re-attempted with
/// exponential backoff up to [`ClientOptions::max_retries`] times; anything
/// else surfaces immediately as a typed [`MemoryApiError`].
///
/// Clones share one transport. A transport created by the client (or handed
/// over with [`MemoryApiClient::with_owned_transport`]) is released by
/// [`MemoryApiClient::close`] or when the last clone is dropped.
#[derive(Clone)]
pub struct MemoryApiClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    transport: Arc<dyn HttpTransport>,
    owns_transport: bool,
    closed: AtomicBool,
    base_url: Url,
    default_headers: HeaderMap,
    options: ClientOptions,
}

impl ClientInner {
    fn release(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.owns_transport {
            self.transport.close();
        }
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for MemoryApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryApiClient")
            .field("base_url", &self.inner.base_url.as_str())
            .field("options", &self.inner.options)
            .field("owns_transport", &self.inner.owns_transport)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Body source for one logical call, re-materialized per attempt.
enum Payload {
    Json(Option<Bytes>),
    Multipart(FileUpload),
}

impl Payload {
    async fn materialize(&mut self) -> Result<(Option<RequestBody>, Option<HeaderValue>)> {
        match self {
            Self::Json(body) => Ok((
                body.clone().map(RequestBody::Json),
                body.as_ref()
                    .map(|_| HeaderValue::from_static("application/json")),
            )),
            Self::Multipart(upload) => {
                let body = upload.encode().await?;
                Ok((Some(RequestBody::Multipart(body)), None))
            }
        }
    }

    async fn prepare_retry(&mut self) -> Result<()> {
        match self {
            Self::Json(_) => Ok(()),
            Self::Multipart(upload) => upload.rewind().await,
        }
    }
}

impl MemoryApiClient {
    /// Validates `options` and creates a client with its own reqwest
    /// connection pool.
    pub fn new(options: ClientOptions) -> Result<Self> {
        Self::build(options, Arc::new(ReqwestTransport::new()), true)
    }

    /// Creates a client from `MEMORY_API_*` environment variables.
    ///
    /// See [`ClientOptions::from_env`] for the variables read.
    pub fn from_env() -> Result<Self> {
        Self::new(ClientOptions::from_env()?)
    }

    /// Uses a caller-supplied transport. The client never closes it.
    pub fn with_transport(options: ClientOptions, transport: Arc<dyn HttpTransport>) -> Result<Self> {
        Self::build(options, transport, false)
    }

    /// Uses a caller-supplied transport and takes over its lifetime: it is
    /// closed together with the client.
    pub fn with_owned_transport(
        options: ClientOptions,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self> {
        Self::build(options, transport, true)
    }

    fn build(
        options: ClientOptions,
        transport: Arc<dyn HttpTransport>,
        owns_transport: bool,
    ) -> Result<Self> {
        options.validate()?;
        let base_url = options.parsed_base_url()?;

        let mut default_headers = HeaderMap::new();
        default_headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
        default_headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        default_headers.extend(options.header_map()?);
        default_headers.insert(header::AUTHORIZATION, options.authorization()?);

        Ok(Self {
            inner: Arc::new(ClientInner {
                transport,
                owns_transport,
                closed: AtomicBool::new(false),
                base_url,
                default_headers,
                options,
            }),
        })
    }

    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Disposes the client for every clone. An owned transport is closed
    /// exactly once, however often this is called.
    pub fn close(&self) {
        self.inner.release();
    }

    /// Memory CRUD and pagination.
    pub fn memories(&self) -> Memories<'_> {
        Memories::new(self)
    }

    /// Document uploads.
    pub fn documents(&self) -> Documents<'_> {
        Documents::new(self)
    }

    /// Sends a JSON request under the retry policy and returns the first
    /// successful response.
    pub async fn send(
        &self,
        request: ApiRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse> {
        let url = self.endpoint(&request.path, &request.query)?;
        self.execute(request.method, url, Payload::Json(request.body), cancel)
            .await
    }

    /// Uploads `upload` as `multipart/form-data` with `POST`.
    ///
    /// Retries re-read the file from its initial position; a forward-only
    /// upload that needs a retry fails with
    /// [`MemoryApiError::StreamNotSeekable`] instead.
    pub async fn send_multipart(
        &self,
        path: &str,
        upload: FileUpload,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse> {
        let url = self.endpoint(path, &[])?;
        self.execute(Method::POST, url, Payload::Multipart(upload), cancel)
            .await
    }

    fn endpoint(&self, path: &str, query: &[(String, String)]) -> Result<Url> {
        let base = self.inner.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        let mut url = Url::parse(&format!("{base}/{path}")).map_err(|err| {
            MemoryApiError::InvalidRequest(format!("invalid request path '{path}': {err}"))
        })?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    async fn execute(
        &self,
        method: Method,
        url: Url,
        mut payload: Payload,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse> {
        let options = &self.inner.options;
        let mut attempt = 0u32;
        loop {
            if self.is_closed() {
                return Err(MemoryApiError::Closed);
            }
            if cancel.is_cancelled() {
                return Err(MemoryApiError::Cancelled);
            }

            // Reading an upload may stall on a slow source.
            let (body, content_type) = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(MemoryApiError::Cancelled),
                materialized = payload.materialize() => materialized?,
            };
            let mut headers = self.inner.default_headers.clone();
            if let Some(content_type) = content_type {
                headers.insert(header::CONTENT_TYPE, content_type);
            }
            let request = HttpRequest {
                method: method.clone(),
                url: url.clone(),
                headers,
                body,
                timeout: options.timeout(),
            };

            #[cfg(feature = "tracing")]
            tracing::debug!(%method, %url, attempt, "sending request");

            let failure = match self.attempt(request, cancel).await {
                Ok(response) if response.status.is_success() => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(%method, %url, attempt, status = response.status.as_u16(), "request succeeded");
                    return Ok(response);
                }
                Ok(response) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        %method,
                        %url,
                        attempt,
                        status = response.status.as_u16(),
                        request_id = response.request_id().unwrap_or_default(),
                        "request returned error status"
                    );
                    MemoryApiError::from_response(&response, Utc::now())
                }
                Err(err) => err,
            };

            if !failure.is_retryable() || attempt >= options.max_retries {
                #[cfg(feature = "tracing")]
                tracing::warn!(%method, %url, attempts = attempt + 1, error = %failure, "request failed");
                return Err(failure);
            }

            payload.prepare_retry().await?;

            let retry = attempt + 1;
            let delay = failure.retry_after().unwrap_or_else(|| {
                backoff::backoff_delay(retry, options.retry_backoff(), options.max_backoff())
            });

            #[cfg(feature = "tracing")]
            tracing::warn!(
                %method,
                %url,
                retry,
                delay_ms = delay.as_millis() as u64,
                error = %failure,
                "retrying request"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(MemoryApiError::Cancelled),
                _ = sleep(delay) => {}
            }
            attempt = retry;
        }
    }

    /// One physical exchange, bounded by the per-attempt timeout.
    async fn attempt(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse> {
        let duration = request.timeout;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(MemoryApiError::Cancelled),
            outcome = timeout(duration, self.inner.transport.send(request)) => match outcome {
                Err(_) | Ok(Err(TransportError::Timeout)) => Err(MemoryApiError::Timeout { duration }),
                Ok(Err(err)) => Err(MemoryApiError::Network(err)),
                Ok(Ok(response)) => Ok(response),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use async_trait::async_trait;
    use bytes::Bytes;
    use reqwest::{header::HeaderMap, StatusCode};

    use super::{MemoryApiClient, USER_AGENT};
    use crate::{
        transport::{HttpRequest, HttpResponse, HttpTransport},
        ClientOptions, ConfigError, Credential, MemoryApiError, TransportError,
    };

    #[derive(Default)]
    struct CountingTransport {
        closes: AtomicUsize,
    }

    #[async_trait]
    impl HttpTransport for CountingTransport {
        async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
            Ok(HttpResponse {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                body: Bytes::new(),
            })
        }

        fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn options(base_url: &str) -> ClientOptions {
        ClientOptions::new(base_url, Credential::api_key("secret-key"))
    }

    fn client(base_url: &str) -> MemoryApiClient {
        MemoryApiClient::with_transport(options(base_url), Arc::new(CountingTransport::default()))
            .expect("valid options")
    }

    #[test]
    fn invalid_options_fail_before_any_request() {
        let mut opts = options("https://api.example.com");
        opts.credential = None;
        let err = MemoryApiClient::new(opts).expect_err("must fail");
        assert!(matches!(
            err,
            MemoryApiError::Config(ConfigError::MissingCredential)
        ));
    }

    #[test]
    fn endpoint_joins_paths_and_encodes_query() {
        let client = client("https://api.example.com/base/");
        let url = client
            .endpoint(
                "/v1/memories",
                &[
                    ("q".to_owned(), "a b&c".to_owned()),
                    ("limit".to_owned(), "5".to_owned()),
                ],
            )
            .expect("must build");
        assert_eq!(
            url.as_str(),
            "https://api.example.com/base/v1/memories?q=a+b%26c&limit=5"
        );

        let url = client.endpoint("v1/memories", &[]).expect("must build");
        assert_eq!(url.as_str(), "https://api.example.com/base/v1/memories");
    }

    #[test]
    fn default_headers_carry_auth_and_overrides() {
        let opts = options("https://api.example.com").with_header("User-Agent", "custom/1.0");
        let custom = MemoryApiClient::with_transport(opts, Arc::new(CountingTransport::default()))
            .expect("valid options");
        let headers = &custom.inner.default_headers;
        assert_eq!(headers["authorization"], "Bearer secret-key");
        assert!(headers["authorization"].is_sensitive());
        assert_eq!(headers["user-agent"], "custom/1.0");
        assert_eq!(headers["accept"], "application/json");

        let client = client("https://api.example.com");
        assert_eq!(client.inner.default_headers["user-agent"], USER_AGENT);
    }

    #[test]
    fn debug_redacts_credential() {
        let client = client("https://api.example.com");
        let debug = format!("{client:?}");
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("secret-key"));
    }

    #[test]
    fn owned_transport_closed_exactly_once() {
        let transport = Arc::new(CountingTransport::default());
        let client = MemoryApiClient::with_owned_transport(
            options("https://api.example.com"),
            transport.clone(),
        )
        .expect("valid options");
        let clone = client.clone();

        client.close();
        clone.close();
        client.close();
        drop(client);
        drop(clone);

        assert_eq!(transport.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn borrowed_transport_is_never_closed() {
        let transport = Arc::new(CountingTransport::default());
        let client =
            MemoryApiClient::with_transport(options("https://api.example.com"), transport.clone())
                .expect("valid options");
        client.close();
        assert!(client.is_closed());
        drop(client);
        assert_eq!(transport.closes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn drop_of_last_clone_releases_owned_transport() {
        let transport = Arc::new(CountingTransport::default());
        let client = MemoryApiClient::with_owned_transport(
            options("https://api.example.com"),
            transport.clone(),
        )
        .expect("valid options");
        let clone = client.clone();
        drop(client);
        assert_eq!(transport.closes.load(Ordering::SeqCst), 0);
        drop(clone);
        assert_eq!(transport.closes.load(Ordering::SeqCst), 1);
    }
}
