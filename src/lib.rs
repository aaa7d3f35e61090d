//! `memory-api-http` is an async HTTP client for a memory / knowledge
//! management API.
//!
//! All calls go through one request pipeline ([`MemoryApiClient::send`] and
//! [`MemoryApiClient::send_multipart`]) that handles authentication,
//! per-attempt timeouts, cancellation, retries with exponential backoff and
//! `Retry-After`, and maps failures to [`MemoryApiError`].
//!
//! Resource helpers:
//! - [`MemoryApiClient::memories`]
//! - [`MemoryApiClient::documents`]

pub mod backoff;
mod client;
pub mod documents;
mod error;
pub mod memories;
mod multipart;
mod options;
mod request;
pub mod transport;
mod types;
mod wire;

pub use client::{MemoryApiClient, USER_AGENT};
pub use error::{ApiErrorDetails, FieldErrors, MemoryApiError, REQUEST_ID_HEADER};
pub use multipart::{FileUpload, MultipartBody};
pub use options::{ClientOptions, ConfigError, Credential, RESERVED_HEADERS};
pub use request::ApiRequest;
pub use transport::{
    HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, RequestBody, TransportError,
};
pub use types::{CreateMemory, Document, ListMemories, Memory, Page};

pub use tokio_util::sync::CancellationToken;

pub type Result<T> = std::result::Result<T, MemoryApiError>;
