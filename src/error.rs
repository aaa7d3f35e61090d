use std::{collections::HashMap, fmt, time::Duration};

use chrono::{DateTime, Utc};
use reqwest::{header, StatusCode};

use crate::{backoff, transport::HttpResponse, wire::ErrorBody, ConfigError, TransportError};

/// Response header carrying the server-side correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Field name to validation messages, as returned with a 422 response.
pub type FieldErrors = HashMap<String, Vec<String>>;

/// Message, code and correlation id extracted from a failed response.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApiErrorDetails {
    /// Server message, or the HTTP reason phrase when the body had none.
    pub message: String,
    /// Optional machine-readable error code.
    pub code: Option<String>,
    /// Value of `X-Request-Id` (or `request_id` in the body).
    pub request_id: Option<String>,
}

impl fmt::Display for ApiErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if let Some(code) = &self.code {
            write!(f, " (code: {code})")?;
        }
        if let Some(request_id) = &self.request_id {
            write!(f, " [request id: {request_id}]")?;
        }
        Ok(())
    }
}

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum MemoryApiError {
    /// Transport-level failure (connection refused, DNS, reset, ...).
    #[error("network error: {0}")]
    Network(TransportError),
    /// A single attempt exceeded the configured timeout.
    #[error("request timed out after {duration:?}")]
    Timeout { duration: Duration },
    /// HTTP 401.
    #[error("authentication failed: {0}")]
    Authentication(ApiErrorDetails),
    /// HTTP 403.
    #[error("permission denied: {0}")]
    Permission(ApiErrorDetails),
    /// HTTP 404.
    #[error("not found: {0}")]
    NotFound(ApiErrorDetails),
    /// HTTP 422. `field_errors` is `None` when the body carried no `errors` map.
    #[error("validation failed: {details}")]
    Validation {
        details: ApiErrorDetails,
        field_errors: Option<FieldErrors>,
    },
    /// HTTP 429 after the retry budget was spent.
    #[error("rate limited: {details}")]
    RateLimit {
        details: ApiErrorDetails,
        /// Delay requested by the `Retry-After` directive.
        retry_after: Option<Duration>,
        /// Wall-clock instant the directive resolves to.
        reset_at: Option<DateTime<Utc>>,
    },
    /// HTTP 5xx.
    #[error("server error {status}: {details}")]
    Server { status: u16, details: ApiErrorDetails },
    /// Any other non-success status.
    #[error("http error {status}: {details}")]
    Api { status: u16, details: ApiErrorDetails },
    /// The caller's cancellation token fired.
    #[error("request cancelled")]
    Cancelled,
    /// A retry was needed but the upload stream cannot be replayed.
    #[error("upload stream is not seekable and cannot be replayed for a retry")]
    StreamNotSeekable,
    /// Client options failed validation.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    /// The client was closed before the call was made.
    #[error("client has been closed")]
    Closed,
    /// Reading or rewinding the upload stream failed.
    #[error("upload stream error: {0}")]
    Upload(#[from] std::io::Error),
    /// The request could not be built (body serialization, path).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Response body did not match the requested type.
    #[error("decode error: {0}")]
    Decode(String),
}

impl MemoryApiError {
    /// Whether the pipeline may re-attempt a call that failed with this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Timeout { .. } | Self::RateLimit { .. } | Self::Server { .. }
        )
    }

    /// HTTP status for errors produced from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Authentication(_) => Some(401),
            Self::Permission(_) => Some(403),
            Self::NotFound(_) => Some(404),
            Self::Validation { .. } => Some(422),
            Self::RateLimit { .. } => Some(429),
            Self::Server { status, .. } | Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn details(&self) -> Option<&ApiErrorDetails> {
        match self {
            Self::Authentication(details)
            | Self::Permission(details)
            | Self::NotFound(details)
            | Self::Validation { details, .. }
            | Self::RateLimit { details, .. }
            | Self::Server { details, .. }
            | Self::Api { details, .. } => Some(details),
            _ => None,
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        self.details()?.request_id.as_deref()
    }

    /// Server-requested wait for rate-limit errors.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimit { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            Self::Validation { field_errors, .. } => field_errors.as_ref(),
            _ => None,
        }
    }

    /// Classifies a non-success response. Never fails: a malformed body
    /// degrades to the reason phrase.
    pub(crate) fn from_response(response: &HttpResponse, now: DateTime<Utc>) -> Self {
        let status = response.status;
        let body = ErrorBody::parse(&response.body).unwrap_or_default();
        let request_id = response
            .headers
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
            .or(body.request_id);
        let details = ApiErrorDetails {
            message: body
                .message
                .filter(|message| !message.trim().is_empty())
                .unwrap_or_else(|| reason_phrase(status)),
            code: body.code,
            request_id,
        };

        match status {
            StatusCode::UNAUTHORIZED => Self::Authentication(details),
            StatusCode::FORBIDDEN => Self::Permission(details),
            StatusCode::NOT_FOUND => Self::NotFound(details),
            StatusCode::UNPROCESSABLE_ENTITY => Self::Validation {
                details,
                field_errors: body.errors,
            },
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers
                    .get(header::RETRY_AFTER)
                    .and_then(|value| value.to_str().ok())
                    .and_then(|value| backoff::parse_retry_after(value, now));
                let reset_at = retry_after
                    .and_then(|delay| chrono::Duration::from_std(delay).ok())
                    .map(|delay| now + delay);
                Self::RateLimit {
                    details,
                    retry_after,
                    reset_at,
                }
            }
            status if status.is_server_error() => Self::Server {
                status: status.as_u16(),
                details,
            },
            status => Self::Api {
                status: status.as_u16(),
                details,
            },
        }
    }
}

fn reason_phrase(status: StatusCode) -> String {
    status
        .canonical_reason()
        .map(str::to_owned)
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
}
