use std::{collections::BTreeMap, fmt, time::Duration};

use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Url,
};

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const MAX_TIMEOUT_MS: u64 = 60 * 60 * 1_000;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const MAX_RETRIES_LIMIT: u32 = 10;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 1_000;
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 30_000;

pub const BASE_URL_ENV: &str = "MEMORY_API_BASE_URL";
pub const API_KEY_ENV: &str = "MEMORY_API_KEY";
pub const TOKEN_ENV: &str = "MEMORY_API_TOKEN";
pub const TIMEOUT_SECS_ENV: &str = "MEMORY_API_TIMEOUT_SECS";
pub const MAX_RETRIES_ENV: &str = "MEMORY_API_MAX_RETRIES";

/// Headers the client manages itself; custom headers may not shadow them.
pub const RESERVED_HEADERS: [&str; 11] = [
    "authorization",
    "host",
    "content-length",
    "transfer-encoding",
    "connection",
    "keep-alive",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "upgrade",
];

/// Reason a [`ClientOptions`] value was rejected.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("an API key or bearer token is required")]
    MissingCredential,
    #[error("credential contains characters that are not valid in an HTTP header")]
    InvalidCredential,
    #[error("invalid base url '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("base url '{0}' uses plain http; enable allow_insecure_http to permit it")]
    InsecureBaseUrl(String),
    #[error("timeout must be between 1 ms and 3600000 ms, got {0} ms")]
    InvalidTimeout(u64),
    #[error("max_retries must be at most 10, got {0}")]
    InvalidMaxRetries(u32),
    #[error("max_backoff_ms ({max_ms}) is lower than retry_backoff_ms ({base_ms})")]
    InvalidBackoff { base_ms: u64, max_ms: u64 },
    #[error("header '{0}' is managed by the client and cannot be overridden")]
    ReservedHeader(String),
    #[error("invalid header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },
    #[error("environment variable {name}: {reason}")]
    Environment { name: &'static str, reason: String },
}

/// API credential. Both kinds are sent as `Authorization: Bearer <value>`.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    ApiKey(String),
    BearerToken(String),
}

impl Credential {
    pub fn api_key(value: impl Into<String>) -> Self {
        Self::ApiKey(value.into())
    }

    pub fn bearer_token(value: impl Into<String>) -> Self {
        Self::BearerToken(value.into())
    }

    pub(crate) fn secret(&self) -> &str {
        match self {
            Self::ApiKey(value) | Self::BearerToken(value) => value,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApiKey(_) => f.write_str("ApiKey(<redacted>)"),
            Self::BearerToken(_) => f.write_str("BearerToken(<redacted>)"),
        }
    }
}

/// Configures endpoint, credential, timeout and retry behavior.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientOptions {
    /// Absolute `http`/`https` base URL; request paths are appended to it.
    pub base_url: String,
    pub credential: Option<Credential>,
    /// Per-attempt timeout in milliseconds.
    pub timeout_ms: u64,
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
    /// Base retry backoff in milliseconds (exponential strategy).
    pub retry_backoff_ms: u64,
    /// Upper bound for a single backoff delay before jitter.
    pub max_backoff_ms: u64,
    /// Permits a plain `http` base URL.
    pub allow_insecure_http: bool,
    /// Extra headers attached to every request.
    pub headers: BTreeMap<String, String>,
}

impl ClientOptions {
    pub fn new(base_url: impl Into<String>, credential: Credential) -> Self {
        Self {
            base_url: base_url.into(),
            credential: Some(credential),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
            allow_insecure_http: false,
            headers: BTreeMap::new(),
        }
    }

    /// Builds options from environment variables.
    ///
    /// Reads:
    /// - `MEMORY_API_BASE_URL`: API base URL (required)
    /// - `MEMORY_API_KEY` or `MEMORY_API_TOKEN`: credential (the key wins if both are set)
    /// - `MEMORY_API_TIMEOUT_SECS`: optional per-attempt timeout
    /// - `MEMORY_API_MAX_RETRIES`: optional retry count
    ///
    /// The result is validated before it is returned.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = required_env(BASE_URL_ENV)?;
        let credential = match (optional_env(API_KEY_ENV), optional_env(TOKEN_ENV)) {
            (Some(key), _) => Credential::ApiKey(key),
            (None, Some(token)) => Credential::BearerToken(token),
            (None, None) => return Err(ConfigError::MissingCredential),
        };

        let mut options = Self::new(base_url, credential);
        if let Some(raw) = optional_env(TIMEOUT_SECS_ENV) {
            let secs = parse_env::<u64>(TIMEOUT_SECS_ENV, &raw)?;
            options.timeout_ms = secs.saturating_mul(1_000);
        }
        if let Some(raw) = optional_env(MAX_RETRIES_ENV) {
            options.max_retries = parse_env(MAX_RETRIES_ENV, &raw)?;
        }

        options.validate()?;
        Ok(options)
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the exponential backoff base and cap.
    pub fn with_backoff_ms(mut self, retry_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        self.retry_backoff_ms = retry_backoff_ms;
        self.max_backoff_ms = max_backoff_ms;
        self
    }

    pub fn with_insecure_http(mut self, allow: bool) -> Self {
        self.allow_insecure_http = allow;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub(crate) fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub(crate) fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    /// Checks every invariant. Called once when a client is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.authorization()?;
        self.parsed_base_url()?;
        if self.timeout_ms == 0 || self.timeout_ms > MAX_TIMEOUT_MS {
            return Err(ConfigError::InvalidTimeout(self.timeout_ms));
        }
        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(ConfigError::InvalidMaxRetries(self.max_retries));
        }
        if self.max_backoff_ms < self.retry_backoff_ms {
            return Err(ConfigError::InvalidBackoff {
                base_ms: self.retry_backoff_ms,
                max_ms: self.max_backoff_ms,
            });
        }
        self.header_map()?;
        Ok(())
    }

    pub(crate) fn authorization(&self) -> Result<HeaderValue, ConfigError> {
        let secret = self
            .credential
            .as_ref()
            .map(Credential::secret)
            .filter(|secret| !secret.trim().is_empty())
            .ok_or(ConfigError::MissingCredential)?;
        let mut value = HeaderValue::from_str(&normalize_bearer_authorization(secret))
            .map_err(|_| ConfigError::InvalidCredential)?;
        value.set_sensitive(true);
        Ok(value)
    }

    pub(crate) fn parsed_base_url(&self) -> Result<Url, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidBaseUrl {
            url: self.base_url.clone(),
            reason: reason.to_owned(),
        };
        let url = Url::parse(self.base_url.trim()).map_err(|err| invalid(&err.to_string()))?;
        match url.scheme() {
            "https" => {}
            "http" if self.allow_insecure_http => {}
            "http" => return Err(ConfigError::InsecureBaseUrl(self.base_url.clone())),
            _ => return Err(invalid("scheme must be http or https")),
        }
        if url.cannot_be_a_base() || url.host_str().is_none() {
            return Err(invalid("url must have a host"));
        }
        Ok(url)
    }

    pub(crate) fn header_map(&self) -> Result<HeaderMap, ConfigError> {
        let mut map = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            if RESERVED_HEADERS
                .iter()
                .any(|reserved| reserved.eq_ignore_ascii_case(name.trim()))
            {
                return Err(ConfigError::ReservedHeader(name.clone()));
            }
            let header_name =
                HeaderName::from_bytes(name.trim().as_bytes()).map_err(|err| {
                    ConfigError::InvalidHeader {
                        name: name.clone(),
                        reason: err.to_string(),
                    }
                })?;
            let header_value =
                HeaderValue::from_str(value).map_err(|err| ConfigError::InvalidHeader {
                    name: name.clone(),
                    reason: err.to_string(),
                })?;
            map.insert(header_name, header_value);
        }
        Ok(map)
    }
}

fn normalize_bearer_authorization(token: &str) -> String {
    let trimmed = token.trim();
    let prefix = trimmed.get(..7);
    if prefix.is_some_and(|value| value.eq_ignore_ascii_case("bearer ")) {
        trimmed.to_owned()
    } else {
        format!("Bearer {trimmed}")
    }
}

fn required_env(name: &'static str) -> Result<String, ConfigError> {
    let value = std::env::var(name).map_err(|_| ConfigError::Environment {
        name,
        reason: "not set".to_owned(),
    })?;
    if value.trim().is_empty() {
        return Err(ConfigError::Environment {
            name,
            reason: "set but empty".to_owned(),
        });
    }
    Ok(value)
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn parse_env<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|err| ConfigError::Environment {
            name,
            reason: format!("invalid value '{raw}': {err}"),
        })
}
