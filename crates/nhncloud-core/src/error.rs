//! Error types for NHN Cloud operations.
//!
//! Every service client reports failures through the same small set of kinds,
//! whichever of the provider's error body shapes came back, so calling code can
//! branch on "is this retryable / is this auth / is this not-found" without
//! looking at response bodies. This module also holds the ordered error-shape
//! parsers and the response-header helpers used during classification.

use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Response header carrying the provider-assigned request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Main error type for NHN Cloud operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The requested resource does not exist (HTTP 404).
    #[error("Not found: {message}")]
    NotFound {
        /// Provider message
        message: String,
        /// Request id reported by the service
        request_id: Option<String>,
    },

    /// Credentials were rejected or the token exchange failed.
    #[error("Authentication failed: {message}")]
    Authentication {
        /// Provider or SDK message
        message: String,
        /// HTTP status, absent when the exchange never got a response
        status: Option<u16>,
        /// Request id reported by the service
        request_id: Option<String>,
    },

    /// The caller is being throttled (HTTP 429).
    #[error("Rate limited: {message}")]
    RateLimit {
        /// Seconds the service asked the caller to wait
        retry_after: Option<u64>,
        /// Provider message
        message: String,
        /// Request id reported by the service
        request_id: Option<String>,
    },

    /// The request was rejected as malformed (HTTP 400).
    #[error("Validation error: {message}")]
    Validation {
        /// Offending field, when the provider names one
        field: Option<String>,
        /// Provider message
        message: String,
        /// Request id reported by the service
        request_id: Option<String>,
    },

    /// Connection, DNS or TLS failure before a response arrived.
    #[error("Network error: {0}")]
    Network(String),

    /// The request or the caller's deadline timed out.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The caller cancelled the operation.
    #[error("Operation cancelled")]
    Cancelled,

    /// Any other HTTP failure.
    #[error("API error {status}: {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Provider-specific error code
        code: Option<String>,
        /// Provider message
        message: String,
        /// Request id reported by the service
        request_id: Option<String>,
        /// Whether repeating the call may succeed
        retryable: bool,
    },

    /// The service catalog has no entry for the requested service type.
    #[error("No endpoint for service `{service_type}` in region `{region}`")]
    EndpointNotFound {
        /// Service type that was looked up
        service_type: String,
        /// Region that was looked up
        region: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A body could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Specialized result type for NHN Cloud operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns true when a failure with this HTTP status may succeed on retry.
#[must_use]
pub const fn is_retryable_status(status: u16) -> bool {
    status >= 500 || status == 429
}

impl Error {
    /// Classify an HTTP failure into the most specific kind.
    ///
    /// 404 maps to [`Error::NotFound`], 401 and 403 to [`Error::Authentication`],
    /// 429 to [`Error::RateLimit`], 400 to [`Error::Validation`] and everything
    /// else to [`Error::Api`], retryable when the status is 5xx.
    #[must_use]
    pub fn from_status(
        status: u16,
        code: Option<String>,
        message: impl Into<String>,
        request_id: Option<String>,
    ) -> Self {
        let message = message.into();
        match status {
            404 => Self::NotFound {
                message,
                request_id,
            },
            401 | 403 => Self::Authentication {
                message,
                status: Some(status),
                request_id,
            },
            429 => Self::RateLimit {
                retry_after: None,
                message,
                request_id,
            },
            400 => Self::Validation {
                field: None,
                message,
                request_id,
            },
            _ => Self::Api {
                status,
                code,
                message,
                request_id,
                retryable: is_retryable_status(status),
            },
        }
    }

    /// Classify a failed response from its status, headers and raw body.
    ///
    /// The body is run through the ordered error-shape parsers; the first shape
    /// that matches supplies the provider code and message. `X-Request-Id` and,
    /// for 429, `Retry-After` are read from the headers.
    #[must_use]
    pub fn from_response(status: u16, headers: &HeaderMap, body: &[u8]) -> Self {
        let request_id = request_id(headers);
        let provider = parse_error_body(body).unwrap_or_default();
        let message = provider
            .message
            .filter(|message| !message.is_empty())
            .unwrap_or_else(|| fallback_message(status, body));

        let error = Self::from_status(status, provider.code, message, request_id);
        let error = match provider.field {
            Some(field) => error.with_field(field),
            None => error,
        };

        match parse_retry_after(headers) {
            Some(seconds) => error.with_retry_after(seconds),
            None => error,
        }
    }

    /// Attach the offending field to a [`Error::Validation`]; other kinds are unchanged.
    #[must_use]
    pub fn with_field(self, field: impl Into<String>) -> Self {
        match self {
            Self::Validation {
                message,
                request_id,
                ..
            } => Self::Validation {
                field: Some(field.into()),
                message,
                request_id,
            },
            other => other,
        }
    }

    /// Attach a retry hint to a [`Error::RateLimit`]; other kinds are unchanged.
    #[must_use]
    pub fn with_retry_after(self, seconds: u64) -> Self {
        match self {
            Self::RateLimit {
                message,
                request_id,
                ..
            } => Self::RateLimit {
                retry_after: Some(seconds),
                message,
                request_id,
            },
            other => other,
        }
    }

    /// Returns true if repeating the failed call may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimit { .. } | Self::Network(_) | Self::Timeout(_) => true,
            Self::Api { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// HTTP status associated with the error, if any.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::NotFound { .. } => Some(404),
            Self::Authentication { status, .. } => *status,
            Self::RateLimit { .. } => Some(429),
            Self::Validation { .. } => Some(400),
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Request id reported by the service, if any.
    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::NotFound { request_id, .. }
            | Self::Authentication { request_id, .. }
            | Self::RateLimit { request_id, .. }
            | Self::Validation { request_id, .. }
            | Self::Api { request_id, .. } => request_id.as_deref(),
            _ => None,
        }
    }

    /// Returns true for [`Error::NotFound`].
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true for [`Error::Authentication`].
    #[must_use]
    pub const fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Returns the error code for this error type.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Authentication { .. } => "AUTHENTICATION",
            Self::RateLimit { .. } => "RATE_LIMIT",
            Self::Validation { .. } => "VALIDATION",
            Self::Network(_) => "NETWORK",
            Self::Timeout(_) => "TIMEOUT",
            Self::Cancelled => "CANCELLED",
            Self::Api { .. } => "API_ERROR",
            Self::EndpointNotFound { .. } => "ENDPOINT_NOT_FOUND",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

// Conversions from external error types
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::Config(format!("invalid URL: {err}"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::Config(err.to_string())
    }
}

/// Fields extracted from a provider error body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderError {
    /// Provider error code (`error_code`, `resultCode` or nested `code`)
    pub code: Option<String>,
    /// Human-readable message
    pub message: Option<String>,
    /// Offending field for validation failures
    pub field: Option<String>,
}

/// Result header returned by application-key APIs.
///
/// These APIs may answer HTTP 200 with `isSuccessful: false`, so a successful
/// status alone does not mean the call succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseHeader {
    /// Whether the provider considers the call successful
    #[serde(default = "default_successful")]
    pub is_successful: bool,
    /// Provider result code (0 on success)
    #[serde(default)]
    pub result_code: i64,
    /// Provider result message
    #[serde(default)]
    pub result_message: String,
}

const fn default_successful() -> bool {
    true
}

impl ResponseHeader {
    /// Turn an unsuccessful header into an [`Error::Api`].
    ///
    /// `status` is the HTTP status the header arrived with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Api`] when `is_successful` is false.
    pub fn into_result(self, status: u16) -> Result<()> {
        if self.is_successful {
            return Ok(());
        }

        Err(Error::Api {
            status,
            code: Some(self.result_code.to_string()),
            message: self.result_message,
            request_id: None,
            retryable: false,
        })
    }
}

type ShapeParser = fn(&Value) -> Option<ProviderError>;

/// Error body shapes in precedence order; the first that matches wins.
const ERROR_SHAPES: &[(&str, ShapeParser)] = &[
    ("result-header", parse_header_shape),
    ("generic", parse_generic_shape),
    ("nested", parse_nested_shape),
];

/// Parse a provider error body using the ordered shape parsers.
///
/// Returns `None` when the body is not JSON or matches none of the shapes.
#[must_use]
pub fn parse_error_body(body: &[u8]) -> Option<ProviderError> {
    let value: Value = serde_json::from_slice(body).ok()?;
    ERROR_SHAPES
        .iter()
        .find_map(|(_, parse)| parse(&value))
}

#[derive(Deserialize)]
struct HeaderShape {
    header: ResponseHeader,
}

/// `{"header": {"resultCode", "resultMessage", "isSuccessful"}}`
fn parse_header_shape(value: &Value) -> Option<ProviderError> {
    let shape: HeaderShape = serde_json::from_value(value.clone()).ok()?;
    Some(ProviderError {
        code: Some(shape.header.result_code.to_string()),
        message: Some(shape.header.result_message),
        field: None,
    })
}

#[derive(Deserialize)]
struct GenericShape {
    message: String,
    #[serde(default)]
    error_code: Option<Value>,
    #[serde(default)]
    field: Option<String>,
}

/// `{"message", "error_code"}`
fn parse_generic_shape(value: &Value) -> Option<ProviderError> {
    let shape: GenericShape = serde_json::from_value(value.clone()).ok()?;
    Some(ProviderError {
        code: shape.error_code.as_ref().and_then(code_string),
        message: Some(shape.message),
        field: shape.field,
    })
}

#[derive(Deserialize)]
struct NestedShape {
    message: String,
    #[serde(default)]
    code: Option<Value>,
}

/// `{"<kind>": {"message", "code"}}`, as returned by the identity and compute services.
fn parse_nested_shape(value: &Value) -> Option<ProviderError> {
    let object = value.as_object()?;
    if object.len() != 1 {
        return None;
    }

    let inner = object.values().next()?;
    let shape: NestedShape = serde_json::from_value(inner.clone()).ok()?;
    Some(ProviderError {
        code: shape.code.as_ref().and_then(code_string),
        message: Some(shape.message),
        field: None,
    })
}

fn code_string(value: &Value) -> Option<String> {
    match value {
        Value::String(code) => Some(code.clone()),
        Value::Number(code) => Some(code.to_string()),
        _ => None,
    }
}

const MAX_FALLBACK_MESSAGE_LEN: usize = 512;

fn fallback_message(status: u16, body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        return reqwest::StatusCode::from_u16(status)
            .ok()
            .and_then(|status| status.canonical_reason())
            .unwrap_or("unknown error")
            .to_string();
    }

    text.chars().take(MAX_FALLBACK_MESSAGE_LEN).collect()
}

/// Read the `X-Request-Id` response header.
#[must_use]
pub fn request_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Read `Retry-After` as whole seconds (delta-seconds or an HTTP date).
#[must_use]
pub fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(seconds) = raw.parse::<u64>() {
        return Some(seconds);
    }

    let moment = chrono::DateTime::parse_from_rfc2822(raw).ok()?;
    let delta = moment.with_timezone(&chrono::Utc) - chrono::Utc::now();
    u64::try_from(delta.num_seconds()).ok().filter(|secs| *secs > 0)
}
