//! Credential-to-token exchange for NHN Cloud APIs.
//!
//! Two providers implement [`TokenProvider`]:
//!
//! - [`ApplicationTokenProvider`] exchanges an access key pair for an OAuth
//!   bearer token (no catalog).
//! - [`IdentityTokenProvider`] exchanges tenant/username/password for a session
//!   token plus the per-region service catalog.
//!
//! Each provider owns its cached token. A token is handed out while
//! `now + 5 minutes < expiry`; otherwise the next caller refreshes it inside an
//! exclusive section that every other caller waits on.

mod application;
mod cache;
mod catalog;
mod identity;
mod token;

pub use application::{
    ApplicationCredentials, ApplicationTokenProvider, APPLICATION_AUTH_HEADER, DEFAULT_OAUTH_URL,
};
pub use catalog::{CatalogEndpoint, CatalogEntry, ServiceCatalog};
pub use identity::{
    IdentityCredentials, IdentityTokenProvider, DEFAULT_IDENTITY_URL, IDENTITY_AUTH_HEADER,
};
pub use token::{safety_buffer, AccessToken, TokenKind, SAFETY_BUFFER_SECS};

use crate::context::CallContext;
use crate::error::{self, Error, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Response;
use std::sync::Arc;

/// Produces access tokens and attaches them to outgoing requests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Return a usable token, refreshing it if the cached one is missing or
    /// about to expire.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Authentication`] if the exchange fails, or
    /// [`Error::Cancelled`] / [`Error::Timeout`] if `ctx` finishes first.
    async fn token(&self, ctx: &CallContext) -> Result<Arc<AccessToken>>;

    /// Drop the cached token so the next [`token`](Self::token) call exchanges again.
    fn invalidate(&self);

    /// Report that the server refused `token`.
    ///
    /// The cached token is dropped only while it is still `token`, so a late
    /// rejection does not discard a token another caller just refreshed.
    fn reject(&self, token: &Arc<AccessToken>) {
        let _ = token;
        self.invalidate();
    }

    /// Attach `token` using this provider's header convention.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Authentication`] if the token is not a valid header value.
    fn set_auth_header(&self, headers: &mut HeaderMap, token: &AccessToken) -> Result<()>;
}

/// Build a sensitive header value from a token string.
pub(crate) fn sensitive_header(value: &str) -> Result<HeaderValue> {
    let mut value = HeaderValue::from_str(value).map_err(|_| Error::Authentication {
        message: "token contains characters that are not valid in a header".to_string(),
        status: None,
        request_id: None,
    })?;
    value.set_sensitive(true);
    Ok(value)
}

/// Failure before the token endpoint answered.
pub(crate) fn exchange_transport_error(err: &reqwest::Error) -> Error {
    Error::Authentication {
        message: format!("token exchange failed: {err}"),
        status: None,
        request_id: None,
    }
}

/// Read a token endpoint response, turning any non-2xx answer into
/// [`Error::Authentication`].
pub(crate) async fn read_exchange_response(response: Response) -> Result<Vec<u8>> {
    let status = response.status();
    let request_id = error::request_id(response.headers());
    let body = response
        .bytes()
        .await
        .map_err(|err| exchange_transport_error(&err))?;

    if status.is_success() {
        return Ok(body.to_vec());
    }

    let message = error::parse_error_body(&body)
        .and_then(|provider| provider.message)
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| format!("token endpoint returned {status}"));

    Err(Error::Authentication {
        message,
        status: Some(status.as_u16()),
        request_id,
    })
}

/// Failure decoding a 2xx token endpoint response.
pub(crate) fn malformed_exchange_response(detail: impl std::fmt::Display) -> Error {
    Error::Authentication {
        message: format!("malformed token response: {detail}"),
        status: None,
        request_id: None,
    }
}
