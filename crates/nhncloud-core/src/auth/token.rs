//! Access tokens issued by the token endpoints.

use super::catalog::ServiceCatalog;
use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};

/// Seconds before expiry at which a token stops being handed out.
pub const SAFETY_BUFFER_SECS: i64 = 300;

/// How a token is presented to downstream services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// OAuth bearer token from the application token endpoint
    Bearer,
    /// Session token from the identity service
    Session,
}

/// Short-lived credential used to authorize API calls.
///
/// The token value is kept in a [`SecretString`] so it never shows up in
/// `Debug` output. Identity tokens also carry the service catalog returned with
/// them, so a token and its catalog are always replaced together.
#[derive(Debug)]
pub struct AccessToken {
    secret: SecretString,
    kind: TokenKind,
    expires_at: DateTime<Utc>,
    catalog: Option<ServiceCatalog>,
}

impl AccessToken {
    /// Create a token without a service catalog.
    #[must_use]
    pub fn new(secret: impl Into<String>, kind: TokenKind, expires_at: DateTime<Utc>) -> Self {
        Self {
            secret: SecretString::from(secret.into()),
            kind,
            expires_at,
            catalog: None,
        }
    }

    /// Attach the service catalog returned alongside the token.
    #[must_use]
    pub fn with_catalog(mut self, catalog: ServiceCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// The raw token value, for building the auth header.
    #[must_use]
    pub fn secret(&self) -> &str {
        self.secret.expose_secret()
    }

    /// Token kind.
    #[must_use]
    pub const fn kind(&self) -> TokenKind {
        self.kind
    }

    /// Absolute expiry instant.
    #[must_use]
    pub const fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Service catalog, for identity tokens.
    #[must_use]
    pub const fn catalog(&self) -> Option<&ServiceCatalog> {
        self.catalog.as_ref()
    }

    /// Returns true while `now + safety buffer < expiry`.
    #[must_use]
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        now + safety_buffer() < self.expires_at
    }

    /// [`is_usable_at`](Self::is_usable_at) against the current time.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.is_usable_at(Utc::now())
    }
}

/// The safety buffer as a [`chrono::Duration`].
#[must_use]
pub fn safety_buffer() -> Duration {
    Duration::seconds(SAFETY_BUFFER_SECS)
}
