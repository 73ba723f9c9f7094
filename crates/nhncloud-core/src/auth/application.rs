//! Access-key (application) authentication.

use super::cache::TokenCache;
use super::token::{AccessToken, TokenKind};
use super::{
    exchange_transport_error, malformed_exchange_response, read_exchange_response,
    sensitive_header, TokenProvider,
};
use crate::client::ClientConfig;
use crate::context::CallContext;
use crate::error::{Error, Result};
use crate::transport::join_url;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::header::{HeaderMap, HeaderName};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;
use url::Url;
use validator::Validate;

/// Default OAuth token service base URL
pub const DEFAULT_OAUTH_URL: &str = "https://oauth.api.nhncloud.com";

/// Header that carries application bearer tokens
pub const APPLICATION_AUTH_HEADER: &str = "x-nhn-authorization";

const TOKEN_PATH: &str = "oauth2/token/create";

/// User access key pair.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ApplicationCredentials {
    /// User access key ID
    #[validate(length(min = 1))]
    pub access_key_id: String,

    /// Secret access key
    pub secret_access_key: SecretString,
}

impl ApplicationCredentials {
    /// Create credentials from a key pair.
    #[must_use]
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: SecretString::from(secret_access_key.into()),
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    expires_in: i64,
}

/// Token provider for APIs authenticated with a user access key.
///
/// Exchanges the key pair via HTTP Basic auth at
/// `POST {oauth_url}/oauth2/token/create` and sends the result as
/// `x-nhn-authorization: Bearer <token>`.
#[derive(Debug)]
pub struct ApplicationTokenProvider {
    http: Client,
    token_url: Url,
    credentials: ApplicationCredentials,
    cache: TokenCache,
}

impl ApplicationTokenProvider {
    /// Create a provider for the token service at `oauth_url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an invalid URL or credentials.
    pub fn new(oauth_url: impl AsRef<str>, credentials: ApplicationCredentials) -> Result<Self> {
        credentials.validate()?;

        let base = Url::parse(oauth_url.as_ref())
            .map_err(|err| Error::Config(format!("Invalid OAuth URL: {err}")))?;
        let http = ClientConfig::new().build_http_client()?;

        Ok(Self {
            http,
            token_url: join_url(&base, TOKEN_PATH)?,
            credentials,
            cache: TokenCache::new(),
        })
    }

    /// Use an existing HTTP client for token exchanges.
    #[must_use]
    pub fn with_http_client(mut self, http: Client) -> Self {
        self.http = http;
        self
    }

    /// The token endpoint URL.
    #[must_use]
    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    async fn exchange(&self) -> Result<AccessToken> {
        debug!(url = %self.token_url, "exchanging access key for token");

        let response = self
            .http
            .post(self.token_url.clone())
            .basic_auth(
                &self.credentials.access_key_id,
                Some(self.credentials.secret_access_key.expose_secret()),
            )
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|err| exchange_transport_error(&err))?;

        let body = read_exchange_response(response).await?;
        let payload: TokenResponse =
            serde_json::from_slice(&body).map_err(malformed_exchange_response)?;

        if payload.expires_in <= 0 {
            return Err(malformed_exchange_response(format!(
                "non-positive expires_in {}",
                payload.expires_in
            )));
        }
        if let Some(token_type) = payload.token_type.as_deref() {
            if !token_type.eq_ignore_ascii_case("bearer") {
                return Err(malformed_exchange_response(format!(
                    "unsupported token_type `{token_type}`"
                )));
            }
        }

        let expires_at = Duration::try_seconds(payload.expires_in)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .ok_or_else(|| {
                malformed_exchange_response(format!(
                    "expires_in {} out of range",
                    payload.expires_in
                ))
            })?;
        Ok(AccessToken::new(
            payload.access_token,
            TokenKind::Bearer,
            expires_at,
        ))
    }
}

#[async_trait]
impl TokenProvider for ApplicationTokenProvider {
    async fn token(&self, ctx: &CallContext) -> Result<Arc<AccessToken>> {
        self.cache.get_or_refresh(ctx, || self.exchange()).await
    }

    fn invalidate(&self) {
        self.cache.clear();
    }

    fn reject(&self, token: &Arc<AccessToken>) {
        if self.cache.clear_if(token) {
            debug!("rejected token dropped");
        }
    }

    fn set_auth_header(&self, headers: &mut HeaderMap, token: &AccessToken) -> Result<()> {
        let value = sensitive_header(&format!("Bearer {}", token.secret()))?;
        headers.insert(HeaderName::from_static(APPLICATION_AUTH_HEADER), value);
        Ok(())
    }
}
