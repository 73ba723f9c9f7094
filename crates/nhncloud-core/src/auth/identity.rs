//! Tenant/username/password (identity) authentication.

use super::cache::TokenCache;
use super::catalog::ServiceCatalog;
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
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use url::Url;
use validator::Validate;

/// Default identity service base URL
pub const DEFAULT_IDENTITY_URL: &str = "https://api-identity-infrastructure.nhncloudservice.com";

/// Header that carries identity session tokens
pub const IDENTITY_AUTH_HEADER: &str = "x-auth-token";

const TOKEN_PATH: &str = "v2.0/tokens";

/// Tenant credentials for the identity service.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct IdentityCredentials {
    /// Tenant (project) ID
    #[validate(length(min = 1))]
    pub tenant_id: String,

    /// API user name, usually the account e-mail
    #[validate(length(min = 1))]
    pub username: String,

    /// API password
    pub password: SecretString,
}

impl IdentityCredentials {
    /// Create identity credentials.
    #[must_use]
    pub fn new(
        tenant_id: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    auth: AuthBody<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthBody<'a> {
    tenant_id: &'a str,
    password_credentials: PasswordCredentials<'a>,
}

#[derive(Serialize)]
struct PasswordCredentials<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access: Access,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Access {
    token: IssuedToken,
    #[serde(default)]
    service_catalog: ServiceCatalog,
}

#[derive(Deserialize)]
struct IssuedToken {
    id: String,
    expires: String,
}

/// Parse the `expires` timestamp, accepting RFC 3339 or a zone-less UTC time.
fn parse_expiry(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(moment) = DateTime::parse_from_rfc3339(raw) {
        return Ok(moment.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|err| malformed_exchange_response(format!("bad expires `{raw}`: {err}")))
}

/// Token provider for the OpenStack-compatible infrastructure APIs.
///
/// Exchanges tenant credentials at `POST {identity_url}/v2.0/tokens`. The
/// response's service catalog is cached with the token and backs
/// [`service_endpoint`](Self::service_endpoint).
#[derive(Debug)]
pub struct IdentityTokenProvider {
    http: Client,
    token_url: Url,
    credentials: IdentityCredentials,
    cache: TokenCache,
}

impl IdentityTokenProvider {
    /// Create a provider for the identity service at `identity_url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an invalid URL or credentials.
    pub fn new(identity_url: impl AsRef<str>, credentials: IdentityCredentials) -> Result<Self> {
        credentials.validate()?;

        let base = Url::parse(identity_url.as_ref())
            .map_err(|err| Error::Config(format!("Invalid identity URL: {err}")))?;

        Ok(Self {
            http: ClientConfig::new().build_http_client()?,
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

    /// Tenant the provider authenticates as.
    #[must_use]
    pub fn tenant_id(&self) -> &str {
        &self.credentials.tenant_id
    }

    /// Service catalog of the current token, refreshing the token if needed.
    ///
    /// # Errors
    ///
    /// Returns the token acquisition error.
    pub async fn catalog(&self, ctx: &CallContext) -> Result<ServiceCatalog> {
        let token = self.token(ctx).await?;
        Ok(token.catalog().cloned().unwrap_or_default())
    }

    /// Resolve the base URL of `service_type` in `region` from the catalog.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EndpointNotFound`] when the catalog has no endpoint for
    /// the service type, or the token acquisition error.
    pub async fn service_endpoint(
        &self,
        ctx: &CallContext,
        service_type: impl AsRef<str> + Send,
        region: impl AsRef<str> + Send,
    ) -> Result<Url> {
        let token = self.token(ctx).await?;
        let (service_type, region) = (service_type.as_ref(), region.as_ref());

        match token.catalog() {
            Some(catalog) => catalog.endpoint(service_type, region),
            None => Err(Error::EndpointNotFound {
                service_type: service_type.to_string(),
                region: region.to_string(),
            }),
        }
    }

    async fn exchange(&self) -> Result<AccessToken> {
        debug!(
            url = %self.token_url,
            tenant_id = %self.credentials.tenant_id,
            "exchanging tenant credentials for token"
        );

        let request = TokenRequest {
            auth: AuthBody {
                tenant_id: &self.credentials.tenant_id,
                password_credentials: PasswordCredentials {
                    username: &self.credentials.username,
                    password: self.credentials.password.expose_secret(),
                },
            },
        };

        let response = self
            .http
            .post(self.token_url.clone())
            .json(&request)
            .send()
            .await
            .map_err(|err| exchange_transport_error(&err))?;

        let body = read_exchange_response(response).await?;
        let payload: TokenResponse =
            serde_json::from_slice(&body).map_err(malformed_exchange_response)?;

        let expires_at = parse_expiry(&payload.access.token.expires)?;
        debug!(
            services = payload.access.service_catalog.entries().len(),
            "identity token issued"
        );

        Ok(
            AccessToken::new(payload.access.token.id, TokenKind::Session, expires_at)
                .with_catalog(payload.access.service_catalog),
        )
    }
}

#[async_trait]
impl TokenProvider for IdentityTokenProvider {
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
        headers.insert(
            HeaderName::from_static(IDENTITY_AUTH_HEADER),
            sensitive_header(token.secret())?,
        );
        Ok(())
    }
}
