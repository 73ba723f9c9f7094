//! Authenticated, retrying HTTP transport shared by every service client.
//!
//! A [`ServiceClient`] joins request paths onto a base URL, attaches the token
//! of its [`TokenProvider`], classifies failed responses into [`Error`] kinds
//! and retries the retryable ones according to its [`RetryPolicy`].

use crate::auth::{TokenProvider, APPLICATION_AUTH_HEADER, IDENTITY_AUTH_HEADER};
use crate::client::{ClientConfig, RetryPolicy};
use crate::context::CallContext;
use crate::error::{self, Error, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

const MASK: &str = "****";
const JSON: &str = "application/json";

/// Join `path` onto `base`, treating `base` as a directory.
///
/// `https://host/v2/tenant` + `/servers` gives `https://host/v2/tenant/servers`.
///
/// # Errors
///
/// Returns [`Error::Config`] if the joined URL is invalid.
pub fn join_url(base: &Url, path: &str) -> Result<Url> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }

    let path = path.trim_start_matches('/');
    if path.is_empty() {
        return Ok(base);
    }

    base.join(path)
        .map_err(|err| Error::Config(format!("Invalid request path `{path}`: {err}")))
}

/// Body of a [`RequestSpec`].
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// JSON document, sent as `application/json`
    Json(Value),
    /// Pre-encoded bytes with an explicit content type
    Raw {
        /// Encoded body
        bytes: Vec<u8>,
        /// Value of the `Content-Type` header
        content_type: String,
    },
}

/// One HTTP call to make against a service.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<RequestBody>,
    headers: HeaderMap,
}

impl RequestSpec {
    /// Create a request for `path` relative to the client's base URL.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            headers: HeaderMap::new(),
        }
    }

    /// `GET path`
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// `POST path`
    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// `PUT path`
    #[must_use]
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    /// `PATCH path`
    #[must_use]
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    /// `DELETE path`
    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Append a query parameter.
    #[must_use]
    pub fn query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((name.into(), value.to_string()));
        self
    }

    /// Append a query parameter when `value` is present.
    #[must_use]
    pub fn query_opt<V: ToString>(self, name: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(value) => self.query(name, value),
            None => self,
        }
    }

    /// Append several query parameters.
    #[must_use]
    pub fn query_pairs<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        self.query
            .extend(pairs.into_iter().map(|(k, v)| (k.into(), v.to_string())));
        self
    }

    /// Add a per-call header.
    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Serialize `body` as the JSON request body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if `body` cannot be serialized.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self> {
        self.body = Some(RequestBody::Json(serde_json::to_value(body)?));
        Ok(self)
    }

    /// Use pre-encoded bytes as the request body.
    #[must_use]
    pub fn raw(mut self, bytes: impl Into<Vec<u8>>, content_type: impl Into<String>) -> Self {
        self.body = Some(RequestBody::Raw {
            bytes: bytes.into(),
            content_type: content_type.into(),
        });
        self
    }

    /// HTTP method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Path relative to the base URL.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Query parameters in insertion order.
    #[must_use]
    pub fn query_params(&self) -> &[(String, String)] {
        &self.query
    }

    /// Request body, if any.
    #[must_use]
    pub const fn body(&self) -> Option<&RequestBody> {
        self.body.as_ref()
    }

    /// Per-call headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

/// Status, headers and raw body of a completed call.
#[derive(Debug, Clone)]
pub struct ResponseEnvelope {
    status: u16,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl ResponseEnvelope {
    /// Assemble an envelope.
    #[must_use]
    pub fn new(status: u16, headers: HeaderMap, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// HTTP status code.
    #[must_use]
    pub const fn status(&self) -> u16 {
        self.status
    }

    /// Response headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Raw body bytes.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// `X-Request-Id` response header.
    #[must_use]
    pub fn request_id(&self) -> Option<String> {
        error::request_id(&self.headers)
    }

    /// Returns true when the body is empty or whitespace.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.body.iter().all(u8::is_ascii_whitespace)
    }

    /// Body as text, replacing invalid UTF-8.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decode the body as JSON. An empty body decodes as `null`, so `()` and
    /// `Option<T>` targets accept `204 No Content`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the body does not decode into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        if self.is_empty() {
            return serde_json::from_str("null").map_err(Error::from);
        }
        serde_json::from_slice(&self.body).map_err(Error::from)
    }
}

/// Builder for [`ServiceClient`].
pub struct ServiceClientBuilder {
    service: String,
    base_url: Url,
    auth: Arc<dyn TokenProvider>,
    config: ClientConfig,
    http: Option<Client>,
}

impl ServiceClientBuilder {
    /// Start building a client for `service` rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `base_url` is not a valid URL.
    pub fn new(
        service: impl Into<String>,
        base_url: impl AsRef<str>,
        auth: Arc<dyn TokenProvider>,
    ) -> Result<Self> {
        let service = service.into();
        let base_url = Url::parse(base_url.as_ref())
            .map_err(|err| Error::Config(format!("Invalid base URL for {service}: {err}")))?;

        Ok(Self {
            service,
            base_url,
            auth,
            config: ClientConfig::new(),
            http: None,
        })
    }

    /// Override the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config = self.config.with_retry_policy(policy);
        self
    }

    /// Make a single attempt per call.
    #[must_use]
    pub fn without_retries(mut self) -> Self {
        self.config = self.config.without_retries();
        self
    }

    /// Override the HTTP client configuration, retry policy included.
    #[must_use]
    pub fn with_http_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the per-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_timeout(timeout);
        self
    }

    /// Set the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config = self.config.with_user_agent(user_agent);
        self
    }

    /// Enable masked request diagnostics.
    #[must_use]
    pub fn with_debug(mut self, enabled: bool) -> Self {
        self.config = self.config.with_debug(enabled);
        self
    }

    /// Reuse an existing HTTP client. Timeout, pool and user agent settings
    /// of the configuration are then ignored.
    #[must_use]
    pub fn with_http_client(mut self, http: Client) -> Self {
        self.http = Some(http);
        self
    }

    /// Build the client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the HTTP client cannot be created.
    pub fn build(self) -> Result<ServiceClient> {
        let http = match self.http {
            Some(http) => http,
            None => self.config.build_http_client()?,
        };

        Ok(ServiceClient {
            service: Arc::from(self.service),
            base_url: self.base_url,
            http,
            auth: self.auth,
            retry_policy: self.config.retry_policy,
            debug: self.config.debug,
        })
    }
}

impl fmt::Debug for ServiceClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceClientBuilder")
            .field("service", &self.service)
            .field("base_url", &self.base_url.as_str())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Authenticated HTTP client for one service endpoint.
///
/// Cloning is cheap and clones share the token provider.
#[derive(Clone)]
pub struct ServiceClient {
    service: Arc<str>,
    base_url: Url,
    http: Client,
    auth: Arc<dyn TokenProvider>,
    retry_policy: RetryPolicy,
    debug: bool,
}

impl fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceClient")
            .field("service", &self.service)
            .field("base_url", &self.base_url.as_str())
            .field("retry_policy", &self.retry_policy)
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

impl ServiceClient {
    /// Service name used in diagnostics.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Base URL request paths are joined onto.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Retry policy applied to every call.
    #[must_use]
    pub const fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Token provider attached to every call.
    #[must_use]
    pub fn token_provider(&self) -> &Arc<dyn TokenProvider> {
        &self.auth
    }

    /// Execute `spec`, retrying retryable failures.
    ///
    /// Each attempt asks the token provider for a token, so a token rotated
    /// between attempts is picked up. Failing to obtain a token ends the call
    /// at once. A 401 drops the provider's cached token. When the attempt
    /// budget runs out the last classified error is returned as is.
    ///
    /// # Errors
    ///
    /// Returns the classified failure of the last attempt, the token
    /// provider's error, or [`Error::Cancelled`] / [`Error::Timeout`] when
    /// `ctx` finishes first.
    pub async fn execute(&self, ctx: &CallContext, spec: &RequestSpec) -> Result<ResponseEnvelope> {
        let url = join_url(&self.base_url, spec.path())?;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            ctx.check()?;

            let token = self.auth.token(ctx).await?;
            let mut headers = spec.headers().clone();
            if !headers.contains_key(ACCEPT) {
                headers.insert(ACCEPT, HeaderValue::from_static(JSON));
            }
            self.auth.set_auth_header(&mut headers, &token)?;

            info!(
                service = %self.service,
                method = %spec.method(),
                path = spec.path(),
                attempt,
                "sending request"
            );

            let error = match self.send_once(ctx, &url, spec, headers).await {
                Ok(response) if (200..300).contains(&response.status()) => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    if status == 401 {
                        debug!(service = %self.service, "401 received, dropping cached token");
                        self.auth.reject(&token);
                    }
                    Error::from_response(status, response.headers(), response.body())
                }
                Err(err) => err,
            };

            if !self.retry_policy.should_retry(&error, attempt) {
                return Err(error);
            }

            let delay = retry_delay(&self.retry_policy, &error, attempt);
            debug!(
                service = %self.service,
                error_code = error.error_code(),
                "Retrying request after {:?}",
                delay
            );
            ctx.sleep(delay).await?;
        }
    }

    async fn send_once(
        &self,
        ctx: &CallContext,
        url: &Url,
        spec: &RequestSpec,
        headers: HeaderMap,
    ) -> Result<ResponseEnvelope> {
        if self.debug {
            debug!(
                method = %spec.method(),
                url = %url,
                query = ?spec.query_params(),
                headers = %masked_headers(&headers),
                body = %spec.body().map(masked_body).unwrap_or_default(),
                "request"
            );
        }

        let mut request = self
            .http
            .request(spec.method().clone(), url.clone())
            .headers(headers);
        if !spec.query_params().is_empty() {
            request = request.query(spec.query_params());
        }
        request = match spec.body() {
            Some(RequestBody::Json(value)) => request.json(value),
            Some(RequestBody::Raw {
                bytes,
                content_type,
            }) => request
                .header(CONTENT_TYPE, content_type.as_str())
                .body(bytes.clone()),
            None => request,
        };

        let response = ctx
            .run(async {
                let response = request.send().await?;
                let status = response.status().as_u16();
                let headers = response.headers().clone();
                let body = response.bytes().await?.to_vec();
                Ok(ResponseEnvelope::new(status, headers, body))
            })
            .await?;

        if self.debug {
            debug!(
                status = response.status(),
                headers = %masked_headers(response.headers()),
                bytes = response.body().len(),
                "response"
            );
        }

        Ok(response)
    }

    /// Execute `spec` and decode the JSON response.
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute); also [`Error::Serialization`] when the
    /// body does not decode into `R`.
    pub async fn send<R: DeserializeOwned>(
        &self,
        ctx: &CallContext,
        spec: &RequestSpec,
    ) -> Result<R> {
        self.execute(ctx, spec).await?.json()
    }

    /// `GET path?query` and decode the response.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn get<R: DeserializeOwned>(
        &self,
        ctx: &CallContext,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<R> {
        let spec = RequestSpec::get(path).query_pairs(query.iter().map(|(k, v)| (*k, v)));
        self.send(ctx, &spec).await
    }

    /// `POST path` with a JSON body and decode the response.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn post<B, R>(&self, ctx: &CallContext, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.send(ctx, &RequestSpec::post(path).json(body)?).await
    }

    /// `PUT path` with a JSON body and decode the response.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn put<B, R>(&self, ctx: &CallContext, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.send(ctx, &RequestSpec::put(path).json(body)?).await
    }

    /// `PATCH path` with a JSON body and decode the response.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn patch<B, R>(&self, ctx: &CallContext, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.send(ctx, &RequestSpec::patch(path).json(body)?).await
    }

    /// `DELETE path` and decode the response, if any.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn delete<R: DeserializeOwned>(&self, ctx: &CallContext, path: &str) -> Result<R> {
        self.send(ctx, &RequestSpec::delete(path)).await
    }
}

/// Wait before the attempt after `attempt`.
///
/// A `Retry-After` hint is honoured up to the policy's maximum backoff but
/// never shortens the computed backoff.
fn retry_delay(policy: &RetryPolicy, error: &Error, attempt: u32) -> Duration {
    let backoff = policy.delay_for_attempt(attempt);
    match error {
        Error::RateLimit {
            retry_after: Some(seconds),
            ..
        } => backoff.max(Duration::from_secs(*seconds).min(policy.max_backoff)),
        _ => backoff,
    }
}

fn is_sensitive_header(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    name == AUTHORIZATION.as_str()
        || name == IDENTITY_AUTH_HEADER
        || name == APPLICATION_AUTH_HEADER
        || is_sensitive_key(&name)
}

fn is_sensitive_key(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    ["token", "secret", "pass"]
        .iter()
        .any(|needle| name.contains(needle))
}

fn masked_headers(headers: &HeaderMap) -> String {
    headers
        .iter()
        .map(|(name, value)| {
            let shown = if value.is_sensitive() || is_sensitive_header(name.as_str()) {
                MASK
            } else {
                value.to_str().unwrap_or("<binary>")
            };
            format!("{name}: {shown}")
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn masked_body(body: &RequestBody) -> String {
    match body {
        RequestBody::Json(value) => mask_json(value.clone()).to_string(),
        RequestBody::Raw {
            bytes,
            content_type,
        } => format!("<{} bytes of {content_type}>", bytes.len()),
    }
}

fn mask_json(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| {
                    if is_sensitive_key(&key) {
                        (key, Value::String(MASK.to_string()))
                    } else {
                        (key, mask_json(value))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(mask_json).collect()),
        other => other,
    }
}
