//! SDK configuration.
//!
//! [`CloudConfig`] gathers endpoints, region, timeouts and credentials in one
//! place and builds the token providers and HTTP settings from them. It can be
//! deserialized from any serde format; credentials are never serialized back.

use crate::auth::{
    ApplicationCredentials, ApplicationTokenProvider, IdentityCredentials, IdentityTokenProvider,
    DEFAULT_IDENTITY_URL, DEFAULT_OAUTH_URL,
};
use crate::client::{ClientConfig, RetryPolicy};
use crate::error::{Error, Result};
use crate::types::Region;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;
use validator::Validate;

/// Configuration shared by NHN Cloud clients.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CloudConfig {
    /// OAuth token service base URL
    #[validate(url)]
    #[serde(default = "default_oauth_url")]
    pub oauth_url: String,

    /// Identity service base URL
    #[validate(url)]
    #[serde(default = "default_identity_url")]
    pub identity_url: String,

    /// Region used for catalog lookups
    #[serde(default)]
    pub region: Region,

    /// Request timeout in seconds
    #[validate(range(min = 1, max = 300))]
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Maximum attempts per call, including the first
    #[validate(range(min = 1, max = 10))]
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Emit masked request diagnostics
    #[serde(default)]
    pub debug: bool,

    /// Access key pair for application APIs
    #[validate(nested)]
    #[serde(default, skip_serializing)]
    pub application: Option<ApplicationCredentials>,

    /// Tenant credentials for infrastructure APIs
    #[validate(nested)]
    #[serde(default, skip_serializing)]
    pub identity: Option<IdentityCredentials>,
}

fn default_oauth_url() -> String {
    DEFAULT_OAUTH_URL.to_string()
}

fn default_identity_url() -> String {
    DEFAULT_IDENTITY_URL.to_string()
}

const fn default_request_timeout_secs() -> u64 {
    crate::client::DEFAULT_TIMEOUT_SECS
}

const fn default_max_attempts() -> u32 {
    crate::client::DEFAULT_MAX_ATTEMPTS
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            oauth_url: default_oauth_url(),
            identity_url: default_identity_url(),
            region: Region::default(),
            request_timeout_secs: default_request_timeout_secs(),
            max_attempts: default_max_attempts(),
            debug: false,
            application: None,
            identity: None,
        }
    }
}

impl CloudConfig {
    /// Create a configuration with the public endpoints and default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check ranges, URLs and credentials.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing every invalid field.
    pub fn validated(self) -> Result<Self> {
        self.validate()
            .map_err(|err| Error::Config(format!("Invalid configuration: {err}")))?;
        Ok(self)
    }

    /// Set the OAuth token service URL.
    #[must_use]
    pub fn with_oauth_url(mut self, url: impl Into<String>) -> Self {
        self.oauth_url = url.into();
        self
    }

    /// Set the identity service URL.
    #[must_use]
    pub fn with_identity_url(mut self, url: impl Into<String>) -> Self {
        self.identity_url = url.into();
        self
    }

    /// Set the region.
    #[must_use]
    pub const fn with_region(mut self, region: Region) -> Self {
        self.region = region;
        self
    }

    /// Set request timeout in seconds.
    #[must_use]
    pub const fn with_timeout(mut self, seconds: u64) -> Self {
        self.request_timeout_secs = seconds;
        self
    }

    /// Set the maximum number of attempts per call.
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Enable or disable request diagnostics.
    #[must_use]
    pub const fn with_debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    /// Set application credentials.
    #[must_use]
    pub fn with_application_credentials(mut self, credentials: ApplicationCredentials) -> Self {
        self.application = Some(credentials);
        self
    }

    /// Set identity credentials.
    #[must_use]
    pub fn with_identity_credentials(mut self, credentials: IdentityCredentials) -> Self {
        self.identity = Some(credentials);
        self
    }

    /// Get the request timeout as a Duration.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Parse the OAuth URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL does not parse.
    pub fn parse_oauth_url(&self) -> Result<Url> {
        Url::parse(&self.oauth_url)
            .map_err(|err| Error::Config(format!("Invalid OAuth URL: {err}")))
    }

    /// Parse the identity URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL does not parse.
    pub fn parse_identity_url(&self) -> Result<Url> {
        Url::parse(&self.identity_url)
            .map_err(|err| Error::Config(format!("Invalid identity URL: {err}")))
    }

    /// Retry policy with this configuration's attempt budget.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new().with_max_attempts(self.max_attempts)
    }

    /// HTTP settings derived from this configuration.
    #[must_use]
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new()
            .with_timeout(self.timeout())
            .with_retry_policy(self.retry_policy())
            .with_debug(self.debug)
    }

    /// Build an application token provider from the configured access key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if no application credentials are configured
    /// or they are invalid.
    pub fn application_provider(&self) -> Result<ApplicationTokenProvider> {
        let credentials = self
            .application
            .clone()
            .ok_or_else(|| Error::Config("Application credentials are not configured".to_string()))?;

        let http = self.client_config().build_http_client()?;
        Ok(ApplicationTokenProvider::new(&self.oauth_url, credentials)?.with_http_client(http))
    }

    /// Build an identity token provider from the configured tenant credentials.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if no identity credentials are configured or
    /// they are invalid.
    pub fn identity_provider(&self) -> Result<IdentityTokenProvider> {
        let credentials = self
            .identity
            .clone()
            .ok_or_else(|| Error::Config("Identity credentials are not configured".to_string()))?;

        let http = self.client_config().build_http_client()?;
        Ok(IdentityTokenProvider::new(&self.identity_url, credentials)?.with_http_client(http))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = CloudConfig::new().validated().unwrap();
        assert_eq!(config.oauth_url, DEFAULT_OAUTH_URL);
        assert_eq!(config.identity_url, DEFAULT_IDENTITY_URL);
        assert_eq!(config.region, Region::Kr1);
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.retry_policy().max_attempts, 3);
        assert!(!config.client_config().debug);
    }

    #[test]
    fn test_builder() {
        let config = CloudConfig::new()
            .with_region(Region::Jp1)
            .with_timeout(60)
            .with_max_attempts(5)
            .with_debug(true)
            .with_oauth_url("https://oauth.example.com")
            .with_identity_url("https://identity.example.com")
            .validated()
            .unwrap();

        assert_eq!(config.region, Region::Jp1);
        assert_eq!(config.client_config().timeout, Duration::from_secs(60));
        assert_eq!(config.client_config().retry_policy.max_attempts, 5);
        assert!(config.client_config().debug);
        assert_eq!(
            config.parse_oauth_url().unwrap().as_str(),
            "https://oauth.example.com/"
        );
        assert_eq!(
            config.parse_identity_url().unwrap().host_str(),
            Some("identity.example.com")
        );
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        assert!(CloudConfig::new().with_timeout(0).validated().is_err());
        assert!(CloudConfig::new().with_timeout(301).validated().is_err());
        assert!(CloudConfig::new().with_max_attempts(0).validated().is_err());
        assert!(CloudConfig::new().with_max_attempts(11).validated().is_err());
        assert!(matches!(
            CloudConfig::new().with_oauth_url("not a url").validated(),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_nested_credentials_validated() {
        let result = CloudConfig::new()
            .with_identity_credentials(IdentityCredentials::new("", "user", "pw"))
            .validated();
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_with_credentials() {
        let config: CloudConfig = serde_json::from_value(json!({
            "region": "KR2",
            "max_attempts": 4,
            "application": {"access_key_id": "AKID", "secret_access_key": "s3cr3t"},
            "identity": {"tenant_id": "t-1", "username": "me@example.com", "password": "pw"}
        }))
        .unwrap();

        assert_eq!(config.region, Region::Kr2);
        assert_eq!(config.max_attempts, 4);
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.oauth_url, DEFAULT_OAUTH_URL);
        assert!(config.application_provider().is_ok());

        let provider = config.identity_provider().unwrap();
        assert_eq!(provider.tenant_id(), "t-1");

        // Secrets never serialize
        let rendered = serde_json::to_string(&config).unwrap();
        assert!(!rendered.contains("s3cr3t"));
        assert!(!rendered.contains("AKID"));
        assert!(rendered.contains("\"region\":\"KR2\""));
    }

    #[test]
    fn test_missing_credentials() {
        let config = CloudConfig::new();
        assert!(matches!(
            config.application_provider(),
            Err(Error::Config(_))
        ));
        assert!(matches!(config.identity_provider(), Err(Error::Config(_))));
    }
}
