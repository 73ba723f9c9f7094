//! Asynchronous Instance API client implementation.

use crate::models::{
    CreateServerEnvelope, CreateServerRequest, Flavor, FlavorList, KeyPair, KeyPairList, Server,
    ServerCreated, ServerEnvelope, ServerList, ServerListParams,
};
use crate::Result;
use nhncloud_core::auth::{IdentityTokenProvider, TokenProvider};
use nhncloud_core::client::{ClientConfig, RetryPolicy};
use nhncloud_core::types::{Region, ServiceType};
use nhncloud_core::{CallContext, ServiceClient, ServiceClientBuilder};
use std::sync::Arc;
use tracing::debug;
use url::Url;

const SERVICE: &str = "compute";
const USER_AGENT: &str = concat!("nhncloud-compute/", env!("CARGO_PKG_VERSION"));

/// Builder for [`ComputeClient`].
#[derive(Debug)]
pub struct ComputeClientBuilder {
    inner: ServiceClientBuilder,
}

impl ComputeClientBuilder {
    /// Create a builder for the tenant-scoped endpoint at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `base_url` is invalid.
    pub fn new(base_url: impl AsRef<str>, auth: Arc<dyn TokenProvider>) -> Result<Self> {
        let inner = ServiceClientBuilder::new(SERVICE, base_url, auth)?.with_user_agent(USER_AGENT);
        Ok(Self { inner })
    }

    /// Override the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.inner = self.inner.with_retry_policy(retry);
        self
    }

    /// Override the HTTP client configuration.
    #[must_use]
    pub fn with_http_config(mut self, config: ClientConfig) -> Self {
        self.inner = self.inner.with_http_config(config);
        self
    }

    /// Enable masked request diagnostics.
    #[must_use]
    pub fn with_debug(mut self, enabled: bool) -> Self {
        self.inner = self.inner.with_debug(enabled);
        self
    }

    /// Build the client.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the HTTP client cannot be created.
    pub fn build(self) -> Result<ComputeClient> {
        Ok(ComputeClient {
            inner: self.inner.build()?,
        })
    }
}

/// Asynchronous Instance API client.
#[derive(Debug, Clone)]
pub struct ComputeClient {
    inner: ServiceClient,
}

impl ComputeClient {
    /// Construct a client directly from the base URL.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `base_url` is invalid.
    pub fn new(base_url: impl AsRef<str>, auth: Arc<dyn TokenProvider>) -> Result<Self> {
        ComputeClientBuilder::new(base_url, auth)?.build()
    }

    /// Resolve the compute endpoint for `region` from the identity catalog
    /// and build a client on it.
    ///
    /// # Errors
    ///
    /// Returns the authentication error, or `EndpointNotFound` when the
    /// catalog has no compute service.
    pub async fn from_catalog(
        ctx: &CallContext,
        identity: Arc<IdentityTokenProvider>,
        region: Region,
    ) -> Result<Self> {
        let endpoint = identity
            .service_endpoint(ctx, ServiceType::Compute, region)
            .await?;
        debug!(%endpoint, %region, "resolved compute endpoint");

        Self::new(endpoint, identity)
    }

    /// Return the base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        self.inner.base_url()
    }

    /// List instances with details.
    ///
    /// # Errors
    ///
    /// Returns the classified API error.
    pub async fn list_servers(
        &self,
        ctx: &CallContext,
        params: &ServerListParams,
    ) -> Result<Vec<Server>> {
        let list: ServerList = self
            .inner
            .get(ctx, "servers/detail", &params.to_pairs())
            .await?;
        Ok(list.servers)
    }

    /// Fetch a single instance.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown ID, or the classified API error.
    pub async fn get_server(&self, ctx: &CallContext, id: &str) -> Result<Server> {
        let path = format!("servers/{id}");
        let envelope: ServerEnvelope<Server> = self.inner.get(ctx, &path, &[]).await?;
        Ok(envelope.server)
    }

    /// Create an instance.
    ///
    /// # Errors
    ///
    /// Returns the classified API error.
    pub async fn create_server(
        &self,
        ctx: &CallContext,
        request: &CreateServerRequest,
    ) -> Result<ServerCreated> {
        let envelope: ServerEnvelope<ServerCreated> = self
            .inner
            .post(ctx, "servers", &CreateServerEnvelope { server: request })
            .await?;
        Ok(envelope.server)
    }

    /// Delete an instance.
    ///
    /// # Errors
    ///
    /// Returns the classified API error.
    pub async fn delete_server(&self, ctx: &CallContext, id: &str) -> Result<()> {
        let path = format!("servers/{id}");
        self.inner.delete(ctx, &path).await
    }

    /// List instance types with details.
    ///
    /// # Errors
    ///
    /// Returns the classified API error.
    pub async fn list_flavors(&self, ctx: &CallContext) -> Result<Vec<Flavor>> {
        let list: FlavorList = self.inner.get(ctx, "flavors/detail", &[]).await?;
        Ok(list.flavors)
    }

    /// List key pairs.
    ///
    /// # Errors
    ///
    /// Returns the classified API error.
    pub async fn list_key_pairs(&self, ctx: &CallContext) -> Result<Vec<KeyPair>> {
        let list: KeyPairList = self.inner.get(ctx, "os-keypairs", &[]).await?;
        Ok(list.keypairs.into_iter().map(|entry| entry.keypair).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nhncloud_core::auth::IdentityCredentials;
    use nhncloud_core::Error;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TENANT_PATH: &str = "/v2/tenant-1";

    async fn mount_identity(server: &MockServer) {
        let compute_url = format!("{}{TENANT_PATH}", server.uri());
        Mock::given(method("POST"))
            .and(path("/v2.0/tokens"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access": {
                    "token": {"id": "session-1", "expires": "2999-01-01T00:00:00Z"},
                    "serviceCatalog": [
                        {"name": "nova", "type": "compute", "endpoints": [
                            {"publicURL": compute_url, "region": "KR1"}
                        ]}
                    ]
                }
            })))
            .expect(1)
            .mount(server)
            .await;
    }

    async fn test_client(server: &MockServer) -> ComputeClient {
        mount_identity(server).await;
        let identity = IdentityTokenProvider::new(
            server.uri(),
            IdentityCredentials::new("tenant-1", "me@example.com", "pw"),
        )
        .unwrap();

        ComputeClient::from_catalog(&CallContext::background(), Arc::new(identity), Region::Kr1)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn from_catalog_resolves_endpoint() {
        let server = MockServer::start().await;
        let client = test_client(&server).await;
        assert_eq!(client.base_url().path(), TENANT_PATH);
    }

    #[tokio::test]
    async fn list_servers_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{TENANT_PATH}/servers/detail").as_str()))
            .and(query_param("status", "ACTIVE"))
            .and(header("x-auth-token", "session-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "servers": [
                    {"id": "s-1", "name": "web-01", "status": "ACTIVE"},
                    {"id": "s-2", "name": "web-02", "status": "ACTIVE"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server).await;
        let params = ServerListParams {
            status: Some("ACTIVE".into()),
            ..ServerListParams::default()
        };
        let servers = client
            .list_servers(&CallContext::background(), &params)
            .await
            .unwrap();

        assert_eq!(servers.len(), 2);
        assert_eq!(servers[1].name, "web-02");
    }

    #[tokio::test]
    async fn get_server_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{TENANT_PATH}/servers/missing").as_str()))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "itemNotFound": {"message": "Instance missing could not be found.", "code": 404}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server).await;
        let err = client
            .get_server(&CallContext::background(), "missing")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn create_server_wraps_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{TENANT_PATH}/servers").as_str()))
            .and(body_json(json!({
                "server": {
                    "name": "web-01",
                    "imageRef": "img-1",
                    "flavorRef": "flv-1",
                    "networks": [{"uuid": "net-1"}]
                }
            })))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({
                "server": {"id": "s-new", "adminPass": "generated", "links": []}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server).await;
        let request = CreateServerRequest::new("web-01", "img-1", "flv-1").with_network("net-1");
        let created = client
            .create_server(&CallContext::background(), &request)
            .await
            .unwrap();

        assert_eq!(created.id, "s-new");
        assert_eq!(created.admin_pass.as_deref(), Some("generated"));
    }

    #[tokio::test]
    async fn delete_server_accepts_no_content() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path(format!("{TENANT_PATH}/servers/s-1").as_str()))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server).await;
        client
            .delete_server(&CallContext::background(), "s-1")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn list_flavors_and_key_pairs() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{TENANT_PATH}/flavors/detail").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "flavors": [{"id": "f-1", "name": "m2.c1m2", "vcpus": 1, "ram": 2048, "disk": 0}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{TENANT_PATH}/os-keypairs").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "keypairs": [{"keypair": {"name": "ops", "fingerprint": "aa:bb", "public_key": "ssh-rsa AAA"}}]
            })))
            .mount(&server)
            .await;

        let client = test_client(&server).await;
        let ctx = CallContext::background();

        let flavors = client.list_flavors(&ctx).await.unwrap();
        assert_eq!(flavors[0].ram, 2048);

        let keys = client.list_key_pairs(&ctx).await.unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].name, "ops");
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{TENANT_PATH}/flavors/detail").as_str()))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{TENANT_PATH}/flavors/detail").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"flavors": []})))
            .expect(1)
            .mount(&server)
            .await;

        mount_identity(&server).await;
        let identity = Arc::new(
            IdentityTokenProvider::new(
                server.uri(),
                IdentityCredentials::new("tenant-1", "me@example.com", "pw"),
            )
            .unwrap(),
        );
        let endpoint = identity
            .service_endpoint(&CallContext::background(), "compute", "KR1")
            .await
            .unwrap();
        let client = ComputeClientBuilder::new(endpoint, identity)
            .unwrap()
            .with_retry_policy(RetryPolicy::new().with_initial_backoff(Duration::from_millis(1)))
            .build()
            .unwrap();

        let flavors = client
            .list_flavors(&CallContext::background())
            .await
            .unwrap();
        assert!(flavors.is_empty());
    }
}
