//! Asynchronous organization member client implementation.

use crate::models::{HeaderOnly, InviteMemberRequest, Member, MemberPage, MemberResponse};
use crate::Result;
use nhncloud_core::auth::TokenProvider;
use nhncloud_core::client::{ClientConfig, RetryPolicy};
use nhncloud_core::{
    CallContext, Error, Page, Paginator, RequestSpec, ResponseEnvelope, ServiceClient,
    ServiceClientBuilder,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Public API base URL
pub const DEFAULT_IAM_URL: &str = "https://core.api.nhncloud.com";

/// Members fetched per page by [`IamClient::list_all_members`]
pub const DEFAULT_PAGE_SIZE: u32 = 100;

const SERVICE: &str = "iam";
const USER_AGENT: &str = concat!("nhncloud-iam/", env!("CARGO_PKG_VERSION"));

/// Builder for [`IamClient`].
#[derive(Debug)]
pub struct IamClientBuilder {
    inner: ServiceClientBuilder,
}

impl IamClientBuilder {
    /// Create a builder for the API at `base_url`.
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

    /// Build the client.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the HTTP client cannot be created.
    pub fn build(self) -> Result<IamClient> {
        Ok(IamClient {
            inner: self.inner.build()?,
        })
    }
}

/// Asynchronous organization member client.
#[derive(Debug, Clone)]
pub struct IamClient {
    inner: ServiceClient,
}

impl IamClient {
    /// Construct a client for the public API endpoint.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the HTTP client cannot be created.
    pub fn new(auth: Arc<dyn TokenProvider>) -> Result<Self> {
        IamClientBuilder::new(DEFAULT_IAM_URL, auth)?.build()
    }

    /// Return the base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        self.inner.base_url()
    }

    /// Paginator over the members of `org_id`, `page_size` per page.
    #[must_use]
    pub fn members(&self, org_id: &str, page_size: u32) -> Paginator<'_, Member> {
        Paginator::new(
            &self.inner,
            members_path(org_id),
            page_size,
            |response: &ResponseEnvelope| {
                let page: MemberPage = response.json()?;
                page.header.into_result(response.status())?;
                let total = page.paging.map_or(0, |paging| paging.total_count);
                Ok(Page::new(page.org_members, total))
            },
        )
        .one_based()
        .with_param_names("page", "limit")
    }

    /// Fetch every member of `org_id`.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered; members fetched before it are
    /// discarded. Use [`members`](Self::members) to keep them.
    pub async fn list_all_members(&self, ctx: &CallContext, org_id: &str) -> Result<Vec<Member>> {
        let members = self
            .members(org_id, DEFAULT_PAGE_SIZE)
            .all(ctx)
            .await
            .into_result()?;
        debug!(org_id, count = members.len(), "listed organization members");

        Ok(members)
    }

    /// Fetch one member.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the member is not in the organization, or the
    /// classified API error.
    pub async fn get_member(
        &self,
        ctx: &CallContext,
        org_id: &str,
        member_uuid: &str,
    ) -> Result<Member> {
        let spec = RequestSpec::get(format!("{}/{member_uuid}", members_path(org_id)));
        let (response, status): (MemberResponse, u16) = self.send(ctx, &spec).await?;
        response.header.into_result(status)?;

        response.org_member.ok_or_else(|| Error::NotFound {
            message: format!("member {member_uuid} not found in organization {org_id}"),
            request_id: None,
        })
    }

    /// Invite a member by e-mail.
    ///
    /// # Errors
    ///
    /// Returns the classified API error.
    pub async fn invite_member(
        &self,
        ctx: &CallContext,
        org_id: &str,
        request: &InviteMemberRequest,
    ) -> Result<()> {
        let spec = RequestSpec::post(members_path(org_id)).json(request)?;
        let (response, status): (HeaderOnly, u16) = self.send(ctx, &spec).await?;
        response.header.into_result(status)
    }

    /// Remove a member from the organization.
    ///
    /// # Errors
    ///
    /// Returns the classified API error.
    pub async fn remove_member(
        &self,
        ctx: &CallContext,
        org_id: &str,
        member_uuid: &str,
    ) -> Result<()> {
        let spec = RequestSpec::delete(format!("{}/{member_uuid}", members_path(org_id)));
        let (response, status): (HeaderOnly, u16) = self.send(ctx, &spec).await?;
        response.header.into_result(status)
    }

    /// Execute `spec` and decode the body along with the status it came with.
    async fn send<R: DeserializeOwned>(
        &self,
        ctx: &CallContext,
        spec: &RequestSpec,
    ) -> Result<(R, u16)> {
        let response = self.inner.execute(ctx, spec).await?;
        Ok((response.json()?, response.status()))
    }
}

fn members_path(org_id: &str) -> String {
    format!("v1/organizations/{org_id}/members")
}
