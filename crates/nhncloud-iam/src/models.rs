//! Organization member models.

use nhncloud_core::error::ResponseHeader;
use serde::{Deserialize, Serialize};

/// A member of an organization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    /// Member UUID.
    pub member_uuid: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// E-mail address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_address: Option<String>,
    /// `TOAST_CLOUD` for NHN Cloud accounts, `IAM` for IAM accounts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_type: Option<String>,
    /// Membership status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Role granted to an invited member.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoleAssignment {
    /// Role ID (e.g. `ORG_MEMBER`).
    pub role_id: String,
}

/// Body of `POST /v1/organizations/{org}/members`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InviteMemberRequest {
    /// Address the invitation is sent to.
    pub email_address: String,
    /// Roles granted on acceptance.
    pub roles: Vec<RoleAssignment>,
}

impl InviteMemberRequest {
    /// Invite `email_address` with the given roles.
    #[must_use]
    pub fn new<I, S>(email_address: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            email_address: email_address.into(),
            roles: roles
                .into_iter()
                .map(|role_id| RoleAssignment {
                    role_id: role_id.into(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Paging {
    #[serde(default)]
    pub(crate) total_count: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MemberPage {
    pub(crate) header: ResponseHeader,
    #[serde(default)]
    pub(crate) paging: Option<Paging>,
    #[serde(default)]
    pub(crate) org_members: Vec<Member>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MemberResponse {
    pub(crate) header: ResponseHeader,
    pub(crate) org_member: Option<Member>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HeaderOnly {
    pub(crate) header: ResponseHeader,
}
