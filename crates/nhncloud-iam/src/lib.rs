//! Organization member API client for NHN Cloud.
//!
//! Authenticates with an application (access key) token and walks member
//! listings with the shared paginator.

#![deny(missing_docs)]

pub mod client;
pub mod models;

pub use client::{IamClient, IamClientBuilder, DEFAULT_IAM_URL};
pub use models::{InviteMemberRequest, Member, RoleAssignment};

/// Convenient result alias that reuses the shared NHN Cloud error type.
pub type Result<T> = nhncloud_core::Result<T>;
