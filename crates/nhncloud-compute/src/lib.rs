//! Instance API client for NHN Cloud.
//!
//! Authenticates with an identity token and resolves its base URL from the
//! identity service catalog.

#![deny(missing_docs)]

pub mod client;
pub mod models;

pub use client::{ComputeClient, ComputeClientBuilder};
pub use models::{
    CreateServerRequest, Flavor, FlavorRef, KeyPair, NetworkRef, Server, ServerAddress,
    ServerCreated, ServerListParams,
};

/// Convenient result alias that reuses the shared NHN Cloud error type.
pub type Result<T> = nhncloud_core::Result<T>;
