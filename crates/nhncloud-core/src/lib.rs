//! # nhncloud-core
//!
//! Shared client infrastructure for the NHN Cloud SDK.
//!
//! Service crates build on three pieces provided here: token providers that
//! exchange long-lived credentials for cached access tokens, a retrying
//! transport that classifies failures into one error taxonomy, and a paginator
//! for page-numbered listings.
//!
//! ## Modules
//!
//! - [`error`] - Error taxonomy and provider error-body parsing
//! - [`auth`] - Application and identity token providers, service catalog
//! - [`transport`] - Authenticated HTTP transport with retries
//! - [`pagination`] - Page-number paginator
//! - [`context`] - Per-call deadlines and cancellation
//! - [`client`] - HTTP client settings and retry policy
//! - [`config`] - SDK configuration
//! - [`types`] - Regions and service types

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod pagination;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use auth::{AccessToken, TokenProvider};
pub use context::{CallContext, CancelHandle};
pub use error::{Error, Result};
pub use pagination::{Collected, Page, Paginator};
pub use transport::{RequestSpec, ResponseEnvelope, ServiceClient, ServiceClientBuilder};
