//! Instance API request and response models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Filters supported by `GET /servers/detail`.
#[derive(Debug, Default, Clone)]
pub struct ServerListParams {
    /// Filter by instance name (regular expression match).
    pub name: Option<String>,
    /// Filter by status (ACTIVE, SHUTOFF, ...).
    pub status: Option<String>,
    /// Filter by image ID.
    pub image: Option<String>,
    /// Filter by flavor ID.
    pub flavor: Option<String>,
    /// Maximum number of results.
    pub limit: Option<u32>,
    /// ID of the last instance of the previous page.
    pub marker: Option<String>,
}

impl ServerListParams {
    /// Convert the parameters into URL query pairs.
    #[must_use]
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        let mut push = |name: &'static str, value: Option<String>| {
            if let Some(value) = value {
                pairs.push((name, value));
            }
        };

        push("name", self.name.clone());
        push("status", self.status.clone());
        push("image", self.image.clone());
        push("flavor", self.flavor.clone());
        push("limit", self.limit.map(|limit| limit.to_string()));
        push("marker", self.marker.clone());

        pairs
    }
}

/// Reference to a flavor inside a server document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlavorRef {
    /// Flavor ID.
    pub id: String,
}

/// One address of a server on a network.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerAddress {
    /// IP address.
    pub addr: String,
    /// IP version (4 or 6).
    #[serde(default)]
    pub version: u8,
    /// `fixed` or `floating`.
    #[serde(rename = "OS-EXT-IPS:type", default, skip_serializing_if = "Option::is_none")]
    pub ip_type: Option<String>,
}

/// An instance as returned by the Instance API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Server {
    /// Instance ID.
    pub id: String,
    /// Instance name.
    pub name: String,
    /// Instance status (ACTIVE, BUILD, SHUTOFF, ERROR, ...).
    #[serde(default)]
    pub status: String,
    /// Owning tenant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    /// Flavor of the instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flavor: Option<FlavorRef>,
    /// Key pair injected at boot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_name: Option<String>,
    /// Addresses keyed by network name.
    #[serde(default)]
    pub addresses: HashMap<String, Vec<ServerAddress>>,
    /// User metadata.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    /// Last update time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
    /// Availability zone.
    #[serde(
        rename = "OS-EXT-AZ:availability_zone",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub availability_zone: Option<String>,
}

/// Network attachment for a new server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkRef {
    /// VPC subnet network ID.
    pub uuid: String,
}

/// Body of `POST /servers`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateServerRequest {
    /// Instance name.
    pub name: String,
    /// Image ID.
    pub image_ref: String,
    /// Flavor ID.
    pub flavor_ref: String,
    /// Networks to attach.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<NetworkRef>,
    /// Key pair to inject.
    #[serde(
        rename = "key_name",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub key_name: Option<String>,
    /// Availability zone.
    #[serde(
        rename = "availability_zone",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub availability_zone: Option<String>,
    /// User metadata.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl CreateServerRequest {
    /// Create a request with the required fields.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        image_ref: impl Into<String>,
        flavor_ref: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            image_ref: image_ref.into(),
            flavor_ref: flavor_ref.into(),
            networks: Vec::new(),
            key_name: None,
            availability_zone: None,
            metadata: HashMap::new(),
        }
    }

    /// Attach a network.
    #[must_use]
    pub fn with_network(mut self, uuid: impl Into<String>) -> Self {
        self.networks.push(NetworkRef { uuid: uuid.into() });
        self
    }

    /// Inject a key pair.
    #[must_use]
    pub fn with_key_name(mut self, key_name: impl Into<String>) -> Self {
        self.key_name = Some(key_name.into());
        self
    }
}

/// Response of `POST /servers`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerCreated {
    /// New instance ID.
    pub id: String,
    /// Generated administrator password, when the image sets one.
    #[serde(rename = "adminPass", default, skip_serializing_if = "Option::is_none")]
    pub admin_pass: Option<String>,
}

/// An instance type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Flavor {
    /// Flavor ID.
    pub id: String,
    /// Flavor name (e.g. `m2.c1m2`).
    pub name: String,
    /// Virtual CPUs.
    #[serde(default)]
    pub vcpus: u32,
    /// Memory in MiB.
    #[serde(default)]
    pub ram: u64,
    /// Root disk in GiB (0 for block-storage-backed flavors).
    #[serde(default)]
    pub disk: u64,
}

/// An SSH key pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyPair {
    /// Key pair name.
    pub name: String,
    /// Key fingerprint.
    #[serde(default)]
    pub fingerprint: String,
    /// Public key.
    #[serde(default)]
    pub public_key: String,
}

// Response envelopes

#[derive(Debug, Deserialize)]
pub(crate) struct ServerList {
    pub(crate) servers: Vec<Server>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ServerEnvelope<T> {
    pub(crate) server: T,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateServerEnvelope<'a> {
    pub(crate) server: &'a CreateServerRequest,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FlavorList {
    pub(crate) flavors: Vec<Flavor>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct KeyPairList {
    pub(crate) keypairs: Vec<KeyPairEnvelope>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct KeyPairEnvelope {
    pub(crate) keypair: KeyPair,
}
