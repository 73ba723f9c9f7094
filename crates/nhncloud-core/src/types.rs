//! Core NHN Cloud domain types.
//!
//! Regions and the service types that appear in the identity service catalog.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// NHN Cloud regions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Region {
    /// Korea (Pangyo)
    #[default]
    Kr1,
    /// Korea (Pyeongchon)
    Kr2,
    /// Korea (Gwangju)
    Kr3,
    /// Japan (Tokyo)
    Jp1,
    /// US (California)
    Us1,
}

impl Region {
    /// Returns the region code as it appears in the service catalog.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Kr1 => "KR1",
            Self::Kr2 => "KR2",
            Self::Kr3 => "KR3",
            Self::Jp1 => "JP1",
            Self::Us1 => "US1",
        }
    }

    /// Returns all known regions.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Kr1, Self::Kr2, Self::Kr3, Self::Jp1, Self::Us1]
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl AsRef<str> for Region {
    fn as_ref(&self) -> &str {
        self.code()
    }
}

impl FromStr for Region {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|region| region.code().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::Config(format!("Unknown region: {s}")))
    }
}

/// Service types published in the identity service catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceType {
    /// Instance (Nova-compatible) API
    #[serde(rename = "compute")]
    Compute,
    /// VPC / network API
    #[serde(rename = "network")]
    Network,
    /// Image API
    #[serde(rename = "image")]
    Image,
    /// Block storage API
    #[serde(rename = "volumev2")]
    BlockStorage,
    /// Object storage API
    #[serde(rename = "object-store")]
    ObjectStore,
    /// Identity API
    #[serde(rename = "identity")]
    Identity,
}

impl ServiceType {
    /// Returns the catalog `type` string.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Compute => "compute",
            Self::Network => "network",
            Self::Image => "image",
            Self::BlockStorage => "volumev2",
            Self::ObjectStore => "object-store",
            Self::Identity => "identity",
        }
    }

    /// Returns all known service types.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Compute,
            Self::Network,
            Self::Image,
            Self::BlockStorage,
            Self::ObjectStore,
            Self::Identity,
        ]
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl AsRef<str> for ServiceType {
    fn as_ref(&self) -> &str {
        self.name()
    }
}

impl FromStr for ServiceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|service| service.name() == s)
            .ok_or_else(|| Error::Config(format!("Unknown service type: {s}")))
    }
}
