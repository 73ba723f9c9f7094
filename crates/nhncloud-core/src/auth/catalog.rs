//! Service catalog returned by the identity service.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// Mapping of service type and region to a base URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceCatalog {
    entries: Vec<CatalogEntry>,
}

/// One service in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Service name (e.g. `nova`)
    #[serde(default)]
    pub name: String,
    /// Service type (e.g. `compute`)
    #[serde(rename = "type")]
    pub service_type: String,
    /// Regional endpoints
    #[serde(default)]
    pub endpoints: Vec<CatalogEndpoint>,
}

/// A regional endpoint of a catalog service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEndpoint {
    /// Public base URL; endpoints without one are never resolved
    #[serde(rename = "publicURL", default, skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
    /// Region code (e.g. `KR1`)
    #[serde(default)]
    pub region: String,
}

impl ServiceCatalog {
    /// Build a catalog from entries.
    #[must_use]
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    /// All entries.
    #[must_use]
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Returns true if the catalog has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve the base URL of `service_type` in `region`.
    ///
    /// An endpoint in exactly `region` is preferred; otherwise the first endpoint
    /// listed for the service type is returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EndpointNotFound`] when the catalog has no endpoint for
    /// the service type, or [`Error::Config`] when the URL does not parse.
    pub fn endpoint(&self, service_type: &str, region: &str) -> Result<Url> {
        let mut endpoints = self.published(service_type);

        let (first_region, first_url) =
            endpoints.next().ok_or_else(|| Error::EndpointNotFound {
                service_type: service_type.to_string(),
                region: region.to_string(),
            })?;

        let chosen = if first_region == region {
            first_url
        } else {
            endpoints
                .find(|(endpoint_region, _)| *endpoint_region == region)
                .map_or(first_url, |(_, url)| url)
        };

        Url::parse(chosen).map_err(|err| {
            Error::Config(format!(
                "Invalid catalog URL `{chosen}` for `{service_type}`: {err}"
            ))
        })
    }

    /// Regions in which `service_type` is published.
    #[must_use]
    pub fn regions<'a>(&'a self, service_type: &'a str) -> Vec<&'a str> {
        self.published(service_type)
            .map(|(region, _)| region)
            .collect()
    }

    /// `(region, public URL)` pairs of `service_type` that carry a public URL.
    fn published<'a>(
        &'a self,
        service_type: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a str)> {
        self.entries
            .iter()
            .filter(move |entry| entry.service_type == service_type)
            .flat_map(|entry| entry.endpoints.iter())
            .filter_map(|endpoint| {
                endpoint
                    .public_url
                    .as_deref()
                    .map(|url| (endpoint.region.as_str(), url))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn catalog() -> ServiceCatalog {
        serde_json::from_value(json!([
            {
                "name": "nova",
                "type": "compute",
                "endpoints": [
                    {"publicURL": "https://kr1-api-instance.infrastructure.nhncloudservice.com/v2/t1", "region": "KR1"},
                    {"publicURL": "https://kr2-api-instance.infrastructure.nhncloudservice.com/v2/t1", "region": "KR2"}
                ]
            },
            {
                "name": "neutron",
                "type": "network",
                "endpoints": [
                    {"publicURL": "https://kr1-api-network.infrastructure.nhncloudservice.com", "region": "KR1"}
                ]
            },
            {
                "name": "empty",
                "type": "image",
                "endpoints": []
            }
        ]))
        .unwrap()
    }

    #[test]
    fn test_exact_region_preferred() {
        let url = catalog().endpoint("compute", "KR2").unwrap();
        assert_eq!(
            url.as_str(),
            "https://kr2-api-instance.infrastructure.nhncloudservice.com/v2/t1"
        );
    }

    #[test]
    fn test_falls_back_to_first_endpoint() {
        let url = catalog().endpoint("network", "JP1").unwrap();
        assert_eq!(
            url.as_str(),
            "https://kr1-api-network.infrastructure.nhncloudservice.com/"
        );
    }

    #[test]
    fn test_unknown_service_type() {
        let err = catalog().endpoint("dns", "KR1").unwrap_err();
        assert_eq!(
            err,
            Error::EndpointNotFound {
                service_type: "dns".to_string(),
                region: "KR1".to_string(),
            }
        );
    }

    #[test]
    fn test_service_without_endpoints() {
        let err = catalog().endpoint("image", "KR1").unwrap_err();
        assert!(matches!(err, Error::EndpointNotFound { .. }));
    }

    #[test]
    fn test_endpoints_without_public_url_are_skipped() {
        let catalog: ServiceCatalog = serde_json::from_value(json!([
            {
                "type": "compute",
                "endpoints": [
                    {"internalURL": "http://10.0.0.1/v2/t1", "region": "KR1"},
                    {"publicURL": "https://kr2-api-instance.infrastructure.nhncloudservice.com/v2/t1", "region": "KR2"}
                ]
            },
            {
                "name": "metering",
                "type": "metering",
                "endpoints": [{"internalURL": "http://10.0.0.2"}]
            }
        ]))
        .unwrap();

        let url = catalog.endpoint("compute", "KR1").unwrap();
        assert_eq!(
            url.as_str(),
            "https://kr2-api-instance.infrastructure.nhncloudservice.com/v2/t1"
        );
        assert_eq!(catalog.regions("compute"), vec!["KR2"]);
        assert!(matches!(
            catalog.endpoint("metering", "KR1"),
            Err(Error::EndpointNotFound { .. })
        ));
    }

    #[test]
    fn test_regions() {
        let catalog = catalog();
        assert_eq!(catalog.regions("compute"), vec!["KR1", "KR2"]);
        assert!(catalog.regions("dns").is_empty());
        assert!(!catalog.is_empty());
        assert!(ServiceCatalog::default().is_empty());
    }
}
