//! Azure Instance Metadata Service client.

use super::metadata::InstanceMetadata;
use super::MetadataSource;
use async_trait::async_trait;
use azure_chroot_shared::errors::{ChrootError, ChrootResult};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

/// Link-local IMDS endpoint.
pub const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/instance";

const IMDS_API_VERSION: &str = "2021-02-01";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct InstanceDocument {
    compute: ComputeDocument,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ComputeDocument {
    subscription_id: String,
    resource_group_name: String,
    name: String,
    location: String,
    #[serde(default)]
    vm_scale_set_name: String,
}

impl From<ComputeDocument> for InstanceMetadata {
    fn from(doc: ComputeDocument) -> Self {
        Self {
            subscription_id: doc.subscription_id,
            resource_group: doc.resource_group_name,
            name: doc.name,
            location: doc.location,
            vm_scale_set: Some(doc.vm_scale_set_name).filter(|s| !s.is_empty()),
        }
    }
}

/// [`MetadataSource`] backed by IMDS.
pub struct ImdsClient {
    endpoint: String,
    http_client: Client,
}

impl ImdsClient {
    pub fn new() -> ChrootResult<Self> {
        Self::with_endpoint(IMDS_ENDPOINT)
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> ChrootResult<Self> {
        // IMDS must never be reached through a proxy.
        let http_client = Client::builder()
            .no_proxy()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| ChrootError::Cloud(format!("Failed to build IMDS client: {}", e)))?;
        Ok(Self {
            endpoint: endpoint.into(),
            http_client,
        })
    }
}

#[async_trait]
impl MetadataSource for ImdsClient {
    async fn instance(&self) -> ChrootResult<InstanceMetadata> {
        let response = self
            .http_client
            .get(&self.endpoint)
            .header("Metadata", "true")
            .query(&[("api-version", IMDS_API_VERSION), ("format", "json")])
            .send()
            .await
            .map_err(|e| ChrootError::Cloud(format!("IMDS request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ChrootError::Cloud(format!(
                "IMDS returned HTTP {}",
                response.status()
            )));
        }

        let document: InstanceDocument = response
            .json()
            .await
            .map_err(|e| ChrootError::Cloud(format!("Invalid IMDS response: {}", e)))?;
        Ok(document.compute.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_compute_document() {
        let json = r#"{
            "compute": {
                "subscriptionId": "sub",
                "resourceGroupName": "rg",
                "name": "pool_3",
                "location": "westeurope",
                "vmScaleSetName": "pool",
                "osType": "Linux"
            }
        }"#;
        let doc: InstanceDocument = serde_json::from_str(json).unwrap();
        let md: InstanceMetadata = doc.compute.into();
        assert_eq!(md.resource_group, "rg");
        assert_eq!(md.vm_scale_set.as_deref(), Some("pool"));
    }

    #[test]
    fn empty_scale_set_is_none() {
        let json = r#"{"compute": {"subscriptionId": "s", "resourceGroupName": "r",
            "name": "vm", "location": "l", "vmScaleSetName": ""}}"#;
        let doc: InstanceDocument = serde_json::from_str(json).unwrap();
        let md: InstanceMetadata = doc.compute.into();
        assert!(md.vm_scale_set.is_none());
    }
}
