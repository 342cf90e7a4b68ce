//! Identity of the VM the build runs on.

use super::MetadataSource;
use crate::resource::ResourceId;
use azure_chroot_shared::errors::ChrootResult;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::OnceCell;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceMetadata {
    pub subscription_id: String,
    pub resource_group: String,
    /// VM name. For a scale-set instance this is `<scaleset>_<instance>`.
    pub name: String,
    pub location: String,
    /// Scale set the VM belongs to, if any.
    #[serde(default)]
    pub vm_scale_set: Option<String>,
}

impl InstanceMetadata {
    /// Id of the VM as a standalone virtual machine.
    pub fn vm_id(&self) -> ResourceId {
        ResourceId::compute(
            &self.subscription_id,
            &self.resource_group,
            "virtualMachines",
            &self.name,
        )
    }

    /// Id of the VM as a scale-set instance, when it is one.
    pub fn vmss_vm_id(&self) -> Option<ResourceId> {
        let scale_set = self.vm_scale_set.as_deref().filter(|s| !s.is_empty())?;
        let instance = self
            .name
            .rsplit_once('_')
            .map(|(_, id)| id)
            .unwrap_or(&self.name);
        Some(
            ResourceId::compute(
                &self.subscription_id,
                &self.resource_group,
                "virtualMachineScaleSets",
                scale_set,
            )
            .child("virtualMachines", instance),
        )
    }
}

/// Queries a [`MetadataSource`] at most once per build.
#[derive(Clone)]
pub struct CachedMetadata {
    source: Arc<dyn MetadataSource>,
    cell: Arc<OnceCell<InstanceMetadata>>,
}

impl CachedMetadata {
    pub fn new(source: Arc<dyn MetadataSource>) -> Self {
        Self {
            source,
            cell: Arc::new(OnceCell::new()),
        }
    }

    pub async fn get(&self) -> ChrootResult<InstanceMetadata> {
        let metadata = self
            .cell
            .get_or_try_init(|| async {
                let metadata = self.source.instance().await?;
                tracing::debug!(
                    vm = %metadata.name,
                    resource_group = %metadata.resource_group,
                    location = %metadata.location,
                    "Fetched instance metadata"
                );
                Ok::<_, azure_chroot_shared::ChrootError>(metadata)
            })
            .await?;
        Ok(metadata.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(scale_set: Option<&str>, name: &str) -> InstanceMetadata {
        InstanceMetadata {
            subscription_id: "sub".into(),
            resource_group: "rg".into(),
            name: name.into(),
            location: "westus2".into(),
            vm_scale_set: scale_set.map(Into::into),
        }
    }

    #[test]
    fn vm_id_for_plain_vm() {
        let md = metadata(None, "builder");
        assert_eq!(
            md.vm_id().to_string(),
            "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/builder"
        );
        assert!(md.vmss_vm_id().is_none());
    }

    #[test]
    fn vmss_id_uses_instance_suffix() {
        let md = metadata(Some("pool"), "pool_7");
        assert_eq!(
            md.vmss_vm_id().unwrap().to_string(),
            "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Compute/virtualMachineScaleSets/pool/virtualMachines/7"
        );
    }
}
