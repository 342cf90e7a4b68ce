//! Build configuration.
//!
//! [`BuildConfig`] is deserialized from JSON or YAML, then [`BuildConfig::prepare`]
//! fills defaults and validates every field before any resource is touched.

pub mod duration;
mod prepare;
pub mod source;

use crate::azure::{InstanceMetadata, TargetRegion};
use crate::resource::ResourceId;
use azure_chroot_shared::constants::azure::TEMP_NAME_PREFIX;
use azure_chroot_shared::constants::defaults;
use azure_chroot_shared::errors::{ChrootError, ChrootResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub use source::SourceKind;

// ============================================================================
// Build configuration
// ============================================================================

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    /// Build from an empty disk instead of `source`.
    #[serde(default)]
    pub from_scratch: bool,

    /// Platform image URN, managed disk id or shared image version id.
    #[serde(default)]
    pub source: String,

    /// Template wrapping every host command, e.g. `sudo {{.Command}}`.
    #[serde(default)]
    pub command_wrapper: String,

    #[serde(default)]
    pub pre_mount_commands: Vec<String>,

    /// Options passed to `mount -o`.
    #[serde(default)]
    pub mount_options: Vec<String>,

    /// Partition of the attached disk to mount. Ignored when LVM is found.
    #[serde(default)]
    pub mount_partition: String,

    /// Template for the mount point, `{{.Device}}` is the device base name.
    #[serde(default)]
    pub mount_path: String,

    /// Replaces the built-in `mount` invocation. The user owns unmounting.
    #[serde(default)]
    pub manual_mount_command: String,

    #[serde(default)]
    pub post_mount_commands: Vec<String>,

    /// Extra mounts inside the chroot. Empty means the defaults.
    #[serde(default)]
    pub chroot_mounts: Vec<ChrootMount>,

    /// Host files copied into the chroot. Absent means `/etc/resolv.conf`.
    #[serde(default)]
    pub copy_files: Option<Vec<String>>,

    #[serde(default)]
    pub pre_unmount_commands: Vec<String>,

    /// Explicit root logical volume, e.g. `/dev/mapper/rootvg-rootlv`.
    #[serde(default)]
    pub lvm_root_device: String,

    #[serde(default)]
    pub os_disk_size_gb: i32,

    #[serde(default)]
    pub os_disk_storage_account_type: String,

    #[serde(default)]
    pub os_disk_cache_type: String,

    #[serde(default)]
    pub data_disk_storage_account_type: String,

    #[serde(default)]
    pub data_disk_cache_type: String,

    #[serde(default)]
    pub image_hyperv_generation: String,

    /// Managed image to create.
    #[serde(default)]
    pub image_resource_id: String,

    #[serde(default)]
    pub shared_image_destination: Option<SharedImageDestination>,

    #[serde(default, with = "duration", skip_serializing_if = "Option::is_none")]
    pub shared_image_gallery_timeout: Option<Duration>,

    #[serde(default)]
    pub shared_gallery_image_version_end_of_life_date: String,

    #[serde(default)]
    pub shared_image_gallery_replica_count: i32,

    #[serde(default)]
    pub temporary_os_disk_id: String,

    #[serde(default)]
    pub temporary_os_disk_snapshot_id: String,

    #[serde(default)]
    pub temporary_data_disk_id_prefix: String,

    #[serde(default)]
    pub temporary_data_disk_snapshot_id_prefix: String,

    /// Keep temporary disks and snapshots after the build.
    #[serde(default)]
    pub skip_cleanup: bool,

    /// Stop after the disk is detached, without capturing an image.
    #[serde(default)]
    pub skip_create_image: bool,

    #[serde(default, with = "duration", skip_serializing_if = "Option::is_none")]
    pub polling_duration_timeout: Option<Duration>,

    /// Directory holding the `lun<N>` device links.
    #[serde(default)]
    pub device_link_dir: String,

    /// Shell commands run inside the chroot by the command provisioner.
    #[serde(default)]
    pub provision_commands: Vec<String>,
}

/// `[fstype, device, path]` mounted inside the chroot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, String, String)", into = "(String, String, String)")]
pub struct ChrootMount {
    pub fstype: String,
    pub device: String,
    pub path: String,
}

impl From<(String, String, String)> for ChrootMount {
    fn from((fstype, device, path): (String, String, String)) -> Self {
        Self { fstype, device, path }
    }
}

impl From<ChrootMount> for (String, String, String) {
    fn from(m: ChrootMount) -> Self {
        (m.fstype, m.device, m.path)
    }
}

/// Shared image gallery version to publish.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SharedImageDestination {
    #[serde(default)]
    pub resource_group: String,
    #[serde(default)]
    pub gallery_name: String,
    #[serde(default)]
    pub image_name: String,
    #[serde(default)]
    pub image_version: String,
    /// Replication targets. Empty means the build VM's location.
    #[serde(default)]
    pub target_regions: Vec<TargetRegion>,
    #[serde(default)]
    pub exclude_from_latest: bool,
}

impl SharedImageDestination {
    /// Gallery image id in `subscription`.
    pub fn image_id(&self, subscription: &str) -> ResourceId {
        ResourceId::new(
            subscription,
            &self.resource_group,
            "Microsoft.Compute",
            "galleries",
            &self.gallery_name,
        )
        .child("images", &self.image_name)
    }

    /// Gallery image version id in `subscription`.
    pub fn version_id(&self, subscription: &str) -> ResourceId {
        self.image_id(subscription)
            .child("versions", &self.image_version)
    }
}

/// Temporary disk and snapshot names for one build.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TemporaryResources {
    pub os_disk: ResourceId,
    pub os_disk_snapshot: ResourceId,
    pub data_disk_prefix: String,
    pub data_disk_snapshot_prefix: String,
}

impl TemporaryResources {
    pub fn data_disk(&self, lun: i32) -> ChrootResult<ResourceId> {
        Ok(format!("{}{}", self.data_disk_prefix, lun).parse()?)
    }

    pub fn data_disk_snapshot(&self, lun: i32) -> ChrootResult<ResourceId> {
        Ok(format!("{}{}", self.data_disk_snapshot_prefix, lun).parse()?)
    }
}

impl BuildConfig {
    /// Load a configuration file; `.yaml`/`.yml` are YAML, anything else JSON.
    pub fn from_file(path: &Path) -> ChrootResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ChrootError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        if is_yaml {
            Self::from_yaml(&text)
        } else {
            Self::from_json(&text)
        }
    }

    pub fn from_json(text: &str) -> ChrootResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| ChrootError::Config(format!("Invalid JSON configuration: {}", e)))
    }

    pub fn from_yaml(text: &str) -> ChrootResult<Self> {
        serde_yaml::from_str(text)
            .map_err(|e| ChrootError::Config(format!("Invalid YAML configuration: {}", e)))
    }

    /// Source classification. Valid after [`prepare`](Self::prepare).
    pub fn source_kind(&self) -> ChrootResult<SourceKind> {
        if self.from_scratch {
            return Ok(SourceKind::FromScratch);
        }
        SourceKind::detect(&self.source)
    }

    pub fn polling_timeout(&self) -> Duration {
        self.polling_duration_timeout
            .unwrap_or(Duration::from_secs(defaults::POLLING_DURATION_TIMEOUT_SECS))
    }

    pub fn gallery_timeout(&self) -> Duration {
        self.shared_image_gallery_timeout
            .unwrap_or(Duration::from_secs(defaults::SHARED_IMAGE_GALLERY_TIMEOUT_SECS))
    }

    /// Parsed `image_resource_id`, `None` when unset.
    pub fn image_id(&self) -> ChrootResult<Option<ResourceId>> {
        if self.image_resource_id.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.image_resource_id.parse()?))
    }

    /// Temporary resource ids, defaulting to names in the build VM's resource group.
    pub fn temporary_resources(
        &self,
        vm: &InstanceMetadata,
        now: DateTime<Utc>,
    ) -> ChrootResult<TemporaryResources> {
        let timestamp = now.timestamp();
        let scope = format!(
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Compute",
            vm.subscription_id, vm.resource_group
        );
        let or_default = |value: &str, default: String| {
            if value.is_empty() { default } else { value.to_string() }
        };

        let os_disk = or_default(
            &self.temporary_os_disk_id,
            format!("{}/disks/{}-osdisk-{}", scope, TEMP_NAME_PREFIX, timestamp),
        );
        let os_disk_snapshot = or_default(
            &self.temporary_os_disk_snapshot_id,
            format!("{}/snapshots/{}-osdisk-snapshot-{}", scope, TEMP_NAME_PREFIX, timestamp),
        );

        Ok(TemporaryResources {
            os_disk: os_disk.parse()?,
            os_disk_snapshot: os_disk_snapshot.parse()?,
            data_disk_prefix: or_default(
                &self.temporary_data_disk_id_prefix,
                format!("{}/disks/{}-datadisk-{}-", scope, TEMP_NAME_PREFIX, timestamp),
            ),
            data_disk_snapshot_prefix: or_default(
                &self.temporary_data_disk_snapshot_id_prefix,
                format!(
                    "{}/snapshots/{}-datadisk-snapshot-{}-",
                    scope, TEMP_NAME_PREFIX, timestamp
                ),
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn vm() -> InstanceMetadata {
        InstanceMetadata {
            subscription_id: "sub".into(),
            resource_group: "rg".into(),
            name: "builder".into(),
            location: "westus2".into(),
            vm_scale_set: None,
        }
    }

    #[test]
    fn loads_yaml_with_chroot_mounts() {
        let config = BuildConfig::from_yaml(
            r#"
source: "Canonical:UbuntuServer:18.04-LTS:latest"
chroot_mounts:
  - [proc, proc, /proc]
polling_duration_timeout: 5m
"#,
        )
        .unwrap();
        assert_eq!(config.chroot_mounts[0].path, "/proc");
        assert_eq!(config.polling_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = BuildConfig::from_json(r#"{"sourse": "x"}"#).unwrap_err();
        assert!(matches!(err, ChrootError::Config(msg) if msg.contains("sourse")));
    }

    #[test]
    fn default_temporary_resources_use_vm_scope() {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let temp = BuildConfig::default().temporary_resources(&vm(), now).unwrap();
        assert_eq!(
            temp.os_disk.to_string(),
            "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Compute/disks/PackerTemp-osdisk-1700000000"
        );
        assert_eq!(
            temp.data_disk(2).unwrap().name(),
            "PackerTemp-datadisk-1700000000-2"
        );
        assert_eq!(
            temp.data_disk_snapshot(0).unwrap().name(),
            "PackerTemp-datadisk-snapshot-1700000000-0"
        );
    }

    #[test]
    fn explicit_temporary_ids_win() {
        let config = BuildConfig {
            temporary_os_disk_id:
                "/subscriptions/s/resourceGroups/other/providers/Microsoft.Compute/disks/mine".into(),
            ..Default::default()
        };
        let temp = config.temporary_resources(&vm(), Utc::now()).unwrap();
        assert_eq!(temp.os_disk.resource_group(), "other");
    }

    #[test]
    fn gallery_ids() {
        let dest = SharedImageDestination {
            resource_group: "rg".into(),
            gallery_name: "g".into(),
            image_name: "i".into(),
            image_version: "1.2.3".into(),
            ..Default::default()
        };
        let id = dest.version_id("sub");
        assert_eq!(id.name(), "1.2.3");
        assert_eq!(id.parent().unwrap(), dest.image_id("sub"));
    }
}
