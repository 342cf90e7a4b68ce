//! Capture the detached disks as an image or shared image version.

use super::{cloud_context, teardown_token};
use crate::azure::{
    CachingType, GalleryImageVersionSpec, ImageDisk, ImageSpec, SnapshotSpec, TargetRegion,
};
use crate::config::{SharedImageDestination, TemporaryResources};
use crate::pipeline::{BuildState, BuildStep};
use crate::resource::ResourceId;
use crate::util::bounded;
use async_trait::async_trait;
use azure_chroot_shared::constants::azure::OS_DISK_LUN;
use azure_chroot_shared::errors::{ChrootError, ChrootResult};
use std::any::Any;
use std::time::Duration;

// ============================================================================
// Managed image
// ============================================================================

pub struct CreateImage {
    pub image_id: ResourceId,
    pub location: String,
    pub hyperv_generation: String,
    pub os_disk_sku: String,
    pub os_disk_caching: CachingType,
    pub data_disk_sku: String,
    pub data_disk_caching: CachingType,
    pub timeout: Duration,
}

impl CreateImage {
    fn spec(&self, state: &BuildState) -> ChrootResult<ImageSpec> {
        let diskset = state.os_diskset()?;
        let os_disk = diskset
            .os_disk()
            .ok_or_else(|| ChrootError::Internal("diskset has no OS disk".into()))?;

        Ok(ImageSpec {
            location: self.location.clone(),
            hyper_v_generation: self.hyperv_generation.clone(),
            os_disk: ImageDisk {
                managed_disk: os_disk.clone(),
                caching: self.os_disk_caching,
                storage_account_type: self.os_disk_sku.clone(),
            },
            data_disks: diskset
                .data_disks()
                .map(|(lun, id)| {
                    (
                        lun,
                        ImageDisk {
                            managed_disk: id.clone(),
                            caching: self.data_disk_caching,
                            storage_account_type: self.data_disk_sku.clone(),
                        },
                    )
                })
                .collect(),
        })
    }
}

#[async_trait]
impl BuildStep for CreateImage {
    fn name(&self) -> &'static str {
        "CreateImage"
    }

    async fn run(&mut self, state: &mut BuildState) -> ChrootResult<()> {
        let spec = self.spec(state)?;
        state.ui().say(&format!("Creating image {}", self.image_id));
        state.ui().message(&format!(
            "OS disk {}, {} data disk(s)",
            spec.os_disk.managed_disk,
            spec.data_disks.len()
        ));

        bounded(
            "creating image",
            self.timeout,
            &state.cancel,
            state.compute().create_image(&self.image_id, &spec),
        )
        .await
        .map_err(|e| cloud_context(e, format!("Error creating image {}", self.image_id)))?;

        state.image_id = Some(self.image_id.clone());
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Snapshot set
// ============================================================================

/// Snapshot every disk of the diskset under the same LUN.
pub struct CreateSnapshotset {
    pub temporary: TemporaryResources,
    pub location: String,
    pub skip_cleanup: bool,
    pub timeout: Duration,
}

impl CreateSnapshotset {
    fn snapshot_id(&self, lun: i32) -> ChrootResult<ResourceId> {
        if lun == OS_DISK_LUN {
            Ok(self.temporary.os_disk_snapshot.clone())
        } else {
            self.temporary.data_disk_snapshot(lun)
        }
    }
}

#[async_trait]
impl BuildStep for CreateSnapshotset {
    fn name(&self) -> &'static str {
        "CreateSnapshotset"
    }

    async fn run(&mut self, state: &mut BuildState) -> ChrootResult<()> {
        let diskset = state.os_diskset()?.clone();
        state.ui().say("Creating snapshots");

        for (lun, disk) in diskset.iter() {
            let id = self.snapshot_id(lun)?;
            let spec = SnapshotSpec {
                location: self.location.clone(),
                source: disk.clone(),
                incremental: false,
            };
            state
                .ui()
                .message(&format!("Creating snapshot {} of {}", id, disk));
            bounded(
                "creating snapshot",
                self.timeout,
                &state.cancel,
                state.compute().create_snapshot(&id, &spec),
            )
            .await
            .map_err(|e| cloud_context(e, format!("Error creating snapshot {}", id)))?;

            state.publish_snapshot(lun, id);
        }
        Ok(())
    }

    async fn cleanup(&mut self, state: &mut BuildState) {
        let Ok(snapshots) = state.snapshotset().map(Clone::clone) else {
            return;
        };
        if self.skip_cleanup {
            state.ui().message(&format!(
                "Not deleting {} snapshot(s) because skip_cleanup is set",
                snapshots.len()
            ));
            return;
        }

        let cancel = teardown_token();
        for (_, id) in snapshots.iter() {
            state.ui().message(&format!("Deleting snapshot {}", id));
            let result = bounded(
                "deleting snapshot",
                self.timeout,
                &cancel,
                state.compute().delete_snapshot(id),
            )
            .await;
            if let Err(e) = result {
                state
                    .ui()
                    .error(&format!("Error deleting snapshot {}: {}", id, e));
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Shared image version
// ============================================================================

pub struct CreateSharedImageVersion {
    pub destination: SharedImageDestination,
    pub subscription: String,
    pub location: String,
    pub replica_count: Option<i32>,
    pub end_of_life_date: Option<String>,
    pub os_disk_caching: CachingType,
    pub data_disk_caching: CachingType,
    pub timeout: Duration,
}

impl CreateSharedImageVersion {
    fn target_regions(&self) -> Vec<TargetRegion> {
        if !self.destination.target_regions.is_empty() {
            return self.destination.target_regions.clone();
        }
        vec![TargetRegion {
            name: self.location.clone(),
            replicas: self.replica_count,
            storage_account_type: None,
        }]
    }
}

#[async_trait]
impl BuildStep for CreateSharedImageVersion {
    fn name(&self) -> &'static str {
        "CreateSharedImageVersion"
    }

    async fn run(&mut self, state: &mut BuildState) -> ChrootResult<()> {
        let snapshots = state.snapshotset()?;
        let os_snapshot = snapshots
            .os_disk()
            .cloned()
            .ok_or_else(|| ChrootError::Internal("snapshot set has no OS snapshot".into()))?;
        let data_snapshots: Vec<(i32, ResourceId)> = snapshots
            .data_disks()
            .map(|(lun, id)| (lun, id.clone()))
            .collect();

        let spec = GalleryImageVersionSpec {
            location: self.location.clone(),
            os_snapshot,
            os_caching: self.os_disk_caching,
            data_snapshots,
            data_caching: self.data_disk_caching,
            target_regions: self.target_regions(),
            replica_count: self.replica_count,
            exclude_from_latest: self.destination.exclude_from_latest,
            end_of_life_date: self.end_of_life_date.clone(),
        };

        let version_id = self.destination.version_id(&self.subscription);
        state
            .ui()
            .say(&format!("Creating shared image version {}", version_id));
        let regions: Vec<&str> = spec.target_regions.iter().map(|r| r.name.as_str()).collect();
        state
            .ui()
            .message(&format!("Replicating to {}", regions.join(", ")));

        let version = bounded(
            "creating shared image version",
            self.timeout,
            &state.cancel,
            state
                .compute()
                .create_gallery_image_version(&version_id, &spec),
        )
        .await
        .map_err(|e| {
            cloud_context(e, format!("Error creating shared image version {}", version_id))
        })?;

        state.shared_image_version_id = Some(version.id);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// No capture
// ============================================================================

/// Stands in for the capture steps when `skip_create_image` is set.
pub struct SkipCapture;

#[async_trait]
impl BuildStep for SkipCapture {
    fn name(&self) -> &'static str {
        "SkipCapture"
    }

    async fn run(&mut self, state: &mut BuildState) -> ChrootResult<()> {
        state
            .ui()
            .say("Skipping image creation because skip_create_image is set");
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
