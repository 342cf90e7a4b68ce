//! Create the OS disk, plus data disks when copying a gallery version.

use super::{cloud_context, teardown_token};
use crate::azure::{DiskCreation, DiskSpec, OsType, PlatformImage};
use crate::config::TemporaryResources;
use crate::pipeline::{BuildState, BuildStep, CleanupKind};
use crate::resource::ResourceId;
use crate::util::bounded;
use async_trait::async_trait;
use azure_chroot_shared::constants::azure::OS_DISK_LUN;
use azure_chroot_shared::errors::ChrootResult;
use std::any::Any;
use std::time::Duration;

/// Content of the new disks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisksetSource {
    Empty,
    Disk(ResourceId),
    PlatformImage(PlatformImage),
    SharedImageVersion(ResourceId),
}

pub struct CreateDiskset {
    pub source: DisksetSource,
    pub temporary: TemporaryResources,
    pub location: String,
    pub os_disk_sku: String,
    pub data_disk_sku: String,
    pub os_disk_size_gb: Option<i32>,
    pub hyperv_generation: String,
    pub skip_cleanup: bool,
    pub timeout: Duration,
}

impl CreateDiskset {
    fn os_disk_spec(&self, state: &BuildState) -> ChrootResult<DiskSpec> {
        let mut hyperv = self.hyperv_generation.clone();
        let creation = match &self.source {
            DisksetSource::Empty => DiskCreation::Empty,
            DisksetSource::Disk(id) => DiskCreation::Copy { source: id.clone() },
            DisksetSource::PlatformImage(_) => {
                let version = state.platform_image_version()?;
                if let Some(generation) = &version.hyper_v_generation {
                    hyperv = generation.clone();
                }
                DiskCreation::FromPlatformImage {
                    image_version_id: version.id.clone(),
                }
            }
            DisksetSource::SharedImageVersion(id) => DiskCreation::FromGalleryImage {
                version_id: id.clone(),
                lun: None,
            },
        };

        Ok(DiskSpec {
            location: self.location.clone(),
            sku: self.os_disk_sku.clone(),
            size_gb: self.os_disk_size_gb,
            hyper_v_generation: Some(hyperv),
            os_type: Some(OsType::Linux),
            creation,
        })
    }

    async fn create(
        &self,
        state: &mut BuildState,
        lun: i32,
        id: ResourceId,
        spec: DiskSpec,
    ) -> ChrootResult<()> {
        state.ui().message(&format!("Creating disk {}", id));
        bounded(
            "creating disk",
            self.timeout,
            &state.cancel,
            state.compute().create_disk(&id, &spec),
        )
        .await
        .map_err(|e| cloud_context(e, format!("Error creating disk {}", id)))?;

        tracing::info!(disk = %id, lun, "Disk created");
        state.publish_disk(lun, id);
        Ok(())
    }
}

#[async_trait]
impl BuildStep for CreateDiskset {
    fn name(&self) -> &'static str {
        "CreateDiskset"
    }

    async fn run(&mut self, state: &mut BuildState) -> ChrootResult<()> {
        state.ui().say("Creating disks");

        let os_spec = self.os_disk_spec(state)?;
        let os_disk = self.temporary.os_disk.clone();
        self.create(state, OS_DISK_LUN, os_disk, os_spec).await?;

        let DisksetSource::SharedImageVersion(version_id) = &self.source else {
            return Ok(());
        };

        let version = bounded(
            "reading gallery image version",
            self.timeout,
            &state.cancel,
            state.compute().get_gallery_image_version(version_id),
        )
        .await
        .map_err(|e| cloud_context(e, format!("Error reading {}", version_id)))?;

        for lun in version.data_disk_luns {
            let id = self.temporary.data_disk(lun)?;
            let spec = DiskSpec {
                location: self.location.clone(),
                sku: self.data_disk_sku.clone(),
                size_gb: None,
                hyper_v_generation: None,
                os_type: None,
                creation: DiskCreation::FromGalleryImage {
                    version_id: version_id.clone(),
                    lun: Some(lun),
                },
            };
            self.create(state, lun, id, spec).await?;
        }
        Ok(())
    }

    async fn cleanup(&mut self, state: &mut BuildState) {
        let Ok(diskset) = state.os_diskset().map(Clone::clone) else {
            return;
        };
        if self.skip_cleanup {
            state.ui().message(&format!(
                "Not deleting {} temporary disk(s) because skip_cleanup is set",
                diskset.len()
            ));
            return;
        }
        if state.cleanups.is_registered(CleanupKind::Attach) {
            state.ui().error(&format!(
                "Not deleting {} temporary disk(s) because the OS disk is still attached",
                diskset.len()
            ));
            return;
        }

        let cancel = teardown_token();
        for (_, id) in diskset.iter() {
            state.ui().message(&format!("Deleting disk {}", id));
            let result = bounded(
                "deleting disk",
                self.timeout,
                &cancel,
                state.compute().delete_disk(id),
            )
            .await;
            if let Err(e) = result {
                state
                    .ui()
                    .error(&format!("Error deleting disk {}: {}", id, e));
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
