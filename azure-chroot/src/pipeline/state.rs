//! Typed state shared by the steps of one build.

use super::cleanup::CleanupRegistry;
use crate::azure::{CachedMetadata, ComputeApi, PlatformImageVersion};
use crate::resource::{Diskset, ResourceId};
use crate::steps::ProvisionHook;
use crate::util::{CommandRunner, Ui};
use azure_chroot_shared::errors::{ChrootError, ChrootResult};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// External collaborators a build talks to.
#[derive(Clone)]
pub struct Services {
    pub compute: Arc<dyn ComputeApi>,
    pub runner: Arc<dyn CommandRunner>,
    pub metadata: CachedMetadata,
    pub ui: Arc<dyn Ui>,
}

/// Values published for downstream tooling, e.g. `SourceImageName`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GeneratedData(BTreeMap<String, String>);

impl GeneratedData {
    pub const SOURCE_IMAGE_NAME: &'static str = "SourceImageName";

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.0
    }
}

/// Everything the steps read and write while a build runs.
pub struct BuildState {
    pub services: Services,
    pub hook: Arc<dyn ProvisionHook>,
    pub cancel: CancellationToken,

    device: Option<String>,
    device_mount: Option<String>,
    mount_path: Option<PathBuf>,
    /// Set once the root device is a logical volume.
    pub lvm_active: bool,
    os_diskset: Option<Diskset>,
    snapshotset: Option<Diskset>,
    platform_image_version: Option<PlatformImageVersion>,

    pub image_id: Option<ResourceId>,
    pub shared_image_version_id: Option<ResourceId>,

    pub cleanups: CleanupRegistry,
    /// First fatal error of the run.
    pub error: Option<ChrootError>,
    pub generated: GeneratedData,
}

fn missing(producer: &str) -> ChrootError {
    ChrootError::Internal(format!("{} step must run first", producer))
}

impl BuildState {
    pub fn new(services: Services, hook: Arc<dyn ProvisionHook>, cancel: CancellationToken) -> Self {
        Self {
            services,
            hook,
            cancel,
            device: None,
            device_mount: None,
            mount_path: None,
            lvm_active: false,
            os_diskset: None,
            snapshotset: None,
            platform_image_version: None,
            image_id: None,
            shared_image_version_id: None,
            cleanups: CleanupRegistry::new(),
            error: None,
            generated: GeneratedData::default(),
        }
    }

    pub fn ui(&self) -> &dyn Ui {
        self.services.ui.as_ref()
    }

    pub fn runner(&self) -> &dyn CommandRunner {
        self.services.runner.as_ref()
    }

    pub fn compute(&self) -> &dyn ComputeApi {
        self.services.compute.as_ref()
    }

    /// Current block device: the attached disk, or the root LV once LVM is set up.
    pub fn device(&self) -> ChrootResult<&str> {
        self.device.as_deref().ok_or_else(|| missing("AttachDisk"))
    }

    pub fn set_device(&mut self, device: impl Into<String>) {
        self.device = Some(device.into());
    }

    /// Device actually mounted, including any partition suffix.
    pub fn device_mount(&self) -> ChrootResult<&str> {
        self.device_mount.as_deref().ok_or_else(|| missing("MountDevice"))
    }

    pub fn set_device_mount(&mut self, device: impl Into<String>) {
        self.device_mount = Some(device.into());
    }

    pub fn mount_path(&self) -> ChrootResult<&Path> {
        self.mount_path.as_deref().ok_or_else(|| missing("MountDevice"))
    }

    pub fn set_mount_path(&mut self, path: impl Into<PathBuf>) {
        self.mount_path = Some(path.into());
    }

    pub fn os_diskset(&self) -> ChrootResult<&Diskset> {
        self.os_diskset.as_ref().ok_or_else(|| missing("CreateDiskset"))
    }

    /// Record one created disk. Called after each disk so a later failure
    /// still knows what to delete.
    pub fn publish_disk(&mut self, lun: i32, id: ResourceId) {
        self.os_diskset.get_or_insert_with(Diskset::new).insert(lun, id);
    }

    pub fn snapshotset(&self) -> ChrootResult<&Diskset> {
        self.snapshotset.as_ref().ok_or_else(|| missing("CreateSnapshotset"))
    }

    pub fn publish_snapshot(&mut self, lun: i32, id: ResourceId) {
        self.snapshotset.get_or_insert_with(Diskset::new).insert(lun, id);
    }

    pub fn platform_image_version(&self) -> ChrootResult<&PlatformImageVersion> {
        self.platform_image_version
            .as_ref()
            .ok_or_else(|| missing("ResolvePlatformImageVersion"))
    }

    pub fn set_platform_image_version(&mut self, version: PlatformImageVersion) {
        self.platform_image_version = Some(version);
    }

    pub fn set_source_image_name(&mut self, name: impl Into<String>) {
        self.generated.put(GeneratedData::SOURCE_IMAGE_NAME, name);
    }

    pub fn source_image_name(&self) -> Option<&str> {
        self.generated.get(GeneratedData::SOURCE_IMAGE_NAME)
    }
}
