//! Cloud control-plane interfaces.
//!
//! The builder never talks to ARM directly. Everything it needs from Azure
//! goes through [`ComputeApi`] and [`MetadataSource`], so a build can run
//! against a real client or an in-memory fake.

pub mod attacher;
#[cfg(feature = "imds")]
pub mod imds;
pub mod metadata;
pub mod models;

use crate::resource::ResourceId;
use async_trait::async_trait;
use azure_chroot_shared::errors::ChrootResult;

pub use attacher::DiskAttacher;
pub use metadata::{CachedMetadata, InstanceMetadata};
pub use models::{
    CachingType, DataDisk, Disk, DiskCreation, DiskSpec, GalleryImage, GalleryImageVersion,
    GalleryImageVersionSpec, ImageDisk, ImageSpec, OsType, PlatformImage, PlatformImageVersion,
    SnapshotSpec, TargetRegion,
};

/// Disk, snapshot, image and VM operations.
///
/// Create and delete calls resolve only once the long-running operation has
/// finished. Callers bound every call with a deadline.
#[async_trait]
pub trait ComputeApi: Send + Sync {
    async fn get_disk(&self, id: &ResourceId) -> ChrootResult<Disk>;

    async fn create_disk(&self, id: &ResourceId, spec: &DiskSpec) -> ChrootResult<Disk>;

    async fn delete_disk(&self, id: &ResourceId) -> ChrootResult<()>;

    async fn create_snapshot(&self, id: &ResourceId, spec: &SnapshotSpec) -> ChrootResult<()>;

    async fn delete_snapshot(&self, id: &ResourceId) -> ChrootResult<()>;

    async fn create_image(&self, id: &ResourceId, spec: &ImageSpec) -> ChrootResult<()>;

    async fn get_gallery_image(&self, id: &ResourceId) -> ChrootResult<GalleryImage>;

    async fn get_gallery_image_version(&self, id: &ResourceId) -> ChrootResult<GalleryImageVersion>;

    /// Versions under a gallery image.
    async fn list_gallery_image_versions(
        &self,
        image: &ResourceId,
    ) -> ChrootResult<Vec<GalleryImageVersion>>;

    async fn create_gallery_image_version(
        &self,
        id: &ResourceId,
        spec: &GalleryImageVersionSpec,
    ) -> ChrootResult<GalleryImageVersion>;

    /// Version strings published for `image` in `location`.
    async fn list_platform_image_versions(
        &self,
        location: &str,
        image: &PlatformImage,
    ) -> ChrootResult<Vec<String>>;

    /// Details of one concrete platform image version.
    async fn get_platform_image_version(
        &self,
        location: &str,
        image: &PlatformImage,
    ) -> ChrootResult<PlatformImageVersion>;

    /// Data disks attached to a VM or scale-set VM.
    async fn get_vm_data_disks(&self, vm: &ResourceId) -> ChrootResult<Vec<DataDisk>>;

    /// Replace the data disk list of a VM or scale-set VM.
    async fn set_vm_data_disks(&self, vm: &ResourceId, disks: Vec<DataDisk>) -> ChrootResult<()>;
}

/// Identity of the VM the build runs on.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn instance(&self) -> ChrootResult<InstanceMetadata>;
}
