//! Classification of the `source` setting.

use crate::azure::PlatformImage;
use crate::resource::ResourceId;
use azure_chroot_shared::errors::{ChrootError, ChrootResult};

pub const DISK_TYPE: &str = "Microsoft.Compute/disks";
pub const SNAPSHOT_TYPE: &str = "Microsoft.Compute/snapshots";
pub const IMAGE_TYPE: &str = "Microsoft.Compute/images";
pub const GALLERY_IMAGE_TYPE: &str = "Microsoft.Compute/galleries/images";
pub const GALLERY_IMAGE_VERSION_TYPE: &str = "Microsoft.Compute/galleries/images/versions";

/// Where the OS disk content comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    /// Empty disk, populated by `pre_mount_commands`.
    FromScratch,
    PlatformImage(PlatformImage),
    Disk(ResourceId),
    SharedImageVersion(ResourceId),
}

impl SourceKind {
    /// Classify a non-empty `source` string.
    pub fn detect(source: &str) -> ChrootResult<Self> {
        if let Ok(image) = source.parse::<PlatformImage>() {
            return Ok(SourceKind::PlatformImage(image));
        }

        if let Ok(id) = source.parse::<ResourceId>() {
            if id.is_type(DISK_TYPE) {
                return Ok(SourceKind::Disk(id));
            }
            if id.is_type(GALLERY_IMAGE_VERSION_TYPE) {
                return Ok(SourceKind::SharedImageVersion(id));
            }
        }

        Err(ChrootError::Config(format!(
            "source: '{}' is not a valid platform image specifier, nor is it a disk \
             or shared image version resource id",
            source
        )))
    }

    pub fn describe(&self) -> &'static str {
        match self {
            SourceKind::FromScratch => "empty disk",
            SourceKind::PlatformImage(_) => "platform image",
            SourceKind::Disk(_) => "managed disk",
            SourceKind::SharedImageVersion(_) => "shared image version",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_platform_image() {
        let kind = SourceKind::detect("publisher:offer:sku:latest").unwrap();
        assert!(matches!(kind, SourceKind::PlatformImage(pi) if pi.offer == "offer"));
    }

    #[test]
    fn detects_disk() {
        let kind = SourceKind::detect(
            "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Compute/disks/osdisk",
        )
        .unwrap();
        assert!(matches!(kind, SourceKind::Disk(id) if id.name() == "osdisk"));
    }

    #[test]
    fn detects_gallery_version_case_insensitively() {
        let kind = SourceKind::detect(
            "/subscriptions/sub/resourcegroups/rg/providers/microsoft.compute/galleries/g/images/i/versions/1.0.0",
        )
        .unwrap();
        assert!(matches!(kind, SourceKind::SharedImageVersion(_)));
    }

    #[test]
    fn rejects_other_resources() {
        assert!(SourceKind::detect(
            "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Compute/images/img"
        )
        .is_err());
        assert!(SourceKind::detect("ubuntu").is_err());
    }
}
