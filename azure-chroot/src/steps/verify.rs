//! Pre-flight checks on sources and destinations. None acquire resources.

use super::cloud_context;
use crate::azure::models::{compare_versions, normalize_location};
use crate::azure::{OsType, PlatformImage, PlatformImageVersion};
use crate::config::SharedImageDestination;
use crate::pipeline::{BuildState, BuildStep};
use crate::resource::ResourceId;
use crate::util::bounded;
use async_trait::async_trait;
use azure_chroot_shared::errors::{ChrootError, ChrootResult};
use std::any::Any;
use std::time::Duration;

fn same_subscription(id: &ResourceId, subscription: &str) -> bool {
    id.subscription().eq_ignore_ascii_case(subscription)
}

fn same_location(a: &str, b: &str) -> bool {
    normalize_location(a) == normalize_location(b)
}

// ============================================================================
// Shared image destination
// ============================================================================

/// The gallery image exists next to the VM and the version is still free.
pub struct VerifySharedImageDestination {
    pub destination: SharedImageDestination,
    pub subscription: String,
    pub location: String,
    pub timeout: Duration,
}

#[async_trait]
impl BuildStep for VerifySharedImageDestination {
    fn name(&self) -> &'static str {
        "VerifySharedImageDestination"
    }

    async fn run(&mut self, state: &mut BuildState) -> ChrootResult<()> {
        let image_id = self.destination.image_id(&self.subscription);
        state
            .ui()
            .say(&format!("Validating that shared image {} exists", image_id));

        let image = bounded(
            "reading gallery image",
            self.timeout,
            &state.cancel,
            state.compute().get_gallery_image(&image_id),
        )
        .await
        .map_err(|e| cloud_context(e, format!("Error retrieving shared image {}", image_id)))?;

        if image.os_type != OsType::Linux {
            return Err(ChrootError::Config(format!(
                "shared image destination {} is not a Linux image",
                image_id
            )));
        }
        if !same_location(&image.location, &self.location) {
            return Err(ChrootError::Config(format!(
                "shared image destination {} is in {} but this VM is in {}; \
                 the image definition must be in the VM's location",
                image_id, image.location, self.location
            )));
        }

        let versions = bounded(
            "listing gallery image versions",
            self.timeout,
            &state.cancel,
            state.compute().list_gallery_image_versions(&image_id),
        )
        .await
        .map_err(|e| cloud_context(e, format!("Error listing versions of {}", image_id)))?;

        let wanted = &self.destination.image_version;
        if versions.iter().any(|v| v.id.name().eq_ignore_ascii_case(wanted)) {
            return Err(ChrootError::Config(format!(
                "shared image version {} already exists for image {}",
                wanted, image_id
            )));
        }

        state
            .ui()
            .message(&format!("Found image {}, version {} is available", image_id, wanted));
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Managed disk source
// ============================================================================

/// The source disk exists in the VM's subscription and location.
pub struct VerifySourceDisk {
    pub source: ResourceId,
    pub subscription: String,
    pub location: String,
    pub timeout: Duration,
}

#[async_trait]
impl BuildStep for VerifySourceDisk {
    fn name(&self) -> &'static str {
        "VerifySourceDisk"
    }

    async fn run(&mut self, state: &mut BuildState) -> ChrootResult<()> {
        state
            .ui()
            .say(&format!("Checking source disk {}", self.source));

        if !same_subscription(&self.source, &self.subscription) {
            return Err(ChrootError::Config(format!(
                "source disk has to be in the subscription of this VM ({}), not {}",
                self.subscription,
                self.source.subscription()
            )));
        }

        let disk = bounded(
            "reading source disk",
            self.timeout,
            &state.cancel,
            state.compute().get_disk(&self.source),
        )
        .await
        .map_err(|e| cloud_context(e, format!("Unable to retrieve source disk {}", self.source)))?;

        if !same_location(&disk.location, &self.location) {
            return Err(ChrootError::Config(format!(
                "source disk has to be in the same location as this VM ({}), not {}",
                self.location, disk.location
            )));
        }

        state.set_source_image_name(self.source.to_string());
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Platform image source
// ============================================================================

/// Pin a platform image to a concrete version and read its generation.
pub struct ResolvePlatformImageVersion {
    pub image: PlatformImage,
    pub location: String,
    pub timeout: Duration,
}

impl ResolvePlatformImageVersion {
    async fn latest_version(&self, state: &BuildState) -> ChrootResult<String> {
        let versions = bounded(
            "listing platform image versions",
            self.timeout,
            &state.cancel,
            state
                .compute()
                .list_platform_image_versions(&self.location, &self.image),
        )
        .await
        .map_err(|e| cloud_context(e, format!("Error listing versions of {}", self.image)))?;

        versions
            .into_iter()
            .max_by(|a, b| compare_versions(a, b))
            .ok_or_else(|| {
                ChrootError::Cloud(format!(
                    "no versions of {} are available in {}",
                    self.image, self.location
                ))
            })
    }
}

#[async_trait]
impl BuildStep for ResolvePlatformImageVersion {
    fn name(&self) -> &'static str {
        "ResolvePlatformImageVersion"
    }

    async fn run(&mut self, state: &mut BuildState) -> ChrootResult<()> {
        let mut image = self.image.clone();
        if image.is_latest() {
            state
                .ui()
                .say(&format!("Resolving latest version of {}", self.image));
            image.version = self.latest_version(state).await?;
            state
                .ui()
                .message(&format!("Resolved to version {}", image.version));
        }

        let version: PlatformImageVersion = bounded(
            "reading platform image version",
            self.timeout,
            &state.cancel,
            state
                .compute()
                .get_platform_image_version(&self.location, &image),
        )
        .await
        .map_err(|e| cloud_context(e, format!("Error retrieving platform image {}", image)))?;

        tracing::info!(
            image = %image,
            id = %version.id,
            hyperv = ?version.hyper_v_generation,
            "Resolved platform image"
        );
        state.set_source_image_name(version.id.clone());
        state.set_platform_image_version(version);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Shared image version source
// ============================================================================

/// The source gallery version is usable from this VM.
pub struct VerifySharedImageSource {
    pub source: ResourceId,
    pub subscription: String,
    pub location: String,
    pub timeout: Duration,
}

#[async_trait]
impl BuildStep for VerifySharedImageSource {
    fn name(&self) -> &'static str {
        "VerifySharedImageSource"
    }

    async fn run(&mut self, state: &mut BuildState) -> ChrootResult<()> {
        state
            .ui()
            .say(&format!("Checking shared image version {}", self.source));

        if !same_subscription(&self.source, &self.subscription) {
            return Err(ChrootError::Config(format!(
                "source shared image version has to be in the subscription of this VM ({}), not {}",
                self.subscription,
                self.source.subscription()
            )));
        }

        let version = bounded(
            "reading gallery image version",
            self.timeout,
            &state.cancel,
            state.compute().get_gallery_image_version(&self.source),
        )
        .await
        .map_err(|e| {
            cloud_context(e, format!("Unable to retrieve shared image version {}", self.source))
        })?;

        if !version
            .target_regions
            .iter()
            .any(|r| same_location(r, &self.location))
        {
            return Err(ChrootError::Config(format!(
                "shared image version {} is not replicated to {}; replicated to: {}",
                self.source,
                self.location,
                version.target_regions.join(", ")
            )));
        }

        let image_id = self.source.parent().ok_or_else(|| {
            ChrootError::Internal(format!("{} has no parent image", self.source))
        })?;
        let image = bounded(
            "reading gallery image",
            self.timeout,
            &state.cancel,
            state.compute().get_gallery_image(&image_id),
        )
        .await
        .map_err(|e| cloud_context(e, format!("Unable to retrieve shared image {}", image_id)))?;

        if image.os_type != OsType::Linux {
            return Err(ChrootError::Config(format!(
                "shared image {} is not a Linux image",
                image_id
            )));
        }

        state.set_source_image_name(self.source.to_string());
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
