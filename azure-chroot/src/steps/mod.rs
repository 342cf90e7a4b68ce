//! Build steps and step list assembly.
//!
//! ```text
//! [VerifySharedImageDestination]
//! source: CreateDiskset | ResolvePlatformImageVersion → CreateDiskset
//!         | VerifySourceDisk → CreateDiskset | VerifySharedImageSource → CreateDiskset
//! AttachDisk → SetupLvm → PreMountCommands → MountDevice → PostMountCommands
//!   → MountExtra → CopyFiles → ChrootProvision → PreUnmountCommands → EarlyCleanup
//! capture: CreateImage and/or CreateSnapshotset → CreateSharedImageVersion | SkipCapture
//! ```

mod attach;
mod capture;
mod commands;
mod copy_files;
mod diskset;
mod early_cleanup;
mod lvm;
mod mount;
mod mount_extra;
mod provision;
mod verify;

pub use attach::AttachDisk;
pub use capture::{CreateImage, CreateSharedImageVersion, CreateSnapshotset, SkipCapture};
pub use commands::{CommandPhase, HostCommands};
pub use copy_files::CopyFiles;
pub use diskset::{CreateDiskset, DisksetSource};
pub use early_cleanup::EarlyCleanup;
pub use lvm::SetupLvm;
pub use mount::{partition_device, MountDevice};
pub use mount_extra::MountExtra;
pub use provision::{ChrootProvision, CommandProvisioner, ProvisionHook};
pub use verify::{
    ResolvePlatformImageVersion, VerifySharedImageDestination, VerifySharedImageSource,
    VerifySourceDisk,
};

use crate::azure::InstanceMetadata;
use crate::config::{BuildConfig, SourceKind};
use crate::pipeline::{BuildState, BuildStep, CleanupKind};
use crate::util::Ui;
use azure_chroot_shared::errors::{ChrootError, ChrootResult};
use chrono::Utc;
use std::fmt::Display;
use tokio_util::sync::CancellationToken;

/// Assemble the ordered step list for `config` on the VM described by `vm`.
///
/// `config` must have been through [`BuildConfig::prepare`].
pub fn build_steps(
    config: &BuildConfig,
    vm: &InstanceMetadata,
    ui: &dyn Ui,
) -> ChrootResult<Vec<Box<dyn BuildStep>>> {
    let source = config.source_kind().map_err(|e| {
        ChrootError::Internal(format!("unrecognised source reached step assembly: {}", e))
    })?;
    let temporary = config.temporary_resources(vm, Utc::now())?;
    let timeout = config.polling_timeout();
    let hyperv = config.image_hyperv_generation.clone();

    let mut steps: Vec<Box<dyn BuildStep>> = Vec::new();

    let destination = config
        .shared_image_destination
        .as_ref()
        .filter(|_| !config.skip_create_image);
    if let Some(dest) = destination {
        ui.message(&format!(
            "Publishing to shared image {}/{} version {}",
            dest.gallery_name, dest.image_name, dest.image_version
        ));
        steps.push(Box::new(VerifySharedImageDestination {
            destination: dest.clone(),
            subscription: vm.subscription_id.clone(),
            location: vm.location.clone(),
            timeout,
        }));
    }

    ui.message(&format!("Source is a {}", source.describe()));
    let diskset_source = match source {
        SourceKind::FromScratch => DisksetSource::Empty,
        SourceKind::PlatformImage(image) => {
            steps.push(Box::new(ResolvePlatformImageVersion {
                image: image.clone(),
                location: vm.location.clone(),
                timeout,
            }));
            DisksetSource::PlatformImage(image)
        }
        SourceKind::Disk(id) => {
            steps.push(Box::new(VerifySourceDisk {
                source: id.clone(),
                subscription: vm.subscription_id.clone(),
                location: vm.location.clone(),
                timeout,
            }));
            DisksetSource::Disk(id)
        }
        SourceKind::SharedImageVersion(id) => {
            steps.push(Box::new(VerifySharedImageSource {
                source: id.clone(),
                subscription: vm.subscription_id.clone(),
                location: vm.location.clone(),
                timeout,
            }));
            DisksetSource::SharedImageVersion(id)
        }
    };

    steps.push(Box::new(CreateDiskset {
        source: diskset_source,
        temporary: temporary.clone(),
        location: vm.location.clone(),
        os_disk_sku: config.os_disk_storage_account_type.clone(),
        data_disk_sku: config.data_disk_storage_account_type.clone(),
        os_disk_size_gb: Some(config.os_disk_size_gb).filter(|s| *s > 0),
        hyperv_generation: hyperv.clone(),
        skip_cleanup: config.skip_cleanup,
        timeout,
    }));

    let wrapper = config.command_wrapper.clone();
    steps.push(Box::new(AttachDisk {
        vm: vm.clone(),
        device_link_dir: config.device_link_dir.clone().into(),
        timeout,
    }));
    steps.push(Box::new(SetupLvm {
        root_device_override: Some(config.lvm_root_device.clone()).filter(|d| !d.is_empty()),
    }));
    steps.push(Box::new(HostCommands::new(
        CommandPhase::PreMount,
        config.pre_mount_commands.clone(),
        &wrapper,
    )));
    steps.push(Box::new(MountDevice {
        mount_path: config.mount_path.clone(),
        mount_partition: config.mount_partition.clone(),
        mount_options: config.mount_options.clone(),
        manual_mount_command: config.manual_mount_command.clone(),
        wrapper: wrapper.clone(),
    }));
    steps.push(Box::new(HostCommands::new(
        CommandPhase::PostMount,
        config.post_mount_commands.clone(),
        &wrapper,
    )));
    steps.push(Box::new(MountExtra {
        mounts: config.chroot_mounts.clone(),
        wrapper: wrapper.clone(),
    }));
    steps.push(Box::new(CopyFiles {
        files: config.copy_files.clone().unwrap_or_default(),
        wrapper: wrapper.clone(),
    }));
    steps.push(Box::new(ChrootProvision));
    steps.push(Box::new(HostCommands::new(
        CommandPhase::PreUnmount,
        config.pre_unmount_commands.clone(),
        &wrapper,
    )));
    steps.push(Box::new(EarlyCleanup));

    if config.skip_create_image {
        steps.push(Box::new(SkipCapture));
        return Ok(steps);
    }

    if let Some(image_id) = config.image_id()? {
        steps.push(Box::new(CreateImage {
            image_id,
            location: vm.location.clone(),
            hyperv_generation: hyperv,
            os_disk_sku: config.os_disk_storage_account_type.clone(),
            os_disk_caching: config.os_disk_cache_type.parse()?,
            data_disk_sku: config.data_disk_storage_account_type.clone(),
            data_disk_caching: config.data_disk_cache_type.parse()?,
            timeout,
        }));
    }

    if let Some(dest) = destination {
        steps.push(Box::new(CreateSnapshotset {
            temporary,
            location: vm.location.clone(),
            skip_cleanup: config.skip_cleanup,
            timeout,
        }));
        steps.push(Box::new(CreateSharedImageVersion {
            destination: dest.clone(),
            subscription: vm.subscription_id.clone(),
            location: vm.location.clone(),
            replica_count: Some(config.shared_image_gallery_replica_count).filter(|c| *c > 0),
            end_of_life_date: Some(config.shared_gallery_image_version_end_of_life_date.clone())
                .filter(|d| !d.is_empty()),
            os_disk_caching: config.os_disk_cache_type.parse()?,
            data_disk_caching: config.data_disk_cache_type.parse()?,
            timeout: config.gallery_timeout(),
        }));
    }

    Ok(steps)
}

/// Attach a description of the failed remote call, keeping cancellation and
/// timeouts recognisable.
fn cloud_context(e: ChrootError, what: impl Display) -> ChrootError {
    match e {
        ChrootError::Cancelled | ChrootError::Timeout(_) => e,
        other => ChrootError::Cloud(format!("{}: {}", what, other)),
    }
}

/// Teardown runs even after the build was cancelled, so it gets its own token.
fn teardown_token() -> CancellationToken {
    CancellationToken::new()
}

/// Release one registry slot from a step's `cleanup`, reporting failures.
async fn release_from_step(state: &mut BuildState, kind: CleanupKind) {
    let cancel = teardown_token();
    if let Err(e) = state.cleanups.release(kind, &cancel).await {
        state.ui().error(&format!("Error during cleanup: {}", e));
    }
}
