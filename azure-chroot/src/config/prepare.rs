//! Defaults and validation.

use super::source::{DISK_TYPE, IMAGE_TYPE, SNAPSHOT_TYPE};
use super::{BuildConfig, ChrootMount, SourceKind};
use crate::azure::models::{parse_hyperv_generation, CachingType, STORAGE_ACCOUNT_TYPES};
use crate::lvm::validate_root_device_override;
use crate::resource::ResourceId;
use azure_chroot_shared::constants::{azure, defaults};
use azure_chroot_shared::errors::{ChrootError, ChrootResult};

impl BuildConfig {
    /// Fill defaults and validate.
    ///
    /// Every problem is collected into a single `ChrootError::InvalidConfig`.
    /// On success the returned strings are non-fatal warnings.
    pub fn prepare(&mut self) -> ChrootResult<Vec<String>> {
        self.apply_defaults();

        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        self.check_source(&mut errors);
        self.check_disk_settings(&mut errors);
        self.check_destination(&mut errors, &mut warnings);
        self.check_temporary_ids(&mut errors);
        self.check_mounts(&mut errors, &mut warnings);

        if !self.lvm_root_device.is_empty() {
            if let Err(e) = validate_root_device_override(&self.lvm_root_device) {
                errors.push(format!("lvm_root_device: {}", e));
            }
        }

        if errors.is_empty() {
            Ok(warnings)
        } else {
            Err(ChrootError::InvalidConfig(errors))
        }
    }

    fn apply_defaults(&mut self) {
        fn fill(field: &mut String, value: &str) {
            if field.is_empty() {
                *field = value.to_string();
            }
        }

        fill(&mut self.command_wrapper, defaults::COMMAND_WRAPPER);
        fill(&mut self.mount_partition, defaults::MOUNT_PARTITION);
        fill(&mut self.mount_path, defaults::MOUNT_PATH);
        fill(&mut self.device_link_dir, azure::DEVICE_LINK_DIR);
        fill(&mut self.os_disk_storage_account_type, defaults::STORAGE_ACCOUNT_TYPE);
        fill(&mut self.os_disk_cache_type, defaults::CACHE_TYPE);
        fill(&mut self.image_hyperv_generation, defaults::HYPERV_GENERATION);

        let os_sku = self.os_disk_storage_account_type.clone();
        fill(&mut self.data_disk_storage_account_type, &os_sku);
        let os_cache = self.os_disk_cache_type.clone();
        fill(&mut self.data_disk_cache_type, &os_cache);

        if self.chroot_mounts.is_empty() {
            self.chroot_mounts = defaults::CHROOT_MOUNTS
                .iter()
                .map(|(fstype, device, path)| ChrootMount {
                    fstype: fstype.to_string(),
                    device: device.to_string(),
                    path: path.to_string(),
                })
                .collect();
        }

        // A scratch disk has no /etc to copy into until pre-mount commands create it.
        if self.copy_files.is_none() {
            self.copy_files = Some(if self.from_scratch {
                Vec::new()
            } else {
                defaults::COPY_FILES.iter().map(|f| f.to_string()).collect()
            });
        }
    }

    fn check_source(&self, errors: &mut Vec<String>) {
        if self.from_scratch {
            if !self.source.is_empty() {
                errors.push("only one of source or from_scratch can be specified".into());
            }
            if self.os_disk_size_gb == 0 {
                errors.push("os_disk_size_gb is required with from_scratch".into());
            }
            if self.pre_mount_commands.is_empty() {
                errors.push(
                    "pre_mount_commands is required with from_scratch to partition and format the disk"
                        .into(),
                );
            }
            return;
        }

        if self.source.is_empty() {
            errors.push("source is required unless from_scratch is set".into());
            return;
        }
        if let Err(e) = SourceKind::detect(&self.source) {
            errors.push(e.to_string());
        }
    }

    fn check_disk_settings(&self, errors: &mut Vec<String>) {
        if self.os_disk_size_gb < 0 {
            errors.push("os_disk_size_gb must not be negative".into());
        }

        for (field, value) in [
            ("os_disk_storage_account_type", &self.os_disk_storage_account_type),
            ("data_disk_storage_account_type", &self.data_disk_storage_account_type),
        ] {
            if !STORAGE_ACCOUNT_TYPES.contains(&value.as_str()) {
                errors.push(format!(
                    "{}: '{}' is not valid; expected one of {}",
                    field,
                    value,
                    STORAGE_ACCOUNT_TYPES.join(", ")
                ));
            }
        }

        for (field, value) in [
            ("os_disk_cache_type", &self.os_disk_cache_type),
            ("data_disk_cache_type", &self.data_disk_cache_type),
        ] {
            if let Err(e) = value.parse::<CachingType>() {
                errors.push(format!("{}: {}", field, e));
            }
        }

        if let Err(e) = parse_hyperv_generation(&self.image_hyperv_generation) {
            errors.push(format!("image_hyperv_generation: {}", e));
        }
    }

    fn check_destination(&self, errors: &mut Vec<String>, warnings: &mut Vec<String>) {
        if self.skip_create_image {
            if !self.image_resource_id.is_empty() || self.shared_image_destination.is_some() {
                warnings.push(
                    "skip_create_image is set; image_resource_id and shared_image_destination are ignored"
                        .into(),
                );
            }
            return;
        }

        if self.image_resource_id.is_empty() && self.shared_image_destination.is_none() {
            errors.push("one of image_resource_id or shared_image_destination is required".into());
        }

        if !self.image_resource_id.is_empty() {
            check_id_type(errors, "image_resource_id", &self.image_resource_id, IMAGE_TYPE);
        }

        let Some(dest) = &self.shared_image_destination else {
            return;
        };
        for (field, value) in [
            ("resource_group", &dest.resource_group),
            ("gallery_name", &dest.gallery_name),
            ("image_name", &dest.image_name),
        ] {
            if value.is_empty() {
                errors.push(format!("shared_image_destination.{} is required", field));
            }
        }
        if !is_semantic_version(&dest.image_version) {
            errors.push(format!(
                "shared_image_destination.image_version: '{}' must be of the form major.minor.patch",
                dest.image_version
            ));
        }
        for region in &dest.target_regions {
            if region.name.trim().is_empty() {
                errors.push("shared_image_destination.target_regions: region name is required".into());
            }
            if let Some(sku) = &region.storage_account_type {
                if !STORAGE_ACCOUNT_TYPES.contains(&sku.as_str()) {
                    errors.push(format!(
                        "shared_image_destination.target_regions: storage account type '{}' is not valid",
                        sku
                    ));
                }
            }
        }

        if self.shared_image_gallery_replica_count < 0 {
            errors.push("shared_image_gallery_replica_count must not be negative".into());
        }
        if !self.shared_gallery_image_version_end_of_life_date.is_empty()
            && chrono::DateTime::parse_from_rfc3339(&self.shared_gallery_image_version_end_of_life_date)
                .is_err()
        {
            errors.push(format!(
                "shared_gallery_image_version_end_of_life_date: '{}' is not an RFC 3339 timestamp",
                self.shared_gallery_image_version_end_of_life_date
            ));
        }
    }

    fn check_temporary_ids(&self, errors: &mut Vec<String>) {
        if !self.temporary_os_disk_id.is_empty() {
            check_id_type(errors, "temporary_os_disk_id", &self.temporary_os_disk_id, DISK_TYPE);
        }
        if !self.temporary_os_disk_snapshot_id.is_empty() {
            check_id_type(
                errors,
                "temporary_os_disk_snapshot_id",
                &self.temporary_os_disk_snapshot_id,
                SNAPSHOT_TYPE,
            );
        }

        // Prefixes only become ids once a LUN is appended.
        for (field, prefix, expected) in [
            ("temporary_data_disk_id_prefix", &self.temporary_data_disk_id_prefix, DISK_TYPE),
            (
                "temporary_data_disk_snapshot_id_prefix",
                &self.temporary_data_disk_snapshot_id_prefix,
                SNAPSHOT_TYPE,
            ),
        ] {
            if !prefix.is_empty() {
                check_id_type(errors, field, &format!("{}0", prefix), expected);
            }
        }
    }

    fn check_mounts(&self, errors: &mut Vec<String>, warnings: &mut Vec<String>) {
        if !self.manual_mount_command.is_empty() && !self.mount_options.is_empty() {
            warnings.push("mount_options are ignored when manual_mount_command is set".into());
        }
        for mount in &self.chroot_mounts {
            if !mount.path.starts_with('/') {
                errors.push(format!(
                    "chroot_mounts: path '{}' must be absolute",
                    mount.path
                ));
            }
        }
        for file in self.copy_files.iter().flatten() {
            if !file.starts_with('/') {
                errors.push(format!("copy_files: '{}' must be an absolute path", file));
            }
        }
        if self.mount_partition.parse::<u32>().is_err() {
            errors.push(format!(
                "mount_partition: '{}' is not a partition number",
                self.mount_partition
            ));
        }
    }
}

fn check_id_type(errors: &mut Vec<String>, field: &str, value: &str, expected: &str) {
    match value.parse::<ResourceId>() {
        Ok(id) if id.is_type(expected) => {}
        Ok(id) => errors.push(format!(
            "{}: '{}' is a {}, expected {}",
            field,
            value,
            id.resource_type(),
            expected
        )),
        Err(e) => errors.push(format!("{}: {}", field, e)),
    }
}

fn is_semantic_version(version: &str) -> bool {
    let parts: Vec<&str> = version.split('.').collect();
    parts.len() == 3
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}
