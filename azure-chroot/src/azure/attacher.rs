//! Attach and detach managed disks on the VM the build runs on.

use super::metadata::InstanceMetadata;
use super::models::{CachingType, DataDisk};
use super::ComputeApi;
use crate::resource::ResourceId;
use crate::util::{bounded, sleep_or_cancel};
use azure_chroot_shared::constants::azure::{DEVICE_LINK_DIR, MAX_DATA_DISK_LUNS};
use azure_chroot_shared::constants::defaults::POLLING_DURATION_TIMEOUT_SECS;
use azure_chroot_shared::errors::{ChrootError, ChrootResult};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Interval between device and detach polls.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Attaches disks to the current VM and waits for the kernel to expose them.
#[derive(Clone)]
pub struct DiskAttacher {
    compute: Arc<dyn ComputeApi>,
    vm: InstanceMetadata,
    device_link_dir: PathBuf,
    poll_interval: Duration,
    timeout: Duration,
}

impl DiskAttacher {
    pub fn new(compute: Arc<dyn ComputeApi>, vm: InstanceMetadata) -> Self {
        Self {
            compute,
            vm,
            device_link_dir: PathBuf::from(DEVICE_LINK_DIR),
            poll_interval: POLL_INTERVAL,
            timeout: Duration::from_secs(POLLING_DURATION_TIMEOUT_SECS),
        }
    }

    /// Directory holding the `lun<N>` links.
    pub fn with_device_link_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.device_link_dir = dir.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Deadline for each remote call and each wait loop.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Attach `disk` and return its LUN.
    ///
    /// A disk that is already attached keeps its LUN; otherwise the lowest
    /// free LUN is used.
    pub async fn attach_disk(
        &self,
        disk: &ResourceId,
        cancel: &CancellationToken,
    ) -> ChrootResult<i32> {
        let mut disks = self.data_disks(cancel).await?;

        if let Some(existing) = disks.iter().find(|d| d.managed_disk.eq_ignore_case(disk)) {
            tracing::info!(disk = %disk, lun = existing.lun, "Disk already attached");
            return Ok(existing.lun);
        }

        let lun = first_free_lun(&disks).ok_or_else(|| {
            ChrootError::Device(format!(
                "no free LUN on VM {} to attach {}",
                self.vm.name, disk
            ))
        })?;

        disks.push(DataDisk {
            lun,
            managed_disk: disk.clone(),
            caching: CachingType::ReadWrite,
        });
        self.set_data_disks(disks, cancel).await?;

        tracing::info!(disk = %disk, lun, "Disk attached");
        Ok(lun)
    }

    /// Wait until the device for `lun` shows up and return its resolved path.
    pub async fn wait_for_device(
        &self,
        lun: i32,
        cancel: &CancellationToken,
    ) -> ChrootResult<String> {
        let link = self.device_link_dir.join(format!("lun{}", lun));
        bounded("waiting for attached device", self.timeout, cancel, async {
            loop {
                match tokio::fs::canonicalize(&link).await {
                    Ok(path) => {
                        let device = path.to_string_lossy().into_owned();
                        tracing::debug!(link = %link.display(), device = %device, "Device link resolved");
                        return Ok(device);
                    }
                    Err(e) if e.kind() == ErrorKind::NotFound => {
                        tracing::trace!(link = %link.display(), "Device link not present yet");
                    }
                    Err(e) => {
                        return Err(ChrootError::Device(format!(
                            "Failed to resolve {}: {}",
                            link.display(),
                            e
                        )));
                    }
                }
                sleep_or_cancel(self.poll_interval, cancel).await?;
            }
        })
        .await
    }

    /// Remove `disk` from the VM's data disks. Detaching an absent disk is a no-op.
    pub async fn detach_disk(
        &self,
        disk: &ResourceId,
        cancel: &CancellationToken,
    ) -> ChrootResult<()> {
        let disks = self.data_disks(cancel).await?;
        let before = disks.len();
        let remaining: Vec<DataDisk> = disks
            .into_iter()
            .filter(|d| !d.managed_disk.eq_ignore_case(disk))
            .collect();

        if remaining.len() == before {
            tracing::info!(disk = %disk, "Disk not attached, nothing to detach");
            return Ok(());
        }

        self.set_data_disks(remaining, cancel).await
    }

    /// Poll the VM model until `disk` is no longer listed.
    pub async fn wait_for_detach(
        &self,
        disk: &ResourceId,
        cancel: &CancellationToken,
    ) -> ChrootResult<()> {
        bounded("waiting for disk detach", self.timeout, cancel, async {
            loop {
                let disks = self.data_disks(cancel).await?;
                if !disks.iter().any(|d| d.managed_disk.eq_ignore_case(disk)) {
                    return Ok(());
                }
                sleep_or_cancel(self.poll_interval, cancel).await?;
            }
        })
        .await
    }

    // Scale-set instances reject the plain VM id, so every VM call falls back
    // to the scale-set form. The fallback triggers on any error.

    async fn data_disks(&self, cancel: &CancellationToken) -> ChrootResult<Vec<DataDisk>> {
        let vm_id = self.vm.vm_id();
        let first = bounded(
            "reading VM data disks",
            self.timeout,
            cancel,
            self.compute.get_vm_data_disks(&vm_id),
        )
        .await;

        match (first, self.vm.vmss_vm_id()) {
            (Ok(disks), _) => Ok(disks),
            (Err(e), _) if e.is_cancelled() => Err(e),
            (Err(e), Some(vmss_id)) => {
                tracing::warn!(vm = %vm_id, "VM lookup failed, retrying as scale-set VM: {}", e);
                bounded(
                    "reading scale-set VM data disks",
                    self.timeout,
                    cancel,
                    self.compute.get_vm_data_disks(&vmss_id),
                )
                .await
            }
            (Err(e), None) => Err(e),
        }
    }

    async fn set_data_disks(
        &self,
        disks: Vec<DataDisk>,
        cancel: &CancellationToken,
    ) -> ChrootResult<()> {
        let vm_id = self.vm.vm_id();
        let first = bounded(
            "updating VM data disks",
            self.timeout,
            cancel,
            self.compute.set_vm_data_disks(&vm_id, disks.clone()),
        )
        .await;

        match (first, self.vm.vmss_vm_id()) {
            (Ok(()), _) => Ok(()),
            (Err(e), _) if e.is_cancelled() => Err(e),
            (Err(e), Some(vmss_id)) => {
                tracing::warn!(vm = %vm_id, "VM update failed, retrying as scale-set VM: {}", e);
                bounded(
                    "updating scale-set VM data disks",
                    self.timeout,
                    cancel,
                    self.compute.set_vm_data_disks(&vmss_id, disks),
                )
                .await
            }
            (Err(e), None) => Err(e),
        }
    }
}

/// Lowest LUN in `0..MAX_DATA_DISK_LUNS` not used by `disks`.
pub fn first_free_lun(disks: &[DataDisk]) -> Option<i32> {
    (0..MAX_DATA_DISK_LUNS).find(|lun| !disks.iter().any(|d| d.lun == *lun))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_disk(lun: i32) -> DataDisk {
        DataDisk {
            lun,
            managed_disk: ResourceId::compute("sub", "rg", "disks", &format!("d{}", lun)),
            caching: CachingType::None,
        }
    }

    #[test]
    fn first_free_lun_fills_gaps() {
        assert_eq!(first_free_lun(&[]), Some(0));
        assert_eq!(first_free_lun(&[data_disk(0), data_disk(1), data_disk(3)]), Some(2));
    }

    #[test]
    fn first_free_lun_exhausted() {
        let all: Vec<DataDisk> = (0..MAX_DATA_DISK_LUNS).map(data_disk).collect();
        assert_eq!(first_free_lun(&all), None);
    }
}
