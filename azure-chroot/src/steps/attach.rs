use super::release_from_step;
use crate::azure::{DiskAttacher, InstanceMetadata};
use crate::pipeline::{AttachedDisk, BuildState, BuildStep, CleanupHandle, CleanupKind};
use async_trait::async_trait;
use azure_chroot_shared::errors::{ChrootError, ChrootResult};
use std::any::Any;
use std::path::PathBuf;
use std::time::Duration;

/// Attach the OS disk to this VM and wait for its block device.
pub struct AttachDisk {
    pub vm: InstanceMetadata,
    pub device_link_dir: PathBuf,
    pub timeout: Duration,
}

#[async_trait]
impl BuildStep for AttachDisk {
    fn name(&self) -> &'static str {
        "AttachDisk"
    }

    async fn run(&mut self, state: &mut BuildState) -> ChrootResult<()> {
        let disk = state
            .os_diskset()?
            .os_disk()
            .cloned()
            .ok_or_else(|| ChrootError::Internal("diskset has no OS disk".into()))?;

        let attacher = DiskAttacher::new(state.services.compute.clone(), self.vm.clone())
            .with_device_link_dir(self.device_link_dir.clone())
            .with_timeout(self.timeout);

        state.ui().say(&format!("Attaching disk {}", disk));
        let lun = attacher.attach_disk(&disk, &state.cancel).await?;

        // Registered before waiting so a device that never appears still gets detached.
        state.cleanups.register(CleanupHandle::Attach(AttachedDisk {
            attacher: attacher.clone(),
            disk: disk.clone(),
        }));

        state
            .ui()
            .message(&format!("Waiting for device of LUN {}", lun));
        let device = attacher.wait_for_device(lun, &state.cancel).await?;

        state.ui().message(&format!("Disk available at {}", device));
        state.set_device(device);
        Ok(())
    }

    async fn cleanup(&mut self, state: &mut BuildState) {
        release_from_step(state, CleanupKind::Attach).await;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
