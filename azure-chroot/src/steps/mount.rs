//! Mount the root device at the chroot path.

use super::release_from_step;
use crate::pipeline::{BuildState, BuildStep, CleanupHandle, CleanupKind, DeviceMount};
use crate::util::template::{render, TemplateVars};
use crate::util::{run_wrapped, shell_quote};
use async_trait::async_trait;
use azure_chroot_shared::errors::{ChrootError, ChrootResult};
use std::any::Any;
use std::path::{Path, PathBuf};

/// Device node of `partition` on `device`.
///
/// Partition `0` (or empty) means the whole device. Devices whose name ends
/// in a digit (`nvme0n1`) take a `p` separator.
pub fn partition_device(device: &str, partition: &str) -> String {
    if partition.is_empty() || partition == "0" {
        return device.to_string();
    }
    if device.ends_with(|c: char| c.is_ascii_digit()) {
        format!("{}p{}", device, partition)
    } else {
        format!("{}{}", device, partition)
    }
}

pub struct MountDevice {
    /// Template, `{{.Device}}` is the base name of the device.
    pub mount_path: String,
    pub mount_partition: String,
    pub mount_options: Vec<String>,
    pub manual_mount_command: String,
    pub wrapper: String,
}

impl MountDevice {
    fn resolve_mount_path(&self, device: &str) -> ChrootResult<PathBuf> {
        let base = Path::new(device)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let rendered = render(&self.mount_path, &TemplateVars::new().with("Device", base))?;
        if rendered.trim().is_empty() {
            return Err(ChrootError::Config("mount_path rendered to an empty path".into()));
        }
        std::path::absolute(&rendered).map_err(|e| {
            ChrootError::Mount(format!("Failed to resolve mount path {}: {}", rendered, e))
        })
    }

    fn mount_command(&self, device_mount: &str, mount_path: &Path) -> String {
        let mut command = String::from("mount");
        for option in &self.mount_options {
            command.push_str(" -o ");
            command.push_str(&shell_quote(option));
        }
        command.push(' ');
        command.push_str(&shell_quote(device_mount));
        command.push(' ');
        command.push_str(&shell_quote(&mount_path.to_string_lossy()));
        command
    }
}

#[async_trait]
impl BuildStep for MountDevice {
    fn name(&self) -> &'static str {
        "MountDevice"
    }

    async fn run(&mut self, state: &mut BuildState) -> ChrootResult<()> {
        let device = state.device()?.to_string();
        let mount_path = self.resolve_mount_path(&device)?;

        // A logical volume is already a complete block device.
        let device_mount = if state.lvm_active {
            device.clone()
        } else {
            partition_device(&device, &self.mount_partition)
        };

        let manual = !self.manual_mount_command.is_empty();
        if manual {
            let vars = TemplateVars::new()
                .with("Device", device_mount.as_str())
                .with("MountPath", mount_path.to_string_lossy());
            let command = render(&self.manual_mount_command, &vars)?;
            state
                .ui()
                .say(&format!("Running manual mount command: {}", command));
            run_wrapped(state.runner(), &self.wrapper, &command)
                .await
                .map_err(|e| ChrootError::Mount(format!("Manual mount command failed: {}", e)))?;
        } else {
            state.ui().say(&format!(
                "Mounting {} at {}",
                device_mount,
                mount_path.display()
            ));
            let mkdir = format!(
                "mkdir -m 0755 -p {}",
                shell_quote(&mount_path.to_string_lossy())
            );
            run_wrapped(state.runner(), &self.wrapper, &mkdir)
                .await
                .map_err(|e| {
                    ChrootError::Mount(format!(
                        "Failed to create mount directory {}: {}",
                        mount_path.display(),
                        e
                    ))
                })?;

            let command = self.mount_command(&device_mount, &mount_path);
            run_wrapped(state.runner(), &self.wrapper, &command)
                .await
                .map_err(|e| {
                    ChrootError::Mount(format!(
                        "Failed to mount {} at {}: {}",
                        device_mount,
                        mount_path.display(),
                        e
                    ))
                })?;
        }

        tracing::info!(device = %device_mount, path = %mount_path.display(), manual, "Root device mounted");
        state.cleanups.register(CleanupHandle::MountDevice(DeviceMount {
            runner: state.services.runner.clone(),
            wrapper: self.wrapper.clone(),
            mount_path: mount_path.clone(),
            manual,
        }));
        state.set_device_mount(device_mount);
        state.set_mount_path(mount_path);
        Ok(())
    }

    async fn cleanup(&mut self, state: &mut BuildState) {
        release_from_step(state, CleanupKind::MountDevice).await;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_suffixes() {
        assert_eq!(partition_device("/dev/sdc", "1"), "/dev/sdc1");
        assert_eq!(partition_device("/dev/nvme0n1", "2"), "/dev/nvme0n1p2");
        assert_eq!(partition_device("/dev/sdc", "0"), "/dev/sdc");
        assert_eq!(partition_device("/dev/sdc", ""), "/dev/sdc");
    }

    #[test]
    fn mount_path_uses_device_base_name() {
        let step = MountDevice {
            mount_path: "/mnt/packer-azure-chroot-disks/{{.Device}}".into(),
            mount_partition: "1".into(),
            mount_options: vec![],
            manual_mount_command: String::new(),
            wrapper: "{{.Command}}".into(),
        };
        assert_eq!(
            step.resolve_mount_path("/dev/sdc").unwrap(),
            PathBuf::from("/mnt/packer-azure-chroot-disks/sdc")
        );
    }

    #[test]
    fn relative_mount_path_is_absolutized() {
        let step = MountDevice {
            mount_path: "chroot/{{.Device}}".into(),
            mount_partition: "1".into(),
            mount_options: vec![],
            manual_mount_command: String::new(),
            wrapper: "{{.Command}}".into(),
        };
        let path = step.resolve_mount_path("/dev/sdd").unwrap();
        assert!(path.is_absolute());
        assert!(path.ends_with("chroot/sdd"));
    }

    #[test]
    fn mount_command_carries_options() {
        let step = MountDevice {
            mount_path: String::new(),
            mount_partition: "1".into(),
            mount_options: vec!["noatime".into(), "ro".into()],
            manual_mount_command: String::new(),
            wrapper: "{{.Command}}".into(),
        };
        assert_eq!(
            step.mount_command("/dev/sdc1", Path::new("/mnt/x")),
            "mount -o noatime -o ro /dev/sdc1 /mnt/x"
        );
    }
}
