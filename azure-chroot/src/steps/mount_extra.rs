use super::release_from_step;
use crate::config::ChrootMount;
use crate::pipeline::{BuildState, BuildStep, CleanupHandle, CleanupKind, ExtraMounts};
use crate::util::{run_wrapped, shell_quote};
use async_trait::async_trait;
use azure_chroot_shared::errors::{ChrootError, ChrootResult};
use std::any::Any;
use std::path::{Path, PathBuf};

/// Join an absolute in-chroot path onto the chroot root.
pub(crate) fn chroot_path(root: &Path, path: &str) -> PathBuf {
    root.join(path.trim_start_matches('/'))
}

/// Mount `/proc`, `/sys`, `/dev` and friends inside the chroot.
pub struct MountExtra {
    pub mounts: Vec<ChrootMount>,
    pub wrapper: String,
}

impl MountExtra {
    fn mount_command(mount: &ChrootMount, target: &Path) -> String {
        let flags = if mount.fstype == "bind" {
            "--bind".to_string()
        } else {
            format!("-t {}", shell_quote(&mount.fstype))
        };
        format!(
            "mount {} {} {}",
            flags,
            shell_quote(&mount.device),
            shell_quote(&target.to_string_lossy())
        )
    }

    async fn mount_all(
        &self,
        state: &BuildState,
        root: &Path,
        mounted: &mut Vec<PathBuf>,
    ) -> ChrootResult<()> {
        for mount in &self.mounts {
            let target = chroot_path(root, &mount.path);
            state
                .ui()
                .message(&format!("Mounting {} at {}", mount.device, target.display()));

            let mkdir = format!("mkdir -m 0755 -p {}", shell_quote(&target.to_string_lossy()));
            run_wrapped(state.runner(), &self.wrapper, &mkdir).await?;
            run_wrapped(
                state.runner(),
                &self.wrapper,
                &Self::mount_command(mount, &target),
            )
            .await
            .map_err(|e| {
                ChrootError::Mount(format!("Failed to mount {}: {}", target.display(), e))
            })?;
            mounted.push(target);
        }
        Ok(())
    }
}

#[async_trait]
impl BuildStep for MountExtra {
    fn name(&self) -> &'static str {
        "MountExtra"
    }

    async fn run(&mut self, state: &mut BuildState) -> ChrootResult<()> {
        if self.mounts.is_empty() {
            return Ok(());
        }
        let root = state.mount_path()?.to_path_buf();
        state.ui().say("Mounting additional paths within the chroot");

        let mut mounted = Vec::with_capacity(self.mounts.len());
        let result = self.mount_all(state, &root, &mut mounted).await;

        // Whatever got mounted must be unmounted, even after a failure.
        state.cleanups.register(CleanupHandle::MountExtra(ExtraMounts {
            runner: state.services.runner.clone(),
            wrapper: self.wrapper.clone(),
            paths: mounted,
        }));
        result
    }

    async fn cleanup(&mut self, state: &mut BuildState) {
        release_from_step(state, CleanupKind::MountExtra).await;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_mounts_use_bind_flag() {
        let mount = ChrootMount {
            fstype: "bind".into(),
            device: "/dev".into(),
            path: "/dev".into(),
        };
        assert_eq!(
            MountExtra::mount_command(&mount, Path::new("/mnt/sdc/dev")),
            "mount --bind /dev /mnt/sdc/dev"
        );
    }

    #[test]
    fn typed_mounts_use_type_flag() {
        let mount = ChrootMount {
            fstype: "proc".into(),
            device: "proc".into(),
            path: "/proc".into(),
        };
        assert_eq!(
            MountExtra::mount_command(&mount, &chroot_path(Path::new("/mnt/sdc"), "/proc")),
            "mount -t proc proc /mnt/sdc/proc"
        );
    }
}
