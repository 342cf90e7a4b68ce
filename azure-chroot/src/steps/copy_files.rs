use super::mount_extra::chroot_path;
use super::release_from_step;
use crate::pipeline::{BuildState, BuildStep, CleanupHandle, CleanupKind, CopiedFiles};
use crate::util::{run_wrapped, shell_quote};
use async_trait::async_trait;
use azure_chroot_shared::errors::{ChrootError, ChrootResult};
use std::any::Any;
use std::path::{Path, PathBuf};

/// Copy host files (by default `/etc/resolv.conf`) into the chroot.
pub struct CopyFiles {
    pub files: Vec<String>,
    pub wrapper: String,
}

impl CopyFiles {
    async fn copy_all(
        &self,
        state: &BuildState,
        root: &Path,
        copied: &mut Vec<PathBuf>,
    ) -> ChrootResult<()> {
        for file in &self.files {
            let target = chroot_path(root, file);
            state
                .ui()
                .message(&format!("Copying {} into the chroot", file));
            let command = format!(
                "cp --remove-destination {} {}",
                shell_quote(file),
                shell_quote(&target.to_string_lossy())
            );
            run_wrapped(state.runner(), &self.wrapper, &command)
                .await
                .map_err(|e| ChrootError::Command(format!("Failed to copy {}: {}", file, e)))?;
            copied.push(target);
        }
        Ok(())
    }
}

#[async_trait]
impl BuildStep for CopyFiles {
    fn name(&self) -> &'static str {
        "CopyFiles"
    }

    async fn run(&mut self, state: &mut BuildState) -> ChrootResult<()> {
        if self.files.is_empty() {
            return Ok(());
        }
        let root = state.mount_path()?.to_path_buf();
        state.ui().say("Copying files from host to chroot");

        let mut copied = Vec::with_capacity(self.files.len());
        let result = self.copy_all(state, &root, &mut copied).await;
        state.cleanups.register(CleanupHandle::CopyFiles(CopiedFiles {
            runner: state.services.runner.clone(),
            wrapper: self.wrapper.clone(),
            files: copied,
        }));
        result
    }

    async fn cleanup(&mut self, state: &mut BuildState) {
        release_from_step(state, CleanupKind::CopyFiles).await;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
