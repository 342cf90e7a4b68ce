//! Resources whose release order is fixed by the domain.
//!
//! Unmounting must precede volume group deactivation, which must precede
//! detaching the disk. Steps register a [`CleanupHandle`] as soon as they
//! acquire such a resource; [`CleanupRegistry::release_ordered`] tears them
//! down in [`CleanupKind::RELEASE_ORDER`] no matter which step ran first.

use crate::azure::DiskAttacher;
use crate::lvm::LvmTools;
use crate::resource::ResourceId;
use crate::util::process::args;
use crate::util::{run_wrapped, shell_quote, template, CommandRunner};
use azure_chroot_shared::constants::tools;
use azure_chroot_shared::errors::{ChrootError, ChrootResult};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CleanupKind {
    CopyFiles,
    MountExtra,
    MountDevice,
    Lvm,
    Attach,
}

impl CleanupKind {
    pub const RELEASE_ORDER: [CleanupKind; 5] = [
        CleanupKind::CopyFiles,
        CleanupKind::MountExtra,
        CleanupKind::MountDevice,
        CleanupKind::Lvm,
        CleanupKind::Attach,
    ];

    /// Index in [`CleanupKind::RELEASE_ORDER`].
    pub fn position(&self) -> usize {
        match self {
            CleanupKind::CopyFiles => 0,
            CleanupKind::MountExtra => 1,
            CleanupKind::MountDevice => 2,
            CleanupKind::Lvm => 3,
            CleanupKind::Attach => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CleanupKind::CopyFiles => "copy_files_cleanup",
            CleanupKind::MountExtra => "mount_extra_cleanup",
            CleanupKind::MountDevice => "mount_device_cleanup",
            CleanupKind::Lvm => "lvm_cleanup",
            CleanupKind::Attach => "attach_cleanup",
        }
    }
}

impl fmt::Display for CleanupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Handles
// ============================================================================

/// Files copied into the chroot.
pub struct CopiedFiles {
    pub runner: Arc<dyn CommandRunner>,
    pub wrapper: String,
    pub files: Vec<PathBuf>,
}

impl CopiedFiles {
    async fn release(&mut self) -> ChrootResult<()> {
        while let Some(file) = self.files.last() {
            let command = format!("rm -f {}", shell_quote(&file.to_string_lossy()));
            run_wrapped(self.runner.as_ref(), &self.wrapper, &command).await?;
            self.files.pop();
        }
        Ok(())
    }
}

/// Mounts inside the chroot, in mount order.
pub struct ExtraMounts {
    pub runner: Arc<dyn CommandRunner>,
    pub wrapper: String,
    pub paths: Vec<PathBuf>,
}

impl ExtraMounts {
    /// `grep` exits 1 only when the path is absent from `/proc/mounts`.
    /// Any other failure leaves the question open, so the unmount is attempted.
    async fn still_mounted(&self, path: &str) -> ChrootResult<bool> {
        let command = format!("grep -qs {} /proc/mounts", shell_quote(&format!(" {} ", path)));
        let wrapped = template::wrap_command(&self.wrapper, &command)?;
        let output = self
            .runner
            .run(tools::SHELL, &args(["-c", wrapped.as_str()]))
            .await?;
        match output.code {
            Some(1) => Ok(false),
            Some(0) => Ok(true),
            code => {
                tracing::warn!(path, ?code, "Cannot tell whether still mounted, unmounting anyway");
                Ok(true)
            }
        }
    }

    async fn release(&mut self) -> ChrootResult<()> {
        // Innermost first: /dev/pts before /dev.
        while let Some(path) = self.paths.last() {
            let path_str = path.to_string_lossy().into_owned();
            // binfmt_misc often vanishes with /proc.
            if self.still_mounted(&path_str).await? {
                let command = format!("umount {}", shell_quote(&path_str));
                run_wrapped(self.runner.as_ref(), &self.wrapper, &command).await?;
            } else {
                tracing::debug!(path = %path_str, "Extra mount already gone");
            }
            self.paths.pop();
        }
        Ok(())
    }
}

/// The root device mounted at the chroot path.
pub struct DeviceMount {
    pub runner: Arc<dyn CommandRunner>,
    pub wrapper: String,
    pub mount_path: PathBuf,
    /// Mounted by `manual_mount_command`; the user unmounts it.
    pub manual: bool,
}

impl DeviceMount {
    async fn release(&mut self) -> ChrootResult<()> {
        if self.manual {
            tracing::debug!(path = %self.mount_path.display(), "Manual mount, leaving it to the user");
            return Ok(());
        }
        let command = format!("umount {}", shell_quote(&self.mount_path.to_string_lossy()));
        run_wrapped(self.runner.as_ref(), &self.wrapper, &command)
            .await
            .map_err(|e| {
                ChrootError::Mount(format!(
                    "Failed to unmount {}: {}",
                    self.mount_path.display(),
                    e
                ))
            })?;
        Ok(())
    }
}

/// Volume groups activated for the build.
pub struct ActiveVolumeGroups {
    pub runner: Arc<dyn CommandRunner>,
    pub groups: Vec<String>,
}

impl ActiveVolumeGroups {
    async fn release(&mut self) -> ChrootResult<()> {
        LvmTools::new(self.runner.as_ref()).deactivate(&self.groups).await
    }
}

/// The OS disk attached to the build VM.
pub struct AttachedDisk {
    pub attacher: DiskAttacher,
    pub disk: ResourceId,
}

impl AttachedDisk {
    async fn release(&mut self, cancel: &CancellationToken) -> ChrootResult<()> {
        self.attacher.detach_disk(&self.disk, cancel).await?;
        self.attacher.wait_for_detach(&self.disk, cancel).await
    }
}

/// One acquired resource with its release operation.
pub enum CleanupHandle {
    CopyFiles(CopiedFiles),
    MountExtra(ExtraMounts),
    MountDevice(DeviceMount),
    Lvm(ActiveVolumeGroups),
    Attach(AttachedDisk),
}

impl CleanupHandle {
    pub fn kind(&self) -> CleanupKind {
        match self {
            CleanupHandle::CopyFiles(_) => CleanupKind::CopyFiles,
            CleanupHandle::MountExtra(_) => CleanupKind::MountExtra,
            CleanupHandle::MountDevice(_) => CleanupKind::MountDevice,
            CleanupHandle::Lvm(_) => CleanupKind::Lvm,
            CleanupHandle::Attach(_) => CleanupKind::Attach,
        }
    }

    async fn release(&mut self, cancel: &CancellationToken) -> ChrootResult<()> {
        match self {
            CleanupHandle::CopyFiles(h) => h.release().await,
            CleanupHandle::MountExtra(h) => h.release().await,
            CleanupHandle::MountDevice(h) => h.release().await,
            CleanupHandle::Lvm(h) => h.release().await,
            CleanupHandle::Attach(h) => h.release(cancel).await,
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

/// One slot per [`CleanupKind`].
///
/// Once a release fails, every later kind stays held until the failed one
/// is released: the volume groups of a mounted filesystem are never
/// deactivated and a disk with an active volume group is never detached.
#[derive(Default)]
pub struct CleanupRegistry {
    copy_files: Option<CleanupHandle>,
    mount_extra: Option<CleanupHandle>,
    mount_device: Option<CleanupHandle>,
    lvm: Option<CleanupHandle>,
    attach: Option<CleanupHandle>,
    failed: Option<CleanupKind>,
}

impl CleanupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, kind: CleanupKind) -> &mut Option<CleanupHandle> {
        match kind {
            CleanupKind::CopyFiles => &mut self.copy_files,
            CleanupKind::MountExtra => &mut self.mount_extra,
            CleanupKind::MountDevice => &mut self.mount_device,
            CleanupKind::Lvm => &mut self.lvm,
            CleanupKind::Attach => &mut self.attach,
        }
    }

    pub fn register(&mut self, handle: CleanupHandle) {
        let kind = handle.kind();
        if self.slot(kind).replace(handle).is_some() {
            tracing::warn!(cleanup = %kind, "Replacing a cleanup handle that was never released");
        }
        tracing::debug!(cleanup = %kind, "Registered cleanup handle");
    }

    pub fn is_registered(&self, kind: CleanupKind) -> bool {
        match kind {
            CleanupKind::CopyFiles => self.copy_files.is_some(),
            CleanupKind::MountExtra => self.mount_extra.is_some(),
            CleanupKind::MountDevice => self.mount_device.is_some(),
            CleanupKind::Lvm => self.lvm.is_some(),
            CleanupKind::Attach => self.attach.is_some(),
        }
    }

    /// Kinds still holding a resource, in release order.
    pub fn pending(&self) -> Vec<CleanupKind> {
        CleanupKind::RELEASE_ORDER
            .into_iter()
            .filter(|k| self.is_registered(*k))
            .collect()
    }

    /// The earliest kind whose release failed and is still held.
    pub fn failed(&self) -> Option<CleanupKind> {
        self.failed
    }

    /// Release one resource. Releasing an empty slot is a no-op.
    ///
    /// A failed release keeps the handle so a later cleanup pass can retry,
    /// and blocks every kind after it in [`CleanupKind::RELEASE_ORDER`].
    pub async fn release(
        &mut self,
        kind: CleanupKind,
        cancel: &CancellationToken,
    ) -> ChrootResult<()> {
        if !self.is_registered(kind) {
            return Ok(());
        }
        if let Some(failed) = self.failed.filter(|f| f.position() < kind.position()) {
            tracing::warn!(cleanup = %kind, blocked_by = %failed, "Keeping resource held");
            return Err(ChrootError::Cleanup(format!(
                "{}: skipped because {} was not released",
                kind, failed
            )));
        }
        let Some(mut handle) = self.slot(kind).take() else {
            return Ok(());
        };

        tracing::debug!(cleanup = %kind, "Releasing resource");
        match handle.release(cancel).await {
            Ok(()) => {
                if self.failed == Some(kind) {
                    self.failed = None;
                }
                Ok(())
            }
            Err(e) => {
                *self.slot(kind) = Some(handle);
                if self.failed.is_none_or(|f| kind.position() < f.position()) {
                    self.failed = Some(kind);
                }
                if e.is_cancelled() {
                    return Err(e);
                }
                Err(ChrootError::Cleanup(format!("{}: {}", kind, e)))
            }
        }
    }

    /// Release everything in [`CleanupKind::RELEASE_ORDER`], stopping at the first failure.
    pub async fn release_ordered(&mut self, cancel: &CancellationToken) -> ChrootResult<()> {
        for kind in CleanupKind::RELEASE_ORDER {
            self.release(kind, cancel).await?;
        }
        Ok(())
    }
}
