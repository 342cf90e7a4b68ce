//! Test doubles for azure-chroot.
//!
//! Builds run against [`FakeCompute`] and [`FakeRunner`] instead of Azure and
//! the host tools. Both can share a [`Journal`] so tests can assert on the
//! interleaving of cloud calls and host commands.

mod compute;
mod runner;

pub use compute::FakeCompute;
pub use runner::FakeRunner;

use async_trait::async_trait;
use azure_chroot::azure::{CachedMetadata, InstanceMetadata, MetadataSource};
use azure_chroot::pipeline::{BuildState, Services};
use azure_chroot::steps::ProvisionHook;
use azure_chroot::util::Ui;
use azure_chroot_shared::errors::{ChrootError, ChrootResult};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Journal
// ============================================================================

/// Ordered log of side effects shared between fakes.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    /// Index of the first entry starting with `prefix`.
    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.0.lock().iter().position(|e| e.starts_with(prefix))
    }

    /// Number of entries starting with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.0.lock().iter().filter(|e| e.starts_with(prefix)).count()
    }
}

// ============================================================================
// Metadata, UI, provisioning
// ============================================================================

/// A VM in `westus` that is not part of a scale set.
pub fn test_vm() -> InstanceMetadata {
    InstanceMetadata {
        subscription_id: "sub".into(),
        resource_group: "rg".into(),
        name: "buildvm".into(),
        location: "westus".into(),
        vm_scale_set: None,
    }
}

pub struct StaticMetadata(pub InstanceMetadata);

#[async_trait]
impl MetadataSource for StaticMetadata {
    async fn instance(&self) -> ChrootResult<InstanceMetadata> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiLevel {
    Say,
    Message,
    Error,
}

/// [`Ui`] that keeps everything it was told.
#[derive(Default)]
pub struct RecordingUi {
    lines: Mutex<Vec<(UiLevel, String)>>,
}

impl RecordingUi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self, level: UiLevel) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.lines(UiLevel::Error)
    }

    /// Any line at any level containing `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.lock().iter().any(|(_, m)| m.contains(needle))
    }
}

impl Ui for RecordingUi {
    fn say(&self, message: &str) {
        self.lines.lock().push((UiLevel::Say, message.to_string()));
    }

    fn message(&self, message: &str) {
        self.lines.lock().push((UiLevel::Message, message.to_string()));
    }

    fn error(&self, message: &str) {
        self.lines.lock().push((UiLevel::Error, message.to_string()));
    }
}

/// Provisioner that records the chroot it was given and optionally fails.
#[derive(Default)]
pub struct RecordingHook {
    failure: Option<ChrootError>,
    journal: Option<Journal>,
    chroots: Mutex<Vec<PathBuf>>,
}

impl RecordingHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(error: ChrootError) -> Self {
        Self {
            failure: Some(error),
            ..Self::default()
        }
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn chroots(&self) -> Vec<PathBuf> {
        self.chroots.lock().clone()
    }
}

#[async_trait]
impl ProvisionHook for RecordingHook {
    async fn provision(
        &self,
        chroot: &Path,
        _ui: &dyn Ui,
        _cancel: &CancellationToken,
    ) -> ChrootResult<()> {
        self.chroots.lock().push(chroot.to_path_buf());
        if let Some(journal) = &self.journal {
            journal.push(format!("provision: {}", chroot.display()));
        }
        match &self.failure {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

// ============================================================================
// Wiring
// ============================================================================

pub fn services(compute: Arc<FakeCompute>, runner: Arc<FakeRunner>, ui: Arc<RecordingUi>) -> Services {
    Services {
        compute,
        runner,
        metadata: CachedMetadata::new(Arc::new(StaticMetadata(test_vm()))),
        ui,
    }
}

pub fn build_state(services: Services, hook: Arc<RecordingHook>) -> BuildState {
    BuildState::new(services, hook, CancellationToken::new())
}

/// Temporary stand-in for `/dev/disk/azure/scsi1`.
///
/// Each `lun<N>` link points at a regular file so the attacher can resolve it.
pub struct DeviceLinks {
    dir: TempDir,
}

impl DeviceLinks {
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir()?,
        })
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Publish `lun<lun>` pointing at a fake device named `device`.
    /// Returns the canonical path the attacher will report.
    pub fn publish(&self, lun: i32, device: &str) -> std::io::Result<PathBuf> {
        let target = self.dir.path().join(device);
        std::fs::write(&target, b"")?;
        std::os::unix::fs::symlink(&target, self.dir.path().join(format!("lun{}", lun)))?;
        std::fs::canonicalize(target)
    }
}
