//! LVM discovery and activation on a freshly attached disk.
//!
//! ## Auto-detect
//!
//! ```text
//! refresh ──→ scan PVs (≤3 attempts, 2s apart) ──→ none? ──→ not LVM
//!                                 │
//!                                 └──→ activate VGs ──→ list LVs ──→ filter ──→ select ──→ verify
//! ```
//!
//! ## Override
//!
//! The user names the root device; only the owning volume groups are
//! inferred so that activation and deactivation stay scoped.

use super::parse::{is_mountable_lv, LvInfo};
use super::select::select_root_lv;
use super::tools::LvmTools;
use crate::util::{sleep_or_cancel, Ui};
use azure_chroot_shared::errors::{ChrootError, ChrootResult};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Physical volume scans before a disk is declared non-LVM.
pub const DISCOVERY_ATTEMPTS: u32 = 3;

/// Pause between physical volume scans.
pub const DISCOVERY_BACKOFF: Duration = Duration::from_secs(2);

/// Volume groups activated for a build and the root device chosen inside them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LvmActivation {
    pub volume_groups: Vec<String>,
    pub root_device: String,
}

/// Drives the discovery algorithm over an [`LvmTools`] boundary.
pub struct LvmDiscovery<'a> {
    tools: LvmTools<'a>,
    ui: &'a dyn Ui,
    cancel: &'a CancellationToken,
    attempts: u32,
    backoff: Duration,
}

impl<'a> LvmDiscovery<'a> {
    pub fn new(tools: LvmTools<'a>, ui: &'a dyn Ui, cancel: &'a CancellationToken) -> Self {
        Self {
            tools,
            ui,
            cancel,
            attempts: DISCOVERY_ATTEMPTS,
            backoff: DISCOVERY_BACKOFF,
        }
    }

    pub fn tools(&self) -> LvmTools<'a> {
        self.tools
    }

    /// Scan for volume groups on `device`, retrying while udev catches up.
    ///
    /// An empty result means the disk carries no LVM.
    pub async fn find_volume_groups(&self, device: &str) -> ChrootResult<Vec<String>> {
        self.tools.refresh(device).await;

        for attempt in 1..=self.attempts {
            if attempt > 1 {
                sleep_or_cancel(self.backoff, self.cancel).await?;
                self.tools.refresh(device).await;
            }

            match self.tools.volume_groups_on(device).await {
                Ok(groups) if !groups.is_empty() => {
                    tracing::info!(device, attempt, groups = ?groups, "Found LVM volume groups");
                    return Ok(groups);
                }
                Ok(_) => tracing::debug!(device, attempt, "No LVM volume groups found yet"),
                Err(e) => tracing::warn!(device, attempt, "Physical volume scan failed: {}", e),
            }
        }

        Ok(Vec::new())
    }

    /// Volume groups owning a user-supplied root device.
    ///
    /// Falls back to the group named by the device path (device mapper first,
    /// then the naming convention) when no physical volume on `device`
    /// reports a group.
    pub async fn override_volume_groups(
        &self,
        device: &str,
        root_device: &str,
    ) -> ChrootResult<Vec<String>> {
        let groups = self.find_volume_groups(device).await?;
        if !groups.is_empty() {
            return Ok(groups);
        }

        if let Some((vg, _)) = self.tools.resolve_vg_lv(root_device).await {
            tracing::info!(root_device, vg = %vg, "Derived volume group from device path");
            return Ok(vec![vg]);
        }

        Err(ChrootError::Lvm(format!(
            "cannot determine the volume group of lvm_root_device '{}'; \
             refusing to activate LVM without a known scope",
            root_device
        )))
    }

    /// Activate `groups`. Failure is fatal.
    pub async fn activate(&self, groups: &[String]) -> ChrootResult<()> {
        self.ui
            .message(&format!("Activating LVM volume group(s): {}", groups.join(", ")));
        self.tools.activate(groups).await
    }

    /// Choose and verify the root logical volume inside activated `groups`.
    pub async fn select_root(&self, groups: &[String]) -> ChrootResult<String> {
        let candidates: Vec<LvInfo> = self
            .tools
            .logical_volumes(groups)
            .await?
            .into_iter()
            .filter(|lv| {
                let mountable = is_mountable_lv(&lv.attr);
                if !mountable {
                    tracing::debug!(lv = %lv.name, attr = %lv.attr, "Skipping non-mountable logical volume");
                }
                mountable
            })
            .collect();

        if candidates.is_empty() {
            return Err(ChrootError::Lvm(format!(
                "no mountable logical volumes in volume group(s) {}",
                groups.join(", ")
            )));
        }

        let mut probed = Vec::with_capacity(candidates.len());
        for lv in candidates {
            let fs_type = self.tools.filesystem_type(&lv.path).await;
            probed.push((lv, fs_type));
        }

        let non_swap: Vec<&(LvInfo, Option<String>)> = probed
            .iter()
            .filter(|(_, fs)| fs.as_deref() != Some("swap"))
            .collect();
        let pool: Vec<&(LvInfo, Option<String>)> = if non_swap.is_empty() {
            tracing::warn!("Every logical volume looks like swap, ignoring the swap filter");
            probed.iter().collect()
        } else {
            non_swap
        };

        let lvs: Vec<LvInfo> = pool.iter().map(|(lv, _)| lv.clone()).collect();
        let selection = select_root_lv(&lvs)
            .ok_or_else(|| ChrootError::Internal("candidate list emptied during selection".into()))?;

        if selection.is_ambiguous() {
            let listing = pool
                .iter()
                .map(|(lv, fs)| format!("{} ({})", lv.path, fs.as_deref().unwrap_or("unknown")))
                .collect::<Vec<_>>()
                .join(", ");
            self.ui.message(&format!(
                "WARNING: multiple logical volumes found and none is named like a root volume: {}. \
                 Using {}. Set lvm_root_device if this is wrong.",
                listing, selection.lv.path
            ));
        }

        tracing::info!(
            lv = %selection.lv.name,
            vg = %selection.lv.vg_name,
            path = %selection.lv.path,
            reason = ?selection.reason,
            "Selected root logical volume"
        );

        let root = selection.lv.clone();
        self.verify(&root, groups).await;
        Ok(root.path)
    }

    /// Make sure the chosen device is readable; refresh it once if not.
    async fn verify(&self, root: &LvInfo, groups: &[String]) {
        if self.tools.filesystem_type(&root.path).await.is_some() {
            return;
        }

        tracing::warn!(path = %root.path, "Root volume unreadable, refreshing it");
        let (vg, lv) = match self.tools.resolve_vg_lv(&root.path).await {
            Some(pair) => pair,
            None => (root.vg_name.clone(), root.name.clone()),
        };
        if let Err(e) = self.tools.refresh_lv(&vg, &lv).await {
            tracing::warn!(vg = %vg, lv = %lv, "Logical volume refresh failed: {}", e);
        }
        self.tools.settle().await;

        if self.tools.filesystem_type(&root.path).await.is_none() {
            self.ui.message(&format!(
                "WARNING: {} still has no readable filesystem after refresh; continuing",
                root.path
            ));
            self.tools.dump_diagnostics(groups).await;
        }
    }
}
