use super::release_from_step;
use crate::lvm::{LvmDiscovery, LvmTools};
use crate::pipeline::{ActiveVolumeGroups, BuildState, BuildStep, CleanupHandle, CleanupKind};
use async_trait::async_trait;
use azure_chroot_shared::errors::ChrootResult;
use std::any::Any;

/// Find and activate LVM on the attached disk and point `device` at the root LV.
///
/// A disk without LVM passes through untouched.
pub struct SetupLvm {
    pub root_device_override: Option<String>,
}

#[async_trait]
impl BuildStep for SetupLvm {
    fn name(&self) -> &'static str {
        "SetupLvm"
    }

    async fn run(&mut self, state: &mut BuildState) -> ChrootResult<()> {
        let device = state.device()?.to_string();
        let runner = state.services.runner.clone();
        let ui = state.services.ui.clone();
        let cancel = state.cancel.clone();
        let discovery = LvmDiscovery::new(LvmTools::new(runner.as_ref()), ui.as_ref(), &cancel);

        let groups = match &self.root_device_override {
            Some(root) => {
                ui.say(&format!("Using configured LVM root device {}", root));
                discovery.override_volume_groups(&device, root).await?
            }
            None => {
                ui.say(&format!("Checking {} for LVM volume groups", device));
                let groups = discovery.find_volume_groups(&device).await?;
                if groups.is_empty() {
                    ui.message(&format!("No LVM found, mounting {} directly", device));
                    return Ok(());
                }
                groups
            }
        };

        discovery.activate(&groups).await?;
        state.cleanups.register(CleanupHandle::Lvm(ActiveVolumeGroups {
            runner: runner.clone(),
            groups: groups.clone(),
        }));

        let root = match &self.root_device_override {
            Some(root) => root.clone(),
            None => discovery.select_root(&groups).await?,
        };

        ui.message(&format!("Using logical volume {}", root));
        state.set_device(root);
        state.lvm_active = true;
        Ok(())
    }

    async fn cleanup(&mut self, state: &mut BuildState) {
        release_from_step(state, CleanupKind::Lvm).await;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
