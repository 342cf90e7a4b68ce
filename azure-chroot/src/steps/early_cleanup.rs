use crate::pipeline::{BuildState, BuildStep};
use async_trait::async_trait;
use azure_chroot_shared::errors::ChrootResult;
use std::any::Any;

/// Unmount, deactivate LVM and detach before capture.
///
/// Stops at the first failure; the remaining handles stay registered and the
/// owning steps retry them during cleanup.
pub struct EarlyCleanup;

#[async_trait]
impl BuildStep for EarlyCleanup {
    fn name(&self) -> &'static str {
        "EarlyCleanup"
    }

    async fn run(&mut self, state: &mut BuildState) -> ChrootResult<()> {
        let pending = state.cleanups.pending();
        state.ui().say("Unmounting and detaching the disk");
        tracing::debug!(pending = ?pending, "Releasing resources in order");

        let cancel = state.cancel.clone();
        state.cleanups.release_ordered(&cancel).await
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
