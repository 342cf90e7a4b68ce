//! Step orchestration.
//!
//! A build is a fixed list of [`BuildStep`]s run strictly in order against one
//! [`BuildState`]. The first failure halts the list; every step that ran then
//! gets its `cleanup` call in reverse order. Resources whose teardown order
//! does not follow step order live in the [`CleanupRegistry`] instead.

pub mod cleanup;
pub mod state;

use async_trait::async_trait;
use azure_chroot_shared::errors::{ChrootError, ChrootResult};
use std::any::Any;

pub use cleanup::{
    ActiveVolumeGroups, AttachedDisk, CleanupHandle, CleanupKind, CleanupRegistry, CopiedFiles,
    DeviceMount, ExtraMounts,
};
pub use state::{BuildState, GeneratedData, Services};

/// One state transition of a build.
#[async_trait]
pub trait BuildStep: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&mut self, state: &mut BuildState) -> ChrootResult<()>;

    /// Undo what `run` acquired. Also called after `run` failed.
    async fn cleanup(&mut self, _state: &mut BuildState) {}

    /// For inspecting an assembled step list.
    fn as_any(&self) -> &dyn Any;
}

/// Drives a step list to completion or first failure.
pub struct StepRunner {
    steps: Vec<Box<dyn BuildStep>>,
}

impl StepRunner {
    pub fn new(steps: Vec<Box<dyn BuildStep>>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[Box<dyn BuildStep>] {
        &self.steps
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    pub async fn run(&mut self, state: &mut BuildState) -> ChrootResult<()> {
        let mut ran = 0;
        let mut outcome = Ok(());

        for step in self.steps.iter_mut() {
            if state.cancel.is_cancelled() {
                tracing::warn!(step = step.name(), "Build cancelled before step");
                outcome = Err(ChrootError::Cancelled);
                break;
            }

            ran += 1;
            tracing::debug!(step = step.name(), "Running step");
            if let Err(e) = step.run(state).await {
                tracing::error!(step = step.name(), error = %e, "Step failed");
                outcome = Err(e);
                break;
            }
        }

        if let Err(e) = &outcome {
            state.ui().error(&e.to_string());
            state.error = Some(e.clone());
        }

        for step in self.steps[..ran].iter_mut().rev() {
            tracing::debug!(step = step.name(), "Cleaning up step");
            step.cleanup(state).await;
        }

        outcome
    }
}

/// Downcast helper for tests and tooling that inspect step lists.
pub fn find_step<'a, T: 'static>(steps: &'a [Box<dyn BuildStep>]) -> Option<&'a T> {
    steps.iter().find_map(|s| s.as_any().downcast_ref::<T>())
}

/// Position of the first step of type `T`.
pub fn step_position<T: 'static>(steps: &[Box<dyn BuildStep>]) -> Option<usize> {
    steps.iter().position(|s| s.as_any().is::<T>())
}
