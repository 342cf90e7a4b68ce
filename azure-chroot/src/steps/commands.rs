//! User host commands run around the mount.

use crate::pipeline::{BuildState, BuildStep};
use crate::util::run_wrapped;
use crate::util::template::{render, TemplateVars};
use async_trait::async_trait;
use azure_chroot_shared::errors::{ChrootError, ChrootResult};
use std::any::Any;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandPhase {
    /// `{{.Device}}` is available.
    PreMount,
    /// `{{.Device}}` and `{{.MountPath}}` are available.
    PostMount,
    /// `{{.Device}}` and `{{.MountPath}}` are available.
    PreUnmount,
}

impl CommandPhase {
    fn step_name(&self) -> &'static str {
        match self {
            CommandPhase::PreMount => "PreMountCommands",
            CommandPhase::PostMount => "PostMountCommands",
            CommandPhase::PreUnmount => "PreUnmountCommands",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            CommandPhase::PreMount => "pre-mount",
            CommandPhase::PostMount => "post-mount",
            CommandPhase::PreUnmount => "pre-unmount",
        }
    }
}

/// Run a list of templated shell commands on the host.
pub struct HostCommands {
    pub phase: CommandPhase,
    pub commands: Vec<String>,
    pub wrapper: String,
}

impl HostCommands {
    pub fn new(phase: CommandPhase, commands: Vec<String>, wrapper: &str) -> Self {
        Self {
            phase,
            commands,
            wrapper: wrapper.to_string(),
        }
    }

    fn vars(&self, state: &BuildState) -> ChrootResult<TemplateVars> {
        let vars = TemplateVars::new().with("Device", state.device()?);
        Ok(match self.phase {
            CommandPhase::PreMount => vars,
            CommandPhase::PostMount | CommandPhase::PreUnmount => vars.with(
                "MountPath",
                state.mount_path()?.to_string_lossy(),
            ),
        })
    }
}

#[async_trait]
impl BuildStep for HostCommands {
    fn name(&self) -> &'static str {
        self.phase.step_name()
    }

    async fn run(&mut self, state: &mut BuildState) -> ChrootResult<()> {
        if self.commands.is_empty() {
            return Ok(());
        }

        let vars = self.vars(state)?;
        state
            .ui()
            .say(&format!("Running {} commands", self.phase.label()));

        for template in &self.commands {
            let command = render(template, &vars)?;
            state.ui().message(&command);
            run_wrapped(state.runner(), &self.wrapper, &command)
                .await
                .map_err(|e| {
                    ChrootError::Command(format!(
                        "{} command '{}' failed: {}",
                        self.phase.label(),
                        command,
                        e
                    ))
                })?;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
