//! Hand the mounted chroot to the provisioners.

use crate::pipeline::{BuildState, BuildStep};
use crate::util::{run_wrapped, shell_quote, CommandRunner, Ui};
use async_trait::async_trait;
use azure_chroot_shared::constants::tools;
use azure_chroot_shared::errors::{ChrootError, ChrootResult};
use std::any::Any;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Whatever customises the image while it is mounted.
#[async_trait]
pub trait ProvisionHook: Send + Sync {
    async fn provision(
        &self,
        chroot: &Path,
        ui: &dyn Ui,
        cancel: &CancellationToken,
    ) -> ChrootResult<()>;
}

/// Runs shell commands inside the chroot with `chroot <path> /bin/sh -c`.
pub struct CommandProvisioner {
    runner: Arc<dyn CommandRunner>,
    wrapper: String,
    commands: Vec<String>,
}

impl CommandProvisioner {
    pub fn new(runner: Arc<dyn CommandRunner>, wrapper: &str, commands: Vec<String>) -> Self {
        Self {
            runner,
            wrapper: wrapper.to_string(),
            commands,
        }
    }

    pub fn chroot_command(chroot: &Path, command: &str) -> String {
        format!(
            "{} {} {} -c {}",
            tools::CHROOT,
            shell_quote(&chroot.to_string_lossy()),
            tools::SHELL,
            shell_quote(command)
        )
    }
}

#[async_trait]
impl ProvisionHook for CommandProvisioner {
    async fn provision(
        &self,
        chroot: &Path,
        ui: &dyn Ui,
        cancel: &CancellationToken,
    ) -> ChrootResult<()> {
        for command in &self.commands {
            if cancel.is_cancelled() {
                return Err(ChrootError::Cancelled);
            }
            ui.message(command);
            let output = run_wrapped(
                self.runner.as_ref(),
                &self.wrapper,
                &Self::chroot_command(chroot, command),
            )
            .await?;
            for line in output.stdout.lines() {
                ui.message(&format!("    {}", line));
            }
        }
        Ok(())
    }
}

pub struct ChrootProvision;

#[async_trait]
impl BuildStep for ChrootProvision {
    fn name(&self) -> &'static str {
        "ChrootProvision"
    }

    async fn run(&mut self, state: &mut BuildState) -> ChrootResult<()> {
        let chroot = state.mount_path()?.to_path_buf();
        state
            .ui()
            .say(&format!("Provisioning chroot at {}", chroot.display()));
        let hook = state.hook.clone();
        hook.provision(&chroot, state.ui(), &state.cancel).await
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chroot_command_quotes_script() {
        assert_eq!(
            CommandProvisioner::chroot_command(Path::new("/mnt/sdc"), "apt-get update && apt-get -y upgrade"),
            "chroot /mnt/sdc /bin/sh -c 'apt-get update && apt-get -y upgrade'"
        );
    }
}
