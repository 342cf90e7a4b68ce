//! Host process execution.
//!
//! Every system tool the builder uses (`mount`, `lvs`, `blkid`, ...) goes
//! through [`CommandRunner`] so that tests can substitute canned output.

use async_trait::async_trait;
use azure_chroot_shared::constants::tools;
use azure_chroot_shared::errors::{ChrootError, ChrootResult};
use std::process::Stdio;

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Successful output with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given exit code and stderr.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Runs a program with arguments and captures its output.
///
/// A process that cannot be spawned is an `Err`; a process that runs and
/// exits non-zero is an `Ok` with a failing [`CommandOutput`].
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> ChrootResult<CommandOutput>;
}

/// Render a command line for logs and error messages.
pub fn command_line(program: &str, args: &[String]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

/// Run a command and turn a non-zero exit into `ChrootError::Command`.
pub async fn run_checked(
    runner: &dyn CommandRunner,
    program: &str,
    args: &[String],
) -> ChrootResult<CommandOutput> {
    let output = runner.run(program, args).await?;
    if !output.success() {
        return Err(ChrootError::Command(format!(
            "'{}' exited with {:?}: {}",
            command_line(program, args),
            output.code,
            output.stderr.trim()
        )));
    }
    Ok(output)
}

/// Run a shell snippet through `/bin/sh -c`.
pub async fn run_shell(runner: &dyn CommandRunner, script: &str) -> ChrootResult<CommandOutput> {
    run_checked(runner, tools::SHELL, &["-c".to_string(), script.to_string()]).await
}

/// Convenience for building argument vectors from string literals.
pub fn args<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}

/// [`CommandRunner`] backed by real host processes.
#[derive(Debug, Default, Clone)]
pub struct HostCommandRunner;

#[async_trait]
impl CommandRunner for HostCommandRunner {
    async fn run(&self, program: &str, args: &[String]) -> ChrootResult<CommandOutput> {
        tracing::debug!(command = %command_line(program, args), "Executing host command");

        let output = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| ChrootError::Command(format!("Failed to run {}: {}", program, e)))?;

        let result = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !result.success() {
            tracing::debug!(
                command = %command_line(program, args),
                code = ?result.code,
                stderr = %result.stderr.trim(),
                "Host command failed"
            );
        }

        Ok(result)
    }
}
