//! Process execution, templating and status output helpers.

pub mod process;
pub mod template;
pub mod ui;

use azure_chroot_shared::errors::{ChrootError, ChrootResult};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub use process::{CommandOutput, CommandRunner, HostCommandRunner};
pub use ui::{TracingUi, Ui};

/// Render `command` through the user's `command_wrapper` and run it with `sh -c`.
pub async fn run_wrapped(
    runner: &dyn CommandRunner,
    wrapper: &str,
    command: &str,
) -> ChrootResult<CommandOutput> {
    let wrapped = template::wrap_command(wrapper, command)?;
    tracing::debug!(command = %wrapped, "Running wrapped command");
    process::run_shell(runner, &wrapped).await
}

/// Quote `value` for a POSIX shell when it contains anything unusual.
pub fn shell_quote(value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+=:,@".contains(c));
    if plain {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', "'\\''"))
    }
}

/// Sleep for `duration` unless `cancel` fires first.
pub async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> ChrootResult<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(ChrootError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

/// Bound a remote call by `deadline` and the cancellation signal.
///
/// An elapsed deadline is reported as `ChrootError::Timeout` naming `what`.
pub async fn bounded<T, F>(
    what: &str,
    deadline: Duration,
    cancel: &CancellationToken,
    fut: F,
) -> ChrootResult<T>
where
    F: Future<Output = ChrootResult<T>>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(ChrootError::Cancelled),
        result = tokio::time::timeout(deadline, fut) => match result {
            Ok(inner) => inner,
            Err(_) => Err(ChrootError::Timeout(format!(
                "{} did not complete within {:?}",
                what, deadline
            ))),
        },
    }
}
