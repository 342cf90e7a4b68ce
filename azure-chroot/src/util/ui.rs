//! Human-readable status output.
//!
//! Status output is separate from logging: it is what an operator watching a
//! build sees. It never drives control flow.

/// Sink for build progress messages.
pub trait Ui: Send + Sync {
    /// Announce a step or milestone.
    fn say(&self, message: &str);

    /// Secondary detail under the current milestone.
    fn message(&self, message: &str);

    /// Report an error.
    fn error(&self, message: &str);
}

/// [`Ui`] that forwards to `tracing`.
#[derive(Debug, Default, Clone)]
pub struct TracingUi;

impl Ui for TracingUi {
    fn say(&self, message: &str) {
        tracing::info!("==> {}", message);
    }

    fn message(&self, message: &str) {
        tracing::info!("    {}", message);
    }

    fn error(&self, message: &str) {
        tracing::error!("{}", message);
    }
}
