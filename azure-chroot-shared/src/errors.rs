//! Error types used across the azure-chroot builder.

use thiserror::Error;

/// Result type for builder operations.
pub type ChrootResult<T> = Result<T, ChrootError>;

#[derive(Debug, Clone, Error)]
pub enum ChrootError {
    #[error("configuration error: {0}")]
    Config(String),

    /// Every problem found while validating a build configuration.
    #[error("invalid configuration:\n  {}", .0.join("\n  "))]
    InvalidConfig(Vec<String>),

    #[error("cloud API error: {0}")]
    Cloud(String),

    #[error("command failed: {0}")]
    Command(String),

    #[error("LVM error: {0}")]
    Lvm(String),

    #[error("mount error: {0}")]
    Mount(String),

    #[error("device error: {0}")]
    Device(String),

    #[error("cleanup error: {0}")]
    Cleanup(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("build cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ChrootError {
    /// True when the error came from the cancellation signal rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ChrootError::Cancelled)
    }
}

// Implement From for common error types to enable `?` operator
impl From<std::io::Error> for ChrootError {
    fn from(err: std::io::Error) -> Self {
        ChrootError::Internal(format!("I/O error: {}", err))
    }
}

impl From<serde_json::Error> for ChrootError {
    fn from(err: serde_json::Error) -> Self {
        ChrootError::Internal(format!("JSON error: {}", err))
    }
}

impl From<String> for ChrootError {
    fn from(err: String) -> Self {
        ChrootError::Internal(err)
    }
}

impl From<&str> for ChrootError {
    fn from(err: &str) -> Self {
        ChrootError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_config_lists_every_problem() {
        let err = ChrootError::InvalidConfig(vec![
            "source is required".to_string(),
            "mount_partition is invalid".to_string(),
        ]);
        let text = err.to_string();
        assert!(text.contains("source is required"));
        assert!(text.contains("\n  mount_partition is invalid"));
    }

    #[test]
    fn cancelled_is_recognised() {
        assert!(ChrootError::Cancelled.is_cancelled());
        assert!(!ChrootError::Internal("x".into()).is_cancelled());
    }
}
