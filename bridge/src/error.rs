//! Error types for the embedding layer
//!
//! Only configuration problems are meant to reach the user as blocking
//! dialogs; everything else is logged and degrades the session rather than
//! crashing the controller.

use microlapse_hardware::HardwareError;
use microlapse_scheduler::{StartError, TimespecError};
use thiserror::Error;

/// Main error type returned by controller operations
#[derive(Error, Debug)]
pub enum BridgeError {
    // =========================================================================
    // Configuration Errors (user-visible, nothing mutated)
    // =========================================================================

    #[error("Invalid duration: {0}")]
    InvalidDuration(TimespecError),

    #[error("Invalid interval: {0}")]
    InvalidInterval(TimespecError),

    #[error("Invalid increment: {0}")]
    InvalidIncrement(i64),

    #[error("Invalid brightness: {0}")]
    InvalidBrightness(f64),

    #[error(transparent)]
    Start(#[from] StartError),

    // =========================================================================
    // Control Surface Errors
    // =========================================================================

    /// The requested control is disabled while a timelapse runs.
    #[error("Control is unavailable while a timelapse is running")]
    TimelapseActive,

    // =========================================================================
    // Hardware / System Errors
    // =========================================================================

    #[error("Hardware error: {0}")]
    Hardware(#[from] HardwareError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Whether this error should surface as a blocking dialog rather than
    /// a log line.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            BridgeError::InvalidDuration(_)
                | BridgeError::InvalidInterval(_)
                | BridgeError::InvalidIncrement(_)
                | BridgeError::InvalidBrightness(_)
                | BridgeError::Start(_)
                | BridgeError::TimelapseActive
        )
    }
}
