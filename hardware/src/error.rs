//! Error types for the hardware capability layer

use thiserror::Error;

/// Errors surfaced by device operations.
///
/// Variants carry enough context for a log line or a user-facing message;
/// none of them should take the host application down.
#[derive(Error, Debug, Clone)]
pub enum HardwareError {
    #[error("Stage error: {0}")]
    Stage(String),

    #[error("Camera error: {0}")]
    Camera(String),

    #[error("Illumination error: {0}")]
    Illumination(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Result type for device operations
pub type DeviceResult<T> = Result<T, HardwareError>;
