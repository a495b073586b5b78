//! Timelapse session model

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Settings a start request is validated against.
#[derive(Debug, Clone)]
pub struct TimelapseConfig {
    /// Total run time of the session.
    pub duration: Duration,
    /// Delay armed between one tick and the next. Actual cadence is
    /// `interval + capture_duration`; capture latency is not compensated.
    pub interval: Duration,
    /// LED brightness used for each exposure window, in [0.0, 1.0].
    pub brightness: f64,
    /// Directory session folders are created under.
    pub output_root: PathBuf,
    /// End the session on the first failed capture instead of continuing.
    pub stop_on_capture_error: bool,
}

impl TimelapseConfig {
    /// Check the settings before any side effect happens.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.duration.is_zero() {
            return Err(ConfigError::ZeroDuration);
        }
        if self.interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        if !(0.0..=1.0).contains(&self.brightness) {
            return Err(ConfigError::BrightnessOutOfRange(self.brightness));
        }
        Ok(())
    }
}

/// Rejections raised while validating a start request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("duration must be greater than zero")]
    ZeroDuration,

    #[error("interval must be greater than zero")]
    ZeroInterval,

    #[error("brightness {0} outside [0.0, 1.0]")]
    BrightnessOutOfRange(f64),
}

/// One timelapse run, from confirmed start to completion or cancellation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelapseSession {
    pub start_time: DateTime<Local>,
    pub end_time: DateTime<Local>,
    pub interval_secs: u64,
    /// Folder all of this session's frames are written into, named by the
    /// session start time.
    pub output_directory: PathBuf,
}

/// Format a timestamp the way session folders and frame files are named:
/// sortable, filesystem-safe, second resolution.
pub fn sortable_timestamp(t: &DateTime<Local>) -> String {
    t.format("%Y-%m-%d_%H-%M-%S").to_string()
}
