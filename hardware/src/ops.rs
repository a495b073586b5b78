//! Device operations trait
//!
//! This module defines the interface between the timelapse core and
//! whatever is actually driving the microscope. The simulated backend in
//! this crate implements it; real hardware implementations are provided by
//! the embedding application.

use crate::error::DeviceResult;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// Trait defining the device operations the controller needs.
///
/// The scheduler and bridge call these methods without knowing which
/// backend is behind them.
#[async_trait]
pub trait DeviceOps: Send + Sync {
    // =========================================================================
    // STAGE OPERATIONS
    // =========================================================================

    /// Move the stage by a relative step count on each axis.
    ///
    /// Fire-and-forget: the physical move is not awaited beyond handing the
    /// command to the board.
    async fn stage_move_relative(&self, dx: i64, dy: i64, dz: i64) -> DeviceResult<()>;

    // =========================================================================
    // ILLUMINATION OPERATIONS
    // =========================================================================

    /// Set LED brightness. `level` must be within [0.0, 1.0].
    async fn illumination_set_brightness(&self, level: f64) -> DeviceResult<()>;

    /// Read back the last commanded brightness.
    async fn illumination_get_brightness(&self) -> DeviceResult<f64>;

    // =========================================================================
    // CAMERA OPERATIONS
    // =========================================================================

    /// Capture a single frame and write it to `path`.
    async fn camera_capture_to(&self, path: &Path) -> DeviceResult<()>;

    /// Start the external preview stream. Independent of capture.
    async fn camera_start_preview(&self) -> DeviceResult<()>;

    /// Stop the external preview stream.
    async fn camera_stop_preview(&self) -> DeviceResult<()>;

    /// Set sensor exposure in milliseconds.
    async fn camera_set_exposure(&self, millis: u32) -> DeviceResult<()>;

    /// Set the white balance mode (e.g. "daylight").
    async fn camera_set_white_balance(&self, mode: &str) -> DeviceResult<()>;
}

/// Shared device operations handle
pub type SharedDeviceOps = Arc<dyn DeviceOps>;
