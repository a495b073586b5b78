//! The atomic capture step
//!
//! One tick's unit of work: raise the LED, take one photo, drop the LED,
//! hand back the artifact. Illumination restore on every exit path is
//! guaranteed by the scoped guard, not by this module.

use crate::session::sortable_timestamp;
use chrono::{DateTime, Local};
use image::DynamicImage;
use microlapse_hardware::{with_illumination, HardwareError, SharedDeviceOps};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Display thumbnails fit within this box.
pub const THUMBNAIL_MAX_WIDTH: u32 = 380;
pub const THUMBNAIL_MAX_HEIGHT: u32 = 280;

/// A frame captured by one tick of the timelapse loop.
///
/// Immutable once created; the artifact on disk is the owning copy.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub timestamp: DateTime<Local>,
    pub file_path: PathBuf,
    /// Bounded-size preview of the saved artifact. `None` when decoding
    /// failed; display problems never fail the frame.
    pub thumbnail: Option<DynamicImage>,
}

/// A single frame's acquisition or persistence failed.
///
/// Per-frame failures are recoverable: the scheduler logs them and keeps
/// the session going unless configured otherwise.
#[derive(Error, Debug, Clone)]
pub enum CaptureError {
    #[error("capture failed: {0}")]
    Camera(#[from] HardwareError),
}

/// Capture one frame into `output_directory` with the LED at `brightness`.
///
/// The frame file is named by its own timestamp so a session folder sorts
/// chronologically.
pub async fn capture_once(
    ops: &SharedDeviceOps,
    output_directory: &Path,
    brightness: f64,
) -> Result<CapturedFrame, CaptureError> {
    let timestamp = Local::now();
    let file_path = output_directory.join(format!("{}.jpg", sortable_timestamp(&timestamp)));

    with_illumination(ops, brightness, async {
        ops.camera_capture_to(&file_path).await
    })
    .await?;

    tracing::info!("Captured: {}", file_path.display());

    let thumbnail = match image::open(&file_path) {
        Ok(img) => Some(img.thumbnail(THUMBNAIL_MAX_WIDTH, THUMBNAIL_MAX_HEIGHT)),
        Err(e) => {
            tracing::warn!(
                "Failed to decode {} for display: {}",
                file_path.display(),
                e
            );
            None
        }
    };

    Ok(CapturedFrame {
        timestamp,
        file_path,
        thumbnail,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use microlapse_hardware::{DeviceOps, DeviceResult, SimulatedDeviceOps};
    use std::sync::Arc;

    #[tokio::test]
    async fn captures_a_frame_with_thumbnail_and_dark_led() {
        let sim = Arc::new(SimulatedDeviceOps::new());
        let ops: SharedDeviceOps = sim.clone();
        let dir = tempfile::tempdir().unwrap();

        let frame = capture_once(&ops, dir.path(), 0.33).await.unwrap();

        assert!(frame.file_path.exists());
        assert_eq!(
            frame.file_path.extension().and_then(|e| e.to_str()),
            Some("jpg")
        );

        let thumb = frame.thumbnail.expect("artifact should decode");
        assert!(thumb.width() <= THUMBNAIL_MAX_WIDTH);
        assert!(thumb.height() <= THUMBNAIL_MAX_HEIGHT);

        // The exposure window is over, so the LED must be dark again.
        assert_eq!(sim.illumination_get_brightness().await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn camera_failure_surfaces_but_led_still_goes_dark() {
        struct BrokenCamera {
            inner: SimulatedDeviceOps,
        }

        #[async_trait::async_trait]
        impl DeviceOps for BrokenCamera {
            async fn stage_move_relative(&self, dx: i64, dy: i64, dz: i64) -> DeviceResult<()> {
                self.inner.stage_move_relative(dx, dy, dz).await
            }
            async fn illumination_set_brightness(&self, level: f64) -> DeviceResult<()> {
                self.inner.illumination_set_brightness(level).await
            }
            async fn illumination_get_brightness(&self) -> DeviceResult<f64> {
                self.inner.illumination_get_brightness().await
            }
            async fn camera_capture_to(&self, _path: &std::path::Path) -> DeviceResult<()> {
                Err(HardwareError::Camera("sensor timeout".into()))
            }
            async fn camera_start_preview(&self) -> DeviceResult<()> {
                self.inner.camera_start_preview().await
            }
            async fn camera_stop_preview(&self) -> DeviceResult<()> {
                self.inner.camera_stop_preview().await
            }
            async fn camera_set_exposure(&self, millis: u32) -> DeviceResult<()> {
                self.inner.camera_set_exposure(millis).await
            }
            async fn camera_set_white_balance(&self, mode: &str) -> DeviceResult<()> {
                self.inner.camera_set_white_balance(mode).await
            }
        }

        let ops: SharedDeviceOps = Arc::new(BrokenCamera {
            inner: SimulatedDeviceOps::new(),
        });
        let dir = tempfile::tempdir().unwrap();

        let result = capture_once(&ops, dir.path(), 0.5).await;

        assert!(matches!(result, Err(CaptureError::Camera(_))));
        assert_eq!(ops.illumination_get_brightness().await.unwrap(), 0.0);
    }
}
