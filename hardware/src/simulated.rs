//! Simulated microscope hardware
//!
//! A deterministic stand-in used when no board or camera is attached:
//! every operation is logged, brightness and preview state are tracked,
//! and captures write a placeholder frame so downstream image handling
//! runs against real files.

use crate::error::{DeviceResult, HardwareError};
use crate::ops::DeviceOps;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

const FRAME_WIDTH: u32 = 640;
const FRAME_HEIGHT: u32 = 480;

/// Simulated exposure plus readout latency.
const CAPTURE_LATENCY: Duration = Duration::from_millis(150);

#[derive(Debug, Default)]
struct SimState {
    brightness: f64,
    previewing: bool,
    exposure_ms: u32,
    white_balance: String,
    frames: u64,
}

/// In-process mock of the stage, illuminator and camera.
pub struct SimulatedDeviceOps {
    state: Mutex<SimState>,
}

impl SimulatedDeviceOps {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState::default()),
        }
    }

    /// Whether the preview stream is currently running.
    pub fn is_previewing(&self) -> bool {
        self.state.lock().unwrap().previewing
    }

    /// Number of frames captured so far.
    pub fn frames_captured(&self) -> u64 {
        self.state.lock().unwrap().frames
    }
}

impl Default for SimulatedDeviceOps {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceOps for SimulatedDeviceOps {
    async fn stage_move_relative(&self, dx: i64, dy: i64, dz: i64) -> DeviceResult<()> {
        tracing::info!("[SIM] move_rel ({}, {}, {})", dx, dy, dz);
        Ok(())
    }

    async fn illumination_set_brightness(&self, level: f64) -> DeviceResult<()> {
        if !(0.0..=1.0).contains(&level) {
            return Err(HardwareError::InvalidParameter(format!(
                "brightness {} outside [0.0, 1.0]",
                level
            )));
        }
        tracing::info!("[SIM] LED brightness set to {:.2}", level);
        self.state.lock().unwrap().brightness = level;
        Ok(())
    }

    async fn illumination_get_brightness(&self) -> DeviceResult<f64> {
        Ok(self.state.lock().unwrap().brightness)
    }

    async fn camera_capture_to(&self, path: &Path) -> DeviceResult<()> {
        tokio::time::sleep(CAPTURE_LATENCY).await;

        // Vary the shade per frame so consecutive captures are
        // distinguishable by eye.
        let shade = {
            let mut state = self.state.lock().unwrap();
            state.frames += 1;
            128u8.wrapping_add((state.frames % 64) as u8)
        };
        let frame = image::RgbImage::from_pixel(
            FRAME_WIDTH,
            FRAME_HEIGHT,
            image::Rgb([shade, shade, shade]),
        );
        frame.save(path).map_err(|e| {
            HardwareError::Camera(format!("failed to write frame to {}: {}", path.display(), e))
        })?;
        tracing::info!("[SIM] Photo saved to {}", path.display());
        Ok(())
    }

    async fn camera_start_preview(&self) -> DeviceResult<()> {
        tracing::info!("[SIM] Camera preview started");
        self.state.lock().unwrap().previewing = true;
        Ok(())
    }

    async fn camera_stop_preview(&self) -> DeviceResult<()> {
        tracing::info!("[SIM] Camera preview stopped");
        self.state.lock().unwrap().previewing = false;
        Ok(())
    }

    async fn camera_set_exposure(&self, millis: u32) -> DeviceResult<()> {
        tracing::info!("[SIM] Exposure set to {}ms", millis);
        self.state.lock().unwrap().exposure_ms = millis;
        Ok(())
    }

    async fn camera_set_white_balance(&self, mode: &str) -> DeviceResult<()> {
        tracing::info!("[SIM] White balance set to {}", mode);
        self.state.lock().unwrap().white_balance = mode.to_string();
        Ok(())
    }
}
