//! Controller operations for the host application
//!
//! The desktop shell calls into this module; it mediates between the
//! hardware, the timelapse executor and the control surface so conflicting
//! operations cannot overlap. While a timelapse runs, every control except
//! "stop early" is refused; the shell mirrors that by disabling widgets in
//! response to `ControlSurfaceChanged` events.

use crate::error::BridgeError;
use crate::event::{EventPayload, EventSeverity};
use crate::settings::AppSettings;
use crate::state::{AppState, ControlSurfaceState, Increments, SharedAppState};
use microlapse_hardware::{HardwareBackend, SharedDeviceOps};
use microlapse_scheduler::{
    parse_timespec, TimelapseConfig, TimelapseEvent, TimelapseExecutor, TimelapseProgress,
    TimelapseSession,
};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// Stage axes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

/// Jog direction along an axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JogDirection {
    Positive,
    Negative,
}

/// Which of the two configured step sizes a jog uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JogStep {
    Fine,
    Coarse,
}

/// The operations the control panel exposes to its shell
pub struct MicroscopeController {
    state: SharedAppState,
    device_ops: SharedDeviceOps,
    executor: Arc<RwLock<TimelapseExecutor>>,
    exposure_ms: u32,
    white_balance: String,
    output_root: std::path::PathBuf,
    stop_on_capture_error: bool,
}

impl MicroscopeController {
    /// Build a controller over the selected hardware backend.
    ///
    /// Applies the camera setup from `settings` and forces the LED dark,
    /// whatever state the board was left in.
    pub async fn new(
        backend: HardwareBackend,
        settings: AppSettings,
    ) -> Result<Arc<Self>, BridgeError> {
        let device_ops = backend.into_device_ops();

        device_ops.camera_set_exposure(settings.exposure_ms).await?;
        device_ops
            .camera_set_white_balance(&settings.white_balance)
            .await?;
        device_ops.illumination_set_brightness(0.0).await?;

        let state = AppState::new(&settings);
        let mut executor = TimelapseExecutor::new();
        executor.set_device_ops(device_ops.clone());

        let controller = Arc::new(Self {
            state,
            device_ops,
            executor: Arc::new(RwLock::new(executor)),
            exposure_ms: settings.exposure_ms,
            white_balance: settings.white_balance,
            output_root: settings.output_root,
            stop_on_capture_error: settings.stop_on_capture_error,
        });
        controller.spawn_session_watcher().await;
        Ok(controller)
    }

    /// Forward executor events onto the app bus and hand the control
    /// surface back to the user when a session reaches a terminal state.
    async fn spawn_session_watcher(&self) {
        let mut rx = self.executor.read().await.subscribe();
        let state = self.state.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let terminal = matches!(
                            event,
                            TimelapseEvent::TimelapseCompleted { .. }
                                | TimelapseEvent::TimelapseCancelled { .. }
                        );
                        let severity = match event {
                            TimelapseEvent::FrameFailed { .. } => EventSeverity::Warning,
                            _ => EventSeverity::Info,
                        };
                        state.event_bus.publish(severity, EventPayload::Timelapse(event));
                        if terminal {
                            state.set_control_surface(ControlSurfaceState::Idle).await;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("Session watcher lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    /// Current control surface state, for shells that poll instead of
    /// subscribing.
    pub async fn control_surface(&self) -> ControlSurfaceState {
        self.state.control_surface().await
    }

    /// Subscribe to controller events.
    pub fn subscribe(&self) -> broadcast::Receiver<crate::event::ControllerEvent> {
        self.state.event_bus.subscribe()
    }

    /// Progress snapshot of the current or most recent timelapse.
    pub async fn timelapse_progress(&self) -> TimelapseProgress {
        self.executor.read().await.get_progress()
    }

    async fn ensure_controls_available(&self) -> Result<(), BridgeError> {
        match self.state.control_surface().await {
            ControlSurfaceState::TimelapseActive => Err(BridgeError::TimelapseActive),
            _ => Ok(()),
        }
    }

    // =========================================================================
    // Stage
    // =========================================================================

    /// Jog the stage one step along an axis. Fire-and-forget.
    pub async fn move_stage(
        &self,
        axis: Axis,
        direction: JogDirection,
        step: JogStep,
    ) -> Result<(), BridgeError> {
        self.ensure_controls_available().await?;

        let increments = self.state.increments().await;
        let magnitude = match step {
            JogStep::Fine => increments.fine,
            JogStep::Coarse => increments.coarse,
        };
        let count = match direction {
            JogDirection::Positive => magnitude,
            JogDirection::Negative => -magnitude,
        };
        let (dx, dy, dz) = match axis {
            Axis::X => (count, 0, 0),
            Axis::Y => (0, count, 0),
            Axis::Z => (0, 0, count),
        };

        self.device_ops.stage_move_relative(dx, dy, dz).await?;
        self.state
            .event_bus
            .publish(EventSeverity::Info, EventPayload::StageMoved { dx, dy, dz });
        Ok(())
    }

    /// Change the fine/coarse jog step sizes.
    pub async fn set_increments(&self, fine: i64, coarse: i64) -> Result<(), BridgeError> {
        self.ensure_controls_available().await?;
        if fine <= 0 {
            return Err(BridgeError::InvalidIncrement(fine));
        }
        if coarse <= 0 {
            return Err(BridgeError::InvalidIncrement(coarse));
        }
        self.state.set_increments(Increments { fine, coarse }).await;
        Ok(())
    }

    /// Currently configured jog step sizes.
    pub async fn increments(&self) -> Increments {
        self.state.increments().await
    }

    // =========================================================================
    // Illumination and preview
    // =========================================================================

    /// Store the LED brightness used for previews and exposures. Drives the
    /// hardware immediately only while a preview is showing.
    pub async fn set_led_brightness(&self, level: f64) -> Result<(), BridgeError> {
        self.ensure_controls_available().await?;
        if !(0.0..=1.0).contains(&level) {
            return Err(BridgeError::InvalidBrightness(level));
        }

        self.state.set_led_brightness(level).await;
        if self.state.control_surface().await == ControlSurfaceState::PreviewActive {
            self.device_ops.illumination_set_brightness(level).await?;
        }
        self.state.event_bus.publish(
            EventSeverity::Info,
            EventPayload::LedBrightnessChanged { level },
        );
        Ok(())
    }

    /// Toggle the external camera preview, returning the new state.
    pub async fn toggle_preview(&self) -> Result<ControlSurfaceState, BridgeError> {
        match self.state.control_surface().await {
            ControlSurfaceState::TimelapseActive => Err(BridgeError::TimelapseActive),
            ControlSurfaceState::Idle => {
                let level = self.state.led_brightness().await;
                self.device_ops.illumination_set_brightness(level).await?;
                if let Err(e) = self.device_ops.camera_start_preview().await {
                    tracing::warn!("Failed to start preview: {}", e);
                }
                self.state
                    .set_control_surface(ControlSurfaceState::PreviewActive)
                    .await;
                self.state
                    .event_bus
                    .publish(EventSeverity::Info, EventPayload::PreviewStarted);
                Ok(ControlSurfaceState::PreviewActive)
            }
            ControlSurfaceState::PreviewActive => {
                self.stop_preview_internal().await;
                Ok(ControlSurfaceState::Idle)
            }
        }
    }

    /// Preview teardown is best-effort: the LED going dark matters more
    /// than either call succeeding.
    async fn stop_preview_internal(&self) {
        if let Err(e) = self.device_ops.camera_stop_preview().await {
            tracing::warn!("Failed to stop preview: {}", e);
        }
        if let Err(e) = self.device_ops.illumination_set_brightness(0.0).await {
            tracing::warn!("Failed to turn illumination off: {}", e);
        }
        self.state.set_control_surface(ControlSurfaceState::Idle).await;
        self.state
            .event_bus
            .publish(EventSeverity::Info, EventPayload::PreviewStopped);
    }

    // =========================================================================
    // Timelapse
    // =========================================================================

    /// Confirm settings and start a timelapse.
    ///
    /// An active preview is driven off first so illumination ownership
    /// transfers to the capture loop. Invalid duration or interval strings
    /// abort the request before any session state is created.
    pub async fn start_timelapse(
        &self,
        duration: &str,
        interval: &str,
    ) -> Result<TimelapseSession, BridgeError> {
        match self.state.control_surface().await {
            ControlSurfaceState::TimelapseActive => return Err(BridgeError::TimelapseActive),
            ControlSurfaceState::PreviewActive => self.stop_preview_internal().await,
            ControlSurfaceState::Idle => {}
        }

        let duration = parse_timespec(duration).map_err(BridgeError::InvalidDuration)?;
        let interval = parse_timespec(interval).map_err(BridgeError::InvalidInterval)?;

        let config = TimelapseConfig {
            duration,
            interval,
            brightness: self.state.led_brightness().await,
            output_root: self.output_root.clone(),
            stop_on_capture_error: self.stop_on_capture_error,
        };

        let session = self.executor.write().await.start(config).await?;
        self.state
            .set_control_surface(ControlSurfaceState::TimelapseActive)
            .await;
        Ok(session)
    }

    /// Stop the running timelapse early. A no-op when none is running.
    pub async fn stop_timelapse(&self) {
        self.executor.write().await.stop().await;
    }

    /// Best-effort teardown before the host application exits: any running
    /// session is cancelled, preview stopped, LED forced dark. Errors are
    /// logged and swallowed; shutdown proceeds regardless.
    pub async fn shutdown(&self) {
        self.executor.write().await.stop().await;
        if self.state.control_surface().await == ControlSurfaceState::PreviewActive {
            self.stop_preview_internal().await;
        }
        if let Err(e) = self.device_ops.illumination_set_brightness(0.0).await {
            tracing::warn!("Failed to turn illumination off during shutdown: {}", e);
        }
    }

    /// Snapshot the live state back into a persistable settings value.
    pub async fn snapshot_settings(&self) -> AppSettings {
        let increments = self.state.increments().await;
        AppSettings {
            fine_increment: increments.fine,
            coarse_increment: increments.coarse,
            led_brightness: self.state.led_brightness().await,
            exposure_ms: self.exposure_ms,
            white_balance: self.white_balance.clone(),
            output_root: self.output_root.clone(),
            stop_on_capture_error: self.stop_on_capture_error,
        }
    }
}
