//! Shared application state
//!
//! Thread-safe state the controller and its watcher tasks both touch. The
//! control surface field is the single arbiter of which user actions are
//! currently allowed; transitions go through [`AppState::set_control_surface`]
//! so every change is published to the event bus.

use crate::event::{EventBus, EventPayload, EventSeverity, SharedEventBus, DEFAULT_EVENT_BUFFER_SIZE};
use crate::settings::AppSettings;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Which mode currently owns the control surface.
///
/// Exactly one of preview and capture may intend nonzero illumination at a
/// time; `Idle` means neither does, and brightness must be 0.0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlSurfaceState {
    Idle,
    PreviewActive,
    TimelapseActive,
}

/// Stage jog step sizes, in motor counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Increments {
    pub fine: i64,
    pub coarse: i64,
}

/// Live application state shared across tasks
pub struct AppState {
    /// Event bus for publishing/subscribing to events
    pub event_bus: SharedEventBus,

    control_surface: RwLock<ControlSurfaceState>,

    /// Brightness the LED is driven to while a preview or exposure window
    /// is active.
    led_brightness: RwLock<f64>,

    increments: RwLock<Increments>,
}

impl AppState {
    pub fn new(settings: &AppSettings) -> Arc<Self> {
        Arc::new(Self {
            event_bus: Arc::new(EventBus::new(DEFAULT_EVENT_BUFFER_SIZE)),
            control_surface: RwLock::new(ControlSurfaceState::Idle),
            led_brightness: RwLock::new(settings.led_brightness),
            increments: RwLock::new(Increments {
                fine: settings.fine_increment,
                coarse: settings.coarse_increment,
            }),
        })
    }

    pub async fn control_surface(&self) -> ControlSurfaceState {
        *self.control_surface.read().await
    }

    pub(crate) async fn set_control_surface(&self, state: ControlSurfaceState) {
        {
            let mut current = self.control_surface.write().await;
            if *current == state {
                return;
            }
            *current = state;
        }
        tracing::debug!("Control surface now {:?}", state);
        self.event_bus.publish(
            EventSeverity::Info,
            EventPayload::ControlSurfaceChanged { state },
        );
    }

    pub async fn led_brightness(&self) -> f64 {
        *self.led_brightness.read().await
    }

    pub(crate) async fn set_led_brightness(&self, level: f64) {
        *self.led_brightness.write().await = level;
    }

    pub async fn increments(&self) -> Increments {
        *self.increments.read().await
    }

    pub(crate) async fn set_increments(&self, increments: Increments) {
        *self.increments.write().await = increments;
    }
}

/// Shared application state handle
pub type SharedAppState = Arc<AppState>;
