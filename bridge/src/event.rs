//! Event bus for host-application consumption
//!
//! Components publish here and the shell subscribes to update its widgets.
//! Each event carries a monotonically increasing sequence number so a slow
//! consumer can detect gaps after a lagged receive.

use crate::state::ControlSurfaceState;
use microlapse_scheduler::TimelapseEvent;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Default event buffer size.
///
/// A running timelapse produces a handful of events per tick; this leaves
/// generous headroom before a slow subscriber sees `Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

/// Event severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventSeverity {
    Info,
    Warning,
    Error,
}

/// What happened
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    ControlSurfaceChanged { state: ControlSurfaceState },
    PreviewStarted,
    PreviewStopped,
    StageMoved { dx: i64, dy: i64, dz: i64 },
    LedBrightnessChanged { level: f64 },
    Timelapse(TimelapseEvent),
}

/// An event as delivered to subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerEvent {
    pub sequence: u64,
    pub severity: EventSeverity,
    pub payload: EventPayload,
}

/// Broadcast bus shared by the controller and its watcher tasks
pub struct EventBus {
    tx: broadcast::Sender<ControllerEvent>,
    next_sequence: AtomicU64,
}

impl EventBus {
    pub fn new(buffer: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer);
        Self {
            tx,
            next_sequence: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.tx.subscribe()
    }

    /// Publish an event, returning its sequence number.
    pub fn publish(&self, severity: EventSeverity, payload: EventPayload) -> u64 {
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let event = ControllerEvent {
            sequence,
            severity,
            payload,
        };
        if self.tx.send(event).is_err() {
            tracing::trace!("No event subscribers, dropping event {}", sequence);
        }
        sequence
    }
}

/// Shared event bus handle
pub type SharedEventBus = Arc<EventBus>;
