//! Timelapse execution engine
//!
//! A single cooperative loop owns each session: decide whether the deadline
//! has passed, run one capture step, arm exactly one delayed re-entry.
//! Captures never overlap and cancellation is observed only at tick
//! boundaries, so a stop request lets an in-flight frame finish.

use crate::capture::capture_once;
use crate::session::{sortable_timestamp, ConfigError, TimelapseConfig, TimelapseSession};
use chrono::Local;
use microlapse_hardware::SharedDeviceOps;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::sync::RwLock as StdRwLock;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::Instant;

/// Commands that can be sent to a running timelapse
#[derive(Debug, Clone)]
pub enum TimelapseCommand {
    Stop,
}

/// State of the timelapse executor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimelapseState {
    /// No session; ready for a start request.
    Idle,
    /// A start request is being validated.
    Configuring,
    Running,
    /// Terminal for the session: the deadline was reached.
    Completed,
    /// Terminal for the session: stopped early or aborted on error.
    Cancelled,
}

/// Progress snapshot for the current or most recent session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelapseProgress {
    pub state: TimelapseState,
    pub frames_attempted: u32,
    pub frames_captured: u32,
    pub frames_failed: u32,
    pub elapsed_secs: f64,
    pub last_frame_path: Option<PathBuf>,
}

impl Default for TimelapseProgress {
    fn default() -> Self {
        Self {
            state: TimelapseState::Idle,
            frames_attempted: 0,
            frames_captured: 0,
            frames_failed: 0,
            elapsed_secs: 0.0,
            last_frame_path: None,
        }
    }
}

/// Event emitted by the executor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TimelapseEvent {
    StateChanged(TimelapseState),
    FrameCaptured { frame: u32, path: PathBuf },
    FrameFailed { frame: u32, error: String },
    TimelapseCompleted { frames_captured: u32 },
    TimelapseCancelled { frames_captured: u32 },
}

/// Why a start request was refused
#[derive(Error, Debug)]
pub enum StartError {
    #[error("cannot start: a timelapse is already {0:?}")]
    NotIdle(TimelapseState),

    #[error("no device operations configured")]
    NoDeviceOps,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to create session directory {path}: {source}")]
    SessionDirectory {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// The timelapse executor manages running one session at a time
pub struct TimelapseExecutor {
    state: Arc<RwLock<TimelapseState>>,
    progress: Arc<StdRwLock<TimelapseProgress>>,
    command_tx: Option<mpsc::Sender<TimelapseCommand>>,
    event_tx: broadcast::Sender<TimelapseEvent>,
    is_cancelled: Arc<AtomicBool>,
    /// Device operations handler - None until set_device_ops() is called.
    device_ops: Option<SharedDeviceOps>,
    session: Option<TimelapseSession>,
}

impl TimelapseExecutor {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            state: Arc::new(RwLock::new(TimelapseState::Idle)),
            progress: Arc::new(StdRwLock::new(TimelapseProgress::default())),
            command_tx: None,
            event_tx,
            is_cancelled: Arc::new(AtomicBool::new(false)),
            device_ops: None,
            session: None,
        }
    }

    /// Set the device operations handler.
    /// This MUST be called before starting a session.
    pub fn set_device_ops(&mut self, ops: SharedDeviceOps) {
        self.device_ops = Some(ops);
    }

    pub fn has_device_ops(&self) -> bool {
        self.device_ops.is_some()
    }

    /// Subscribe to executor events
    pub fn subscribe(&self) -> broadcast::Receiver<TimelapseEvent> {
        self.event_tx.subscribe()
    }

    /// Get the current state
    pub async fn get_state(&self) -> TimelapseState {
        *self.state.read().await
    }

    /// Get the current progress snapshot
    pub fn get_progress(&self) -> TimelapseProgress {
        self.progress.read().unwrap().clone()
    }

    /// The current or most recent session, if any
    pub fn session(&self) -> Option<&TimelapseSession> {
        self.session.as_ref()
    }

    fn emit(&self, event: TimelapseEvent) {
        let _ = self.event_tx.send(event);
    }

    async fn set_state(&self, state: TimelapseState) {
        *self.state.write().await = state;
        self.progress.write().unwrap().state = state;
        self.emit(TimelapseEvent::StateChanged(state));
    }

    /// Validate a start request and, on success, spawn the capture loop.
    ///
    /// Rejected while a session is configuring or running; terminal states
    /// count as ready for a fresh session.
    pub async fn start(&mut self, config: TimelapseConfig) -> Result<TimelapseSession, StartError> {
        let state = self.get_state().await;
        if matches!(state, TimelapseState::Configuring | TimelapseState::Running) {
            return Err(StartError::NotIdle(state));
        }
        let device_ops = self.device_ops.clone().ok_or(StartError::NoDeviceOps)?;

        self.set_state(TimelapseState::Configuring).await;
        if let Err(e) = config.validate() {
            self.set_state(TimelapseState::Idle).await;
            return Err(e.into());
        }

        let start_time = Local::now();
        let output_directory = config.output_root.join(sortable_timestamp(&start_time));
        if let Err(e) = std::fs::create_dir_all(&output_directory) {
            self.set_state(TimelapseState::Idle).await;
            return Err(StartError::SessionDirectory {
                path: output_directory,
                source: e,
            });
        }

        let end_time = chrono::TimeDelta::from_std(config.duration)
            .ok()
            .and_then(|d| start_time.checked_add_signed(d))
            .unwrap_or(chrono::DateTime::<chrono::Utc>::MAX_UTC.with_timezone(&Local));
        let session = TimelapseSession {
            start_time,
            end_time,
            interval_secs: config.interval.as_secs(),
            output_directory: output_directory.clone(),
        };

        tracing::info!(
            "Starting timelapse: duration {:?}, interval {:?}, saving to {}",
            config.duration,
            config.interval,
            output_directory.display()
        );

        self.is_cancelled.store(false, Ordering::Relaxed);
        let (tx, mut rx) = mpsc::channel::<TimelapseCommand>(8);
        self.command_tx = Some(tx);

        *self.progress.write().unwrap() = TimelapseProgress::default();
        self.session = Some(session.clone());
        self.set_state(TimelapseState::Running).await;

        let state = self.state.clone();
        let progress = self.progress.clone();
        let event_tx = self.event_tx.clone();
        let is_cancelled = self.is_cancelled.clone();
        let brightness = config.brightness;
        let interval = config.interval;
        let duration = config.duration;
        let stop_on_capture_error = config.stop_on_capture_error;

        tokio::spawn(async move {
            let started = Instant::now();
            let deadline = started + duration;
            let mut frames_attempted = 0u32;
            let mut frames_captured = 0u32;

            let outcome = loop {
                if is_cancelled.load(Ordering::Relaxed) {
                    break TimelapseState::Cancelled;
                }
                if Instant::now() >= deadline {
                    break TimelapseState::Completed;
                }

                frames_attempted += 1;
                match capture_once(&device_ops, &output_directory, brightness).await {
                    Ok(frame) => {
                        frames_captured += 1;
                        {
                            let mut prog = progress.write().unwrap();
                            prog.frames_attempted = frames_attempted;
                            prog.frames_captured = frames_captured;
                            prog.elapsed_secs = started.elapsed().as_secs_f64();
                            prog.last_frame_path = Some(frame.file_path.clone());
                        }
                        let _ = event_tx.send(TimelapseEvent::FrameCaptured {
                            frame: frames_attempted,
                            path: frame.file_path,
                        });
                    }
                    Err(e) => {
                        tracing::warn!("Capture {} failed: {}", frames_attempted, e);
                        {
                            let mut prog = progress.write().unwrap();
                            prog.frames_attempted = frames_attempted;
                            prog.frames_failed += 1;
                            prog.elapsed_secs = started.elapsed().as_secs_f64();
                        }
                        let _ = event_tx.send(TimelapseEvent::FrameFailed {
                            frame: frames_attempted,
                            error: e.to_string(),
                        });
                        if stop_on_capture_error {
                            tracing::warn!("Ending timelapse on first capture error");
                            break TimelapseState::Cancelled;
                        }
                    }
                }

                // Exactly one pending re-entry at a time; a stop request
                // cancels it by winning the select.
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    cmd = rx.recv() => match cmd {
                        Some(TimelapseCommand::Stop) | None => {
                            break TimelapseState::Cancelled;
                        }
                    },
                }
            };

            // Illumination is released before completion is surfaced.
            if let Err(e) = device_ops.illumination_set_brightness(0.0).await {
                tracing::warn!("Failed to turn illumination off at session end: {}", e);
            }

            *state.write().await = outcome;
            {
                let mut prog = progress.write().unwrap();
                prog.state = outcome;
                prog.elapsed_secs = started.elapsed().as_secs_f64();
            }

            match outcome {
                TimelapseState::Completed => {
                    tracing::info!("Timelapse complete: {} frames", frames_captured);
                    let _ = event_tx.send(TimelapseEvent::TimelapseCompleted { frames_captured });
                }
                TimelapseState::Cancelled => {
                    tracing::info!("Timelapse stopped early: {} frames", frames_captured);
                    let _ = event_tx.send(TimelapseEvent::TimelapseCancelled { frames_captured });
                }
                _ => {}
            }
            let _ = event_tx.send(TimelapseEvent::StateChanged(outcome));
        });

        Ok(session)
    }

    /// Request cooperative cancellation of the running session.
    ///
    /// A no-op when nothing is running: stopping twice, or stopping before
    /// ever starting, neither crashes nor cancels an unarmed timer.
    pub async fn stop(&mut self) {
        let state = self.get_state().await;
        if state != TimelapseState::Running {
            tracing::debug!("Stop requested with no running timelapse ({:?}), ignoring", state);
            return;
        }

        tracing::info!("Stop requested, cancelling pending capture tick");
        self.is_cancelled.store(true, Ordering::Relaxed);
        if let Some(tx) = &self.command_tx {
            let _ = tx.send(TimelapseCommand::Stop).await;
        }
        self.command_tx = None;
    }

    /// Clear terminal state and progress, ready for a fresh session.
    pub async fn reset(&mut self) {
        let state = self.get_state().await;
        if matches!(state, TimelapseState::Configuring | TimelapseState::Running) {
            return;
        }
        self.command_tx = None;
        self.is_cancelled.store(false, Ordering::Relaxed);
        self.session = None;
        *self.state.write().await = TimelapseState::Idle;
        *self.progress.write().unwrap() = TimelapseProgress::default();
    }
}

impl Default for TimelapseExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use microlapse_hardware::{DeviceOps, DeviceResult, HardwareError};
    use std::collections::HashSet;
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records when captures happen (in seconds of virtual time) and what
    /// brightness the LED was commanded to, failing on configured frames.
    struct RecordingOps {
        started: Instant,
        capture_times: Mutex<Vec<u64>>,
        brightness: Mutex<f64>,
        exposure_levels: Mutex<Vec<f64>>,
        fail_frames: HashSet<u32>,
        attempts: Mutex<u32>,
    }

    impl RecordingOps {
        fn new(fail_frames: impl IntoIterator<Item = u32>) -> Arc<Self> {
            Arc::new(Self {
                started: Instant::now(),
                capture_times: Mutex::new(Vec::new()),
                brightness: Mutex::new(0.0),
                exposure_levels: Mutex::new(Vec::new()),
                fail_frames: fail_frames.into_iter().collect(),
                attempts: Mutex::new(0),
            })
        }

        fn capture_times(&self) -> Vec<u64> {
            self.capture_times.lock().unwrap().clone()
        }

        fn brightness(&self) -> f64 {
            *self.brightness.lock().unwrap()
        }

        fn exposure_levels(&self) -> Vec<f64> {
            self.exposure_levels.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl DeviceOps for RecordingOps {
        async fn stage_move_relative(&self, _dx: i64, _dy: i64, _dz: i64) -> DeviceResult<()> {
            Ok(())
        }

        async fn illumination_set_brightness(&self, level: f64) -> DeviceResult<()> {
            *self.brightness.lock().unwrap() = level;
            if level > 0.0 {
                self.exposure_levels.lock().unwrap().push(level);
            }
            Ok(())
        }

        async fn illumination_get_brightness(&self) -> DeviceResult<f64> {
            Ok(*self.brightness.lock().unwrap())
        }

        async fn camera_capture_to(&self, _path: &Path) -> DeviceResult<()> {
            let attempt = {
                let mut attempts = self.attempts.lock().unwrap();
                *attempts += 1;
                *attempts
            };
            if self.fail_frames.contains(&attempt) {
                return Err(HardwareError::Camera("simulated sensor fault".into()));
            }
            self.capture_times
                .lock()
                .unwrap()
                .push(self.started.elapsed().as_secs());
            Ok(())
        }

        async fn camera_start_preview(&self) -> DeviceResult<()> {
            Ok(())
        }

        async fn camera_stop_preview(&self) -> DeviceResult<()> {
            Ok(())
        }

        async fn camera_set_exposure(&self, _millis: u32) -> DeviceResult<()> {
            Ok(())
        }

        async fn camera_set_white_balance(&self, _mode: &str) -> DeviceResult<()> {
            Ok(())
        }
    }

    fn config(output_root: &Path, duration_secs: u64, interval_secs: u64) -> TimelapseConfig {
        TimelapseConfig {
            duration: Duration::from_secs(duration_secs),
            interval: Duration::from_secs(interval_secs),
            brightness: 0.33,
            output_root: output_root.to_path_buf(),
            stop_on_capture_error: false,
        }
    }

    async fn wait_for_terminal(
        events: &mut broadcast::Receiver<TimelapseEvent>,
    ) -> TimelapseEvent {
        loop {
            let event = events.recv().await.expect("event stream closed");
            if matches!(
                event,
                TimelapseEvent::TimelapseCompleted { .. } | TimelapseEvent::TimelapseCancelled { .. }
            ) {
                return event;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn thirty_second_run_at_five_second_interval_captures_six_frames() {
        let dir = tempfile::tempdir().unwrap();
        let ops = RecordingOps::new([]);
        let mut executor = TimelapseExecutor::new();
        executor.set_device_ops(ops.clone());
        let mut events = executor.subscribe();

        executor.start(config(dir.path(), 30, 5)).await.unwrap();

        let terminal = wait_for_terminal(&mut events).await;
        match terminal {
            TimelapseEvent::TimelapseCompleted { frames_captured } => {
                assert_eq!(frames_captured, 6)
            }
            other => panic!("expected completion, got {:?}", other),
        }

        // Ticks at t = 0, 5, 10, 15, 20, 25; never a 7th past the deadline.
        assert_eq!(ops.capture_times(), vec![0, 5, 10, 15, 20, 25]);
        assert_eq!(executor.get_state().await, TimelapseState::Completed);
        assert_eq!(ops.brightness(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_mid_schedule_cancels_pending_tick() {
        let dir = tempfile::tempdir().unwrap();
        let ops = RecordingOps::new([]);
        let mut executor = TimelapseExecutor::new();
        executor.set_device_ops(ops.clone());
        let mut events = executor.subscribe();

        executor.start(config(dir.path(), 30, 5)).await.unwrap();

        tokio::time::sleep(Duration::from_secs(12)).await;
        executor.stop().await;

        let terminal = wait_for_terminal(&mut events).await;
        assert!(matches!(
            terminal,
            TimelapseEvent::TimelapseCancelled { frames_captured: 3 }
        ));
        assert_eq!(ops.capture_times(), vec![0, 5, 10]);
        assert_eq!(executor.get_state().await, TimelapseState::Cancelled);
        assert_eq!(ops.brightness(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_while_running_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ops = RecordingOps::new([]);
        let mut executor = TimelapseExecutor::new();
        executor.set_device_ops(ops.clone());

        executor.start(config(dir.path(), 30, 5)).await.unwrap();

        let second = executor.start(config(dir.path(), 30, 5)).await;
        assert!(matches!(
            second,
            Err(StartError::NotIdle(TimelapseState::Running))
        ));

        executor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_tick_does_not_block_later_ticks() {
        let dir = tempfile::tempdir().unwrap();
        let ops = RecordingOps::new([3]);
        let mut executor = TimelapseExecutor::new();
        executor.set_device_ops(ops.clone());
        let mut events = executor.subscribe();

        executor.start(config(dir.path(), 30, 5)).await.unwrap();

        let mut saw_frame_failed = false;
        loop {
            match events.recv().await.unwrap() {
                TimelapseEvent::FrameFailed { frame, .. } => {
                    assert_eq!(frame, 3);
                    saw_frame_failed = true;
                }
                TimelapseEvent::TimelapseCompleted { frames_captured } => {
                    assert_eq!(frames_captured, 5);
                    break;
                }
                TimelapseEvent::TimelapseCancelled { .. } => {
                    panic!("session should survive a single failed tick")
                }
                _ => {}
            }
        }
        assert!(saw_frame_failed);

        let progress = executor.get_progress();
        assert_eq!(progress.frames_attempted, 6);
        assert_eq!(progress.frames_failed, 1);
        assert_eq!(ops.capture_times(), vec![0, 5, 15, 20, 25]);
    }

    #[tokio::test(start_paused = true)]
    async fn strict_mode_ends_the_session_on_first_capture_error() {
        let dir = tempfile::tempdir().unwrap();
        let ops = RecordingOps::new([1]);
        let mut executor = TimelapseExecutor::new();
        executor.set_device_ops(ops.clone());
        let mut events = executor.subscribe();

        let mut cfg = config(dir.path(), 30, 5);
        cfg.stop_on_capture_error = true;
        executor.start(cfg).await.unwrap();

        let terminal = wait_for_terminal(&mut events).await;
        assert!(matches!(
            terminal,
            TimelapseEvent::TimelapseCancelled { frames_captured: 0 }
        ));
        assert_eq!(ops.brightness(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn every_exposure_uses_the_configured_brightness() {
        let dir = tempfile::tempdir().unwrap();
        let ops = RecordingOps::new([]);
        let mut executor = TimelapseExecutor::new();
        executor.set_device_ops(ops.clone());
        let mut events = executor.subscribe();

        executor.start(config(dir.path(), 10, 5)).await.unwrap();
        wait_for_terminal(&mut events).await;

        assert_eq!(ops.exposure_levels(), vec![0.33, 0.33]);
        assert_eq!(ops.brightness(), 0.0);
    }

    #[tokio::test]
    async fn stopping_without_a_session_is_a_noop() {
        let mut executor = TimelapseExecutor::new();
        executor.stop().await;
        executor.stop().await;
        assert_eq!(executor.get_state().await, TimelapseState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn restarting_after_completion_begins_a_fresh_session() {
        let dir = tempfile::tempdir().unwrap();
        let ops = RecordingOps::new([]);
        let mut executor = TimelapseExecutor::new();
        executor.set_device_ops(ops.clone());
        let mut events = executor.subscribe();

        executor.start(config(dir.path(), 5, 5)).await.unwrap();
        wait_for_terminal(&mut events).await;

        // Stopping a finished session changes nothing.
        executor.stop().await;
        assert_eq!(executor.get_state().await, TimelapseState::Completed);

        executor.start(config(dir.path(), 5, 5)).await.unwrap();
        wait_for_terminal(&mut events).await;
        assert_eq!(executor.get_state().await, TimelapseState::Completed);
    }

    #[tokio::test]
    async fn zero_duration_or_interval_is_rejected_before_any_side_effect() {
        let dir = tempfile::tempdir().unwrap();
        let ops = RecordingOps::new([]);
        let mut executor = TimelapseExecutor::new();
        executor.set_device_ops(ops.clone());

        let result = executor.start(config(dir.path(), 0, 5)).await;
        assert!(matches!(
            result,
            Err(StartError::Config(ConfigError::ZeroDuration))
        ));

        let result = executor.start(config(dir.path(), 30, 0)).await;
        assert!(matches!(
            result,
            Err(StartError::Config(ConfigError::ZeroInterval))
        ));

        assert_eq!(executor.get_state().await, TimelapseState::Idle);
        assert!(ops.capture_times().is_empty());
        // Validation failed before the session folder was created.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn starting_without_device_ops_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut executor = TimelapseExecutor::new();

        let result = executor.start(config(dir.path(), 30, 5)).await;
        assert!(matches!(result, Err(StartError::NoDeviceOps)));
        assert_eq!(executor.get_state().await, TimelapseState::Idle);
    }
}
