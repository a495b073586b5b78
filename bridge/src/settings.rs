//! Settings storage for the control panel
//!
//! A small JSON file next to the other app data. Loading falls back to
//! defaults when the file does not exist yet; saving rewrites it whole.

use crate::error::BridgeError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_FINE_INCREMENT: i64 = 50;
pub const DEFAULT_COARSE_INCREMENT: i64 = 500;
pub const DEFAULT_LED_BRIGHTNESS: f64 = 0.33;
pub const DEFAULT_EXPOSURE_MS: u32 = 10;
pub const DEFAULT_WHITE_BALANCE: &str = "daylight";

const SETTINGS_FILE: &str = "settings.json";

/// Persisted control-panel settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    pub fine_increment: i64,
    pub coarse_increment: i64,
    pub led_brightness: f64,
    pub exposure_ms: u32,
    pub white_balance: String,
    /// Directory session folders are created under.
    pub output_root: PathBuf,
    pub stop_on_capture_error: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            fine_increment: DEFAULT_FINE_INCREMENT,
            coarse_increment: DEFAULT_COARSE_INCREMENT,
            led_brightness: DEFAULT_LED_BRIGHTNESS,
            exposure_ms: DEFAULT_EXPOSURE_MS,
            white_balance: DEFAULT_WHITE_BALANCE.to_string(),
            output_root: PathBuf::from("."),
            stop_on_capture_error: false,
        }
    }
}

/// File-backed settings store
pub struct SettingsStorage {
    path: PathBuf,
}

impl SettingsStorage {
    pub fn new(storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: storage_dir.into().join(SETTINGS_FILE),
        }
    }

    /// Load settings, falling back to defaults when no file exists yet.
    pub fn load(&self) -> Result<AppSettings, BridgeError> {
        if !self.path.exists() {
            return Ok(AppSettings::default());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        serde_json::from_str(&raw)
            .map_err(|e| BridgeError::Settings(format!("{}: {}", self.path.display(), e)))
    }

    /// Persist settings, creating the storage directory if needed.
    pub fn save(&self, settings: &AppSettings) -> Result<(), BridgeError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(settings)
            .map_err(|e| BridgeError::Settings(e.to_string()))?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SettingsStorage::new(dir.path());

        let settings = storage.load().unwrap();
        assert_eq!(settings, AppSettings::default());
        assert_eq!(settings.fine_increment, 50);
        assert_eq!(settings.coarse_increment, 500);
        assert_eq!(settings.led_brightness, 0.33);
        assert_eq!(settings.white_balance, "daylight");
    }

    #[test]
    fn settings_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SettingsStorage::new(dir.path());

        let mut settings = AppSettings::default();
        settings.fine_increment = 25;
        settings.stop_on_capture_error = true;
        settings.output_root = PathBuf::from("/data/timelapses");

        storage.save(&settings).unwrap();
        assert_eq!(storage.load().unwrap(), settings);
    }

    #[test]
    fn corrupt_file_reports_a_settings_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SETTINGS_FILE), "{not json").unwrap();
        let storage = SettingsStorage::new(dir.path());

        assert!(matches!(storage.load(), Err(BridgeError::Settings(_))));
    }
}
