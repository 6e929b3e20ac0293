//! Engine settings, loaded once at construction.

use crate::scene::DEFAULT_MAX_QUEUED_STROKES;
use kurbo::Size;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Settings errors.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Thresholds of the gesture engine. Distances are in global pixels, times in
/// seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TouchSettings {
    /// Floor for inter-finger distances in pinch math.
    pub min_touch_distance: f64,
    /// Movement past which a touch is no longer a tap.
    pub min_tap_distance: f64,
    /// Samples kept for swipe detection.
    pub swipe_queue_size: usize,
    /// Minimum swipe speed in pixels per second.
    pub swipe_min_velocity: f64,
    /// Maximum age of the oldest swipe sample at release.
    pub swipe_max_time: f64,
    pub double_tap_time: f64,
    /// Nominal sample rate used to turn per-sample distance into speed.
    pub frame_rate: f64,
}

impl Default for TouchSettings {
    fn default() -> Self {
        Self {
            min_touch_distance: 20.0,
            min_tap_distance: 20.0,
            swipe_queue_size: 4,
            swipe_min_velocity: 800.0,
            swipe_max_time: 0.5,
            double_tap_time: 0.2,
            frame_rate: 60.0,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub touch: TouchSettings,
    /// Size of the root node.
    pub world_size: Size,
    /// Cap on queued canvas stroke segments per flush.
    pub max_serialized_points: usize,
    /// Relay WebSocket URL.
    pub server_url: String,
    pub room: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            touch: TouchSettings::default(),
            world_size: Size::new(1920.0, 1080.0),
            max_serialized_points: DEFAULT_MAX_QUEUED_STROKES,
            server_url: "ws://127.0.0.1:3030/ws".to_string(),
            room: "default".to_string(),
        }
    }
}

impl EngineSettings {
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        serde_json::from_str(json).map_err(|e| SettingsError::Parse(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, SettingsError> {
        serde_json::to_string_pretty(self).map_err(|e| SettingsError::Parse(e.to_string()))
    }

    /// Read settings from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .map_err(|e| SettingsError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
        let settings = Self::from_json(&json)?;
        log::info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SettingsError> {
        let path = path.as_ref();
        fs::write(path, self.to_json()?)
            .map_err(|e| SettingsError::Io(format!("Failed to write {}: {}", path.display(), e)))
    }
}
