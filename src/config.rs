//! Playback configuration
//!
//! Loaded from JSON; every field is optional and falls back to the defaults
//! below.
//!
//! ```json
//! {
//!   "fill_threshold": 15,
//!   "populator_idle_ms": 1,
//!   "refresh_rate_hz": 60.0,
//!   "scripts_dir": "scripts",
//!   "tap_hold_frames": 5
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::script::DEFAULT_FILL_THRESHOLD;
use crate::vsync::REFRESH_RATE_NTSC;
use crate::{Result, TasError};

/// Number of script slots (one per function key F1-F12)
pub const SCRIPT_SLOTS: u8 = 12;

/// Accepted refresh rates, in Hz
pub const REFRESH_RATE_RANGE: RangeInclusive<f64> = 1.0..=1000.0;

/// Playback configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Refill a source's queue while it holds fewer messages than this
    pub fill_threshold: usize,
    /// Populator sleep between passes, in milliseconds
    pub populator_idle_ms: u64,
    /// Display refresh rate driving the vsync ticker
    pub refresh_rate_hz: f64,
    /// Directory holding `script<n>.txt` slot files
    pub scripts_dir: PathBuf,
    /// Frames a button tap is held before release
    pub tap_hold_frames: u32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        PlaybackConfig {
            fill_threshold: DEFAULT_FILL_THRESHOLD,
            populator_idle_ms: 1,
            refresh_rate_hz: REFRESH_RATE_NTSC,
            scripts_dir: PathBuf::from("scripts"),
            tap_hold_frames: 5,
        }
    }
}

impl PlaybackConfig {
    /// Load and validate a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            TasError::Config(format!("failed to read '{}': {e}", path.display()))
        })?;
        Self::from_json(&text)
    }

    /// Parse and validate a JSON configuration
    pub fn from_json(text: &str) -> Result<Self> {
        let config: PlaybackConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.fill_threshold == 0 {
            return Err(TasError::Config("fill_threshold must be at least 1".into()));
        }
        if !REFRESH_RATE_RANGE.contains(&self.refresh_rate_hz) {
            return Err(TasError::Config(format!(
                "refresh_rate_hz must be within {}..={}, got {}",
                REFRESH_RATE_RANGE.start(),
                REFRESH_RATE_RANGE.end(),
                self.refresh_rate_hz
            )));
        }
        if self.tap_hold_frames == 0 {
            return Err(TasError::Config("tap_hold_frames must be at least 1".into()));
        }
        Ok(())
    }

    /// Populator idle delay
    pub fn populator_idle(&self) -> Duration {
        Duration::from_millis(self.populator_idle_ms)
    }

    /// Path of script slot `slot` (1-based)
    pub fn script_slot(&self, slot: u8) -> Result<PathBuf> {
        if !(1..=SCRIPT_SLOTS).contains(&slot) {
            return Err(TasError::Config(format!(
                "script slot {slot} out of range 1..={SCRIPT_SLOTS}"
            )));
        }
        Ok(self.scripts_dir.join(format!("script{slot}.txt")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PlaybackConfig::default();
        assert_eq!(config.fill_threshold, 15);
        assert_eq!(config.populator_idle(), Duration::from_millis(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = PlaybackConfig::from_json(r#"{ "refresh_rate_hz": 50.0 }"#).unwrap();
        assert_eq!(config.refresh_rate_hz, 50.0);
        assert_eq!(config.fill_threshold, 15);
        assert_eq!(config.scripts_dir, PathBuf::from("scripts"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(PlaybackConfig::from_json(r#"{ "fill_threshold": 0 }"#).is_err());
        assert!(PlaybackConfig::from_json(r#"{ "refresh_rate_hz": -1.0 }"#).is_err());
        assert!(PlaybackConfig::from_json(r#"{ "fill_threshold": "many" }"#).is_err());
    }

    #[test]
    fn test_refresh_rate_range() {
        assert!(PlaybackConfig::from_json(r#"{ "refresh_rate_hz": 1e-30 }"#).is_err());
        assert!(PlaybackConfig::from_json(r#"{ "refresh_rate_hz": 0.5 }"#).is_err());
        assert!(PlaybackConfig::from_json(r#"{ "refresh_rate_hz": 5000.0 }"#).is_err());
        assert!(PlaybackConfig::from_json(r#"{ "refresh_rate_hz": 1.0 }"#).is_ok());
        assert!(PlaybackConfig::from_json(r#"{ "refresh_rate_hz": 1000.0 }"#).is_ok());
    }

    #[test]
    fn test_script_slots() {
        let config = PlaybackConfig {
            scripts_dir: PathBuf::from("/sd/scripts"),
            ..PlaybackConfig::default()
        };
        assert_eq!(
            config.script_slot(3).unwrap(),
            PathBuf::from("/sd/scripts/script3.txt")
        );
        assert!(config.script_slot(0).is_err());
        assert!(config.script_slot(13).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tas.json");
        fs::write(&path, r#"{ "tap_hold_frames": 2, "scripts_dir": "tas" }"#).unwrap();

        let config = PlaybackConfig::load(&path).unwrap();
        assert_eq!(config.tap_hold_frames, 2);
        assert_eq!(config.scripts_dir, PathBuf::from("tas"));

        assert!(PlaybackConfig::load(dir.path().join("missing.json")).is_err());
    }
}
