//! Settings file
//!
//! `<config dir>/pixelmacro/settings.json`, every field optional:
//!
//! ```json
//! { "recorder": { "mouse_move_threshold": 5.0 },
//!   "playback": { "settle_delay_ms": 200, "pixel_timeout_ms": 30000 } }
//! ```

use crate::recorder::RecorderConfig;
use crate::replay::PlaybackConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub recorder: RecorderConfig,
    pub playback: PlaybackConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings from {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings in {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl Settings {
    /// Default location, if the platform has a config directory
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("pixelmacro").join("settings.json"))
    }

    /// Load from the default location; a missing file means defaults
    pub fn load_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "loaded settings");
        Ok(settings)
    }
}

/// `Duration` as whole milliseconds
pub(crate) mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"playback": {"settle_delay_ms": 50}}"#).unwrap();

        let s = Settings::load(&path).unwrap();
        assert_eq!(s.playback.settle_delay, Duration::from_millis(50));
        assert_eq!(s.playback.pixel_timeout, Duration::from_secs(30));
        assert_eq!(s.recorder, RecorderConfig::default());
    }

    #[test]
    fn round_trips_through_json() {
        let s = Settings::default();
        let text = serde_json::to_string(&s).unwrap();
        assert!(text.contains("\"pixel_poll_interval_ms\":100"));
        assert_eq!(serde_json::from_str::<Settings>(&text).unwrap(), s);
    }

    #[test]
    fn bad_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{").unwrap();
        assert!(matches!(Settings::load(&path), Err(ConfigError::Parse { .. })));
        assert!(matches!(
            Settings::load(&dir.path().join("missing.json")),
            Err(ConfigError::Read { .. })
        ));
    }
}
