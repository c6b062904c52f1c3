//! Input settings persisted as TOML under the user's config directory.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::controller::device::AxisDirection;
use crate::controller::registry::DeviceDefaults;
use crate::controller::translator::{InputEventKind, RawAxis};

const CONFIG_DIR: &str = ".config/padhub";
const INPUT_CONFIG_FILE: &str = "input.toml";
const MAX_POLL_INTERVAL_MS: u64 = 60_000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid setting: {0}")]
    Invalid(String),
}

/// Binds one side of a raw axis to a logical button.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct AxisBinding {
    pub axis: RawAxis,
    pub direction: AxisDirection,
    pub kind: InputEventKind,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct InputSettings {
    /// Interval of the polling tick in milliseconds
    pub poll_interval_ms: u64,

    /// Raw axis magnitude (0..=32767) that has to be exceeded to count as a press
    pub dead_zone: i16,

    /// Capacity of every device's event channel
    pub event_buffer: usize,

    pub stats_interval_secs: u64,

    /// Stop polling on the first protocol violation instead of logging it
    pub halt_on_protocol_error: bool,

    /// Replaces the bundled controller mapping database
    pub mapping_db_path: Option<PathBuf>,

    pub log_level: String,

    /// Axis sides that should act as buttons. Empty by default.
    pub axis_bindings: Vec<AxisBinding>,
}

impl Default for InputSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5,
            dead_zone: 8000,
            event_buffer: 256,
            stats_interval_secs: 30,
            halt_on_protocol_error: false,
            mapping_db_path: None,
            log_level: "info".to_string(),
            axis_bindings: Vec::new(),
        }
    }
}

impl InputSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Falls back to the longest representable window for values `validate`
    /// would reject.
    pub fn stats_interval(&self) -> chrono::Duration {
        self.try_stats_interval().unwrap_or(chrono::Duration::MAX)
    }

    fn try_stats_interval(&self) -> Option<chrono::Duration> {
        i64::try_from(self.stats_interval_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
    }

    pub fn device_defaults(&self) -> DeviceDefaults {
        DeviceDefaults {
            dead_zone: self.dead_zone,
            event_buffer: self.event_buffer,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 || self.poll_interval_ms > MAX_POLL_INTERVAL_MS {
            return Err(ConfigError::Invalid(format!(
                "poll_interval_ms must be within 1..={}, got {}",
                MAX_POLL_INTERVAL_MS, self.poll_interval_ms
            )));
        }
        if self.try_stats_interval().is_none() {
            return Err(ConfigError::Invalid(format!(
                "stats_interval_secs is out of range, got {}",
                self.stats_interval_secs
            )));
        }
        if self.dead_zone < 0 {
            return Err(ConfigError::Invalid(format!(
                "dead_zone must not be negative, got {}",
                self.dead_zone
            )));
        }
        if self.event_buffer == 0 {
            return Err(ConfigError::Invalid(
                "event_buffer must hold at least one entry".to_string(),
            ));
        }
        if self.log_level.parse::<tracing::Level>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "unknown log level '{}'",
                self.log_level
            )));
        }
        Ok(())
    }

    pub fn from_toml(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let settings: Self = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let settings = Self::from_toml(&content, path)?;
        debug!("Loaded input settings from {}: {:?}", path.display(), settings);
        Ok(settings)
    }

    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ConfigError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        tokio::fs::write(path, content)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        info!("Saved input settings to {}", path.display());
        Ok(())
    }

    /// Writes the default settings to `path` unless a file already exists.
    pub async fn ensure_default_config(path: &Path) -> Result<(), ConfigError> {
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        if !exists {
            info!("No input settings at {}, writing defaults", path.display());
            Self::default().save(path).await?;
        }
        Ok(())
    }
}

/// `~/.config/padhub/input.toml`
pub fn default_config_path() -> PathBuf {
    let mut path = get_home_dir();
    path.push(CONFIG_DIR);
    path.push(INPUT_CONFIG_FILE);
    path
}

fn get_home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| {
        warn!("Could not determine home directory, using current directory");
        PathBuf::from(".")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("padhub-config-{}-{}", name, std::process::id()))
            .join(INPUT_CONFIG_FILE)
    }

    #[test]
    fn defaults_are_valid() {
        let settings = InputSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.poll_interval(), Duration::from_millis(5));
        assert!(settings.axis_bindings.is_empty());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let settings =
            InputSettings::from_toml("dead_zone = 12000\n", Path::new("input.toml")).unwrap();
        assert_eq!(settings.dead_zone, 12000);
        assert_eq!(settings.poll_interval_ms, 5);
        assert_eq!(settings.device_defaults().dead_zone, 12000);
    }

    #[test]
    fn parses_axis_bindings() {
        let content = r#"
            [[axis_bindings]]
            axis = 1
            direction = "negative"
            kind = "Up"
        "#;
        let settings = InputSettings::from_toml(content, Path::new("input.toml")).unwrap();
        assert_eq!(
            settings.axis_bindings,
            vec![AxisBinding {
                axis: RawAxis::LEFT_Y,
                direction: AxisDirection::Negative,
                kind: InputEventKind::Up,
            }]
        );
    }

    #[test]
    fn rejects_invalid_values() {
        for content in [
            "poll_interval_ms = 0",
            "poll_interval_ms = 3600000",
            "stats_interval_secs = 100000000000000000",
            "dead_zone = -1",
            "event_buffer = 0",
            "log_level = \"loud\"",
        ] {
            let result = InputSettings::from_toml(content, Path::new("input.toml"));
            assert!(matches!(result, Err(ConfigError::Invalid(_))), "{content}");
        }
    }

    #[test]
    fn large_stats_interval_is_accepted_as_is() {
        let settings =
            InputSettings::from_toml("stats_interval_secs = 86400", Path::new("input.toml"))
                .unwrap();
        assert_eq!(settings.stats_interval(), chrono::Duration::days(1));
    }

    #[test]
    fn out_of_range_stats_interval_does_not_panic() {
        let settings = InputSettings {
            stats_interval_secs: u64::MAX,
            ..InputSettings::default()
        };
        assert_eq!(settings.stats_interval(), chrono::Duration::MAX);
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let result = InputSettings::from_toml("dead_zone = ", Path::new("input.toml"));
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[tokio::test]
    async fn ensure_default_config_writes_once() {
        let path = temp_path("ensure");
        let _ = tokio::fs::remove_file(&path).await;

        InputSettings::ensure_default_config(&path).await.unwrap();
        let mut settings = InputSettings::load(&path).await.unwrap();
        assert_eq!(settings, InputSettings::default());

        settings.dead_zone = 4000;
        settings.save(&path).await.unwrap();
        InputSettings::ensure_default_config(&path).await.unwrap();
        assert_eq!(InputSettings::load(&path).await.unwrap().dead_zone, 4000);

        let _ = tokio::fs::remove_dir_all(path.parent().unwrap()).await;
    }
}
