use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::poll::PollConfig;
use crate::{Error, Result};

pub const SETTINGS_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub api_base: String,
    #[serde(default)]
    pub poll: PollSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollSettings {
    pub interval_ms: u64,
    pub max_attempts: Option<u32>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            poll: PollSettings::default(),
        }
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            max_attempts: None,
        }
    }
}

impl PollSettings {
    pub fn to_poll_config(&self) -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(self.interval_ms),
            max_attempts: self.max_attempts,
        }
    }
}

pub fn config_path(config_dir: &Path) -> PathBuf {
    config_dir.join(SETTINGS_FILE_NAME)
}

pub fn load_settings(config_dir: &Path) -> Result<Settings> {
    let path = config_path(config_dir);
    if !path.exists() {
        return Ok(Settings::default());
    }

    let text = std::fs::read_to_string(&path).map_err(|e| Error::InvalidConfig {
        message: format!("config read failed: {e}"),
    })?;

    parse_settings(&text)
}

pub fn parse_settings(text: &str) -> Result<Settings> {
    toml::from_str(text).map_err(|e| Error::InvalidConfig {
        message: format!("config invalid: {e}"),
    })
}

pub fn validate_settings(settings: &Settings) -> Result<()> {
    let base = settings.api_base.trim();
    if base.is_empty() {
        return Err(Error::InvalidConfig {
            message: "api_base must be set".to_string(),
        });
    }
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        return Err(Error::InvalidConfig {
            message: format!("api_base must be an http(s) url (got {base:?})"),
        });
    }

    if settings.poll.interval_ms == 0 {
        return Err(Error::InvalidConfig {
            message: "poll.interval_ms must be > 0".to_string(),
        });
    }

    Ok(())
}

pub fn save_settings(config_dir: &Path, settings: &Settings) -> Result<()> {
    validate_settings(settings)?;

    let path = config_path(config_dir);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::InvalidConfig {
            message: format!("config dir create failed: {e}"),
        })?;
    }

    let text = toml::to_string(settings).map_err(|e| Error::InvalidConfig {
        message: format!("config encode failed: {e}"),
    })?;

    atomic_write(&path, text.as_bytes()).map_err(|e| Error::InvalidConfig {
        message: format!("config write failed: {e}"),
    })?;
    Ok(())
}

fn atomic_write(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings(dir.path()).unwrap();
        assert_eq!(settings.api_base, "");
        assert_eq!(settings.poll.interval_ms, 1000);
        assert_eq!(settings.poll.max_attempts, None);
    }

    #[test]
    fn empty_text_yields_defaults() {
        let settings = parse_settings("").unwrap();
        assert_eq!(settings.poll.interval_ms, 1000);
    }

    #[test]
    fn parse_reads_poll_section() {
        let settings = parse_settings(
            r#"
api_base = "https://files.example.test/api"

[poll]
interval_ms = 250
max_attempts = 30
"#,
        )
        .unwrap();
        assert_eq!(settings.api_base, "https://files.example.test/api");
        assert_eq!(settings.poll.interval_ms, 250);
        assert_eq!(settings.poll.max_attempts, Some(30));
    }

    #[test]
    fn empty_api_base_is_rejected() {
        let settings = Settings::default();
        let err = validate_settings(&settings).unwrap_err();
        assert!(err.to_string().contains("api_base"));
    }

    #[test]
    fn non_http_api_base_is_rejected() {
        let settings = Settings {
            api_base: "ftp://files.example.test".to_string(),
            ..Settings::default()
        };
        let err = validate_settings(&settings).unwrap_err();
        assert!(err.to_string().contains("http(s)"));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let settings = Settings {
            api_base: "https://files.example.test".to_string(),
            poll: PollSettings {
                interval_ms: 0,
                max_attempts: None,
            },
        };
        let err = validate_settings(&settings).unwrap_err();
        assert!(err.to_string().contains("interval_ms"));
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            api_base: "https://files.example.test/api".to_string(),
            poll: PollSettings {
                interval_ms: 500,
                max_attempts: Some(10),
            },
        };

        save_settings(dir.path(), &settings).unwrap();
        let loaded = load_settings(dir.path()).unwrap();
        assert_eq!(loaded.api_base, settings.api_base);
        assert_eq!(loaded.poll.interval_ms, 500);
        assert_eq!(loaded.poll.max_attempts, Some(10));
    }

    #[test]
    fn poll_settings_convert_to_poll_config() {
        let poll = PollSettings {
            interval_ms: 250,
            max_attempts: Some(4),
        };
        let config = poll.to_poll_config();
        assert_eq!(config.interval, Duration::from_millis(250));
        assert_eq!(config.max_attempts, Some(4));
    }
}
