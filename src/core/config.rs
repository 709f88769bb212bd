use std::path::PathBuf;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::time::Duration;

use super::alerts::engine::EngineConfig;

/// Dashboard settings, persisted next to the rule catalog.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Settings {
    /// Rule catalog file. Relative paths resolve against the config directory.
    #[serde(default = "default_catalog_path")]
    pub catalog_path: PathBuf,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default)]
    pub engine: EngineConfig,
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("catalog.json")
}

fn default_tick_interval_ms() -> u64 {
    100
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            catalog_path: default_catalog_path(),
            tick_interval_ms: default_tick_interval_ms(),
            engine: EngineConfig::default(),
        }
    }
}

impl Settings {
    pub fn tick_interval(&self) -> Duration {
        // A zero interval would stall replay.
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

pub struct ConfigManager {
    config_dir: PathBuf,
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(app_config_dir: PathBuf) -> Self {
        Self {
            config_path: app_config_dir.join("settings.json"),
            config_dir: app_config_dir,
        }
    }

    pub fn load(&self) -> Settings {
        if self.config_path.exists() {
            match fs::read_to_string(&self.config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(settings) => return settings,
                    Err(e) => log::warn!("Ignoring malformed {}: {}", self.config_path.display(), e),
                },
                Err(e) => log::warn!("Failed to read {}: {}", self.config_path.display(), e),
            }
        }
        Settings::default()
    }

    pub fn save(&self, settings: &Settings) -> io::Result<()> {
        // Ensure directory exists
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(settings)?;
        fs::write(&self.config_path, content)
    }

    /// Catalog location with relative paths anchored at the config directory.
    pub fn catalog_path(&self, settings: &Settings) -> PathBuf {
        if settings.catalog_path.is_absolute() {
            settings.catalog_path.clone()
        } else {
            self.config_dir.join(&settings.catalog_path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let manager = ConfigManager::new(dir.path().to_path_buf());

        let default = manager.load();
        assert_eq!(default.tick_interval_ms, 100);
        assert_eq!(default.engine.double_tap_window_ms, 350);

        let new_settings = Settings {
            catalog_path: PathBuf::from("/tmp/rules.json"),
            tick_interval_ms: 50,
            engine: EngineConfig {
                double_tap_window_ms: 400,
                clear_all_pulse_ms: 1_000,
            },
        };

        manager.save(&new_settings).unwrap();
        let loaded = manager.load();

        assert_eq!(loaded, new_settings);
        assert_eq!(manager.catalog_path(&loaded), PathBuf::from("/tmp/rules.json"));
    }

    #[test]
    fn test_malformed_settings_fall_back() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("settings.json"), "tick_interval_ms = 5").unwrap();
        let manager = ConfigManager::new(dir.path().to_path_buf());
        assert_eq!(manager.load(), Settings::default());
    }

    #[test]
    fn test_partial_settings_keep_defaults() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("settings.json"), r#"{"tick_interval_ms": 0}"#).unwrap();
        let manager = ConfigManager::new(dir.path().to_path_buf());

        let loaded = manager.load();
        assert_eq!(loaded.tick_interval(), Duration::from_millis(1));
        assert_eq!(loaded.engine, EngineConfig::default());
        assert_eq!(manager.catalog_path(&loaded), dir.path().join("catalog.json"));
    }
}
