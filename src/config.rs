//! Persisted user settings.
//!
//! Stored as TOML in the platform config directory. A missing or broken
//! file falls back to defaults; saves go through a temp file and a rename.

use crate::options::ProcessOptions;
use crate::theme::ThemeChoice;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

const SETTINGS_FILE: &str = "settings.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to write settings: {0}")]
    Io(#[from] io::Error),
    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub output_dir: PathBuf,
    pub theme: ThemeChoice,
    /// Worker threads for a batch, 0 = one per CPU.
    pub workers: usize,
    pub log_level: String,
    pub processing: ProcessOptions,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("Processed_Images"),
            theme: ThemeChoice::default(),
            workers: 0,
            log_level: "info".to_string(),
            processing: ProcessOptions::default(),
        }
    }
}

pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "image-shrinker")
}

pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store in the platform config directory, or next to the working
    /// directory when none is available.
    pub fn default_location() -> Self {
        let dir = project_dirs()
            .map(|dirs| dirs.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(dir.join(SETTINGS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Settings {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Settings::default(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Could not read settings, using defaults");
                return Settings::default();
            }
        };

        match toml::from_str(&content) {
            Ok(settings) => settings,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Invalid settings file, using defaults");
                Settings::default()
            }
        }
    }

    pub fn save(&self, settings: &Settings) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(settings)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp = self.path.with_extension("toml.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ResizeMode;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.toml"));
        assert_eq!(store.load(), Settings::default());
    }

    #[test]
    fn save_then_load_keeps_values() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("nested").join("settings.toml"));

        let mut settings = Settings::default();
        settings.theme = ThemeChoice::Creative;
        settings.workers = 3;
        settings.processing.quality = 70;
        settings.processing.resize = ResizeMode::FixedSize { width: 800, height: 600 };
        settings.processing.rename_prefix = "web".to_string();

        store.save(&settings).unwrap();
        assert!(!store.path().with_extension("toml.tmp").exists());
        assert_eq!(store.load(), settings);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(
            &path,
            "workers = 2\n\n[processing]\nquality = 60\n\n[processing.resize]\nmethod = \"max_width\"\nwidth = 1920\n",
        )
        .unwrap();

        let settings = SettingsStore::new(&path).load();
        assert_eq!(settings.workers, 2);
        assert_eq!(settings.processing.quality, 60);
        assert_eq!(settings.processing.resize, ResizeMode::MaxWidth { width: 1920 });
        assert!(settings.processing.to_jpg);
        assert_eq!(settings.theme, ThemeChoice::EnhancedDark);
    }

    #[test]
    fn garbage_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "this is = = not toml").unwrap();

        assert_eq!(SettingsStore::new(&path).load(), Settings::default());
    }
}
