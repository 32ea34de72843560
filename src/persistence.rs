use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::binding::{BindingDescriptor, BindingSet};
use crate::constants::{config, defaults};
use crate::error::CarouselError;
use crate::types::Position;

/// Settings that survive between sessions
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PersistedSettings {
    pub bindings: BindingSet,
    pub overlay_position: Option<Position>,
}

/// On-disk layout
#[derive(Debug, Serialize, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    keybinds: KeybindsFile,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    hud_pos: Option<Position>,
}

/// Bindings as stored; the empty string means unbound, a missing field its default
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
struct KeybindsFile {
    prev: String,
    next: String,
    pause: String,
}

impl Default for KeybindsFile {
    fn default() -> Self {
        Self {
            prev: defaults::PREVIOUS.to_string(),
            next: defaults::NEXT.to_string(),
            pause: defaults::PAUSE.to_string(),
        }
    }
}

fn parse_binding(field: &str, text: &str) -> Option<BindingDescriptor> {
    let binding = BindingDescriptor::parse(text);
    if binding.is_none() && !text.trim().is_empty() {
        warn!(field = field, value = %text, "Unreadable binding in settings, leaving it unbound");
    }
    binding
}

impl From<SettingsFile> for PersistedSettings {
    fn from(file: SettingsFile) -> Self {
        Self {
            bindings: BindingSet {
                previous: parse_binding("prev", &file.keybinds.prev),
                next: parse_binding("next", &file.keybinds.next),
                pause: parse_binding("pause", &file.keybinds.pause),
            },
            overlay_position: file.hud_pos,
        }
    }
}

impl From<&PersistedSettings> for SettingsFile {
    fn from(settings: &PersistedSettings) -> Self {
        let text = |binding: &Option<BindingDescriptor>| {
            binding.as_ref().map(|b| b.to_string()).unwrap_or_default()
        };
        Self {
            keybinds: KeybindsFile {
                prev: text(&settings.bindings.previous),
                next: text(&settings.bindings.next),
                pause: text(&settings.bindings.pause),
            },
            hud_pos: settings.overlay_position,
        }
    }
}

/// Reads and writes [`PersistedSettings`] at a fixed path
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$XDG_CONFIG_HOME/win-carousel/settings.json`, or the working directory
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(config::APP_DIR);
        path.push(config::FILENAME);
        path
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load settings, falling back to defaults on any failure
    pub fn load(&self) -> PersistedSettings {
        if !self.path.exists() {
            info!(path = %self.path.display(), "No settings file found, using defaults");
            return PersistedSettings::default();
        }

        match self.try_load() {
            Ok(settings) => {
                info!(path = %self.path.display(), "Settings loaded");
                settings
            }
            Err(e) => {
                warn!(error = %e, "Using default settings");
                PersistedSettings::default()
            }
        }
    }

    pub fn try_load(&self) -> Result<PersistedSettings, CarouselError> {
        self.read()
            .map_err(|e| CarouselError::settings_io(&self.path, &e))
    }

    fn read(&self) -> Result<PersistedSettings> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings from {:?}", self.path))?;
        let file: SettingsFile = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse settings JSON from {:?}", self.path))?;
        Ok(file.into())
    }

    /// Save settings; failures are logged and otherwise ignored
    pub fn save(&self, settings: &PersistedSettings) {
        if let Err(e) = self.try_save(settings) {
            error!(error = %e, "Failed to save settings");
        }
    }

    pub fn try_save(&self, settings: &PersistedSettings) -> Result<(), CarouselError> {
        self.write(settings)
            .map_err(|e| CarouselError::settings_io(&self.path, &e))
    }

    fn write(&self, settings: &PersistedSettings) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create settings directory {:?}", parent))?;
        }
        let json = serde_json::to_string_pretty(&SettingsFile::from(settings))
            .context("Failed to serialize settings to JSON")?;
        fs::write(&self.path, json)
            .with_context(|| format!("Failed to write settings to {:?}", self.path))?;
        info!(path = %self.path.display(), "Saved settings");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{Action, MouseButton};

    fn store_in(dir: &tempfile::TempDir) -> SettingsStore {
        SettingsStore::new(dir.path().join("nested").join(config::FILENAME))
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = store_in(&dir).load();
        assert_eq!(settings, PersistedSettings::default());
        assert_eq!(settings.overlay_position, None);
    }

    #[test]
    fn test_broken_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(config::FILENAME);
        fs::write(&path, "{ not json").unwrap();

        let store = SettingsStore::new(&path);
        assert_eq!(store.load(), PersistedSettings::default());
        assert!(matches!(store.try_load(), Err(CarouselError::SettingsIo { .. })));
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let mut bindings = BindingSet::unbound();
        bindings.set(Action::Previous, BindingDescriptor::parse("ctrl+shift+q"));
        bindings.set(Action::Pause, Some(BindingDescriptor::mouse(MouseButton::X2)));
        let settings = PersistedSettings {
            bindings,
            overlay_position: Some(Position::new(-40, 1200)),
        };

        store.try_save(&settings).unwrap();
        assert_eq!(store.load(), settings);
    }

    #[test]
    fn test_round_trip_without_position() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let settings = PersistedSettings::default();

        store.try_save(&settings).unwrap();
        let contents = fs::read_to_string(store.path()).unwrap();
        assert!(!contents.contains("hud_pos"));
        assert_eq!(store.load(), settings);
    }

    #[test]
    fn test_file_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let settings = PersistedSettings {
            bindings: BindingSet::default(),
            overlay_position: Some(Position::new(10, 20)),
        };
        store.try_save(&settings).unwrap();

        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(value["keybinds"]["prev"], "alt+1");
        assert_eq!(value["keybinds"]["next"], "alt+2");
        assert_eq!(value["keybinds"]["pause"], "middle mouse");
        assert_eq!(value["hud_pos"]["x"], 10);
        assert_eq!(value["hud_pos"]["y"], 20);
    }

    #[test]
    fn test_missing_fields_fall_back_individually() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(config::FILENAME);
        fs::write(&path, r#"{"keybinds": {"next": "F3"}, "extra": true}"#).unwrap();

        let settings = SettingsStore::new(&path).load();
        assert_eq!(settings.bindings.previous, BindingDescriptor::parse("alt+1"));
        assert_eq!(settings.bindings.next, BindingDescriptor::parse("f3"));
        assert_eq!(settings.bindings.pause, BindingDescriptor::parse("middle mouse"));
        assert_eq!(settings.overlay_position, None);
    }

    #[test]
    fn test_empty_string_is_unbound() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(config::FILENAME);
        fs::write(&path, r#"{"keybinds": {"prev": "", "next": "alt+2", "pause": ""}}"#).unwrap();

        let settings = SettingsStore::new(&path).load();
        assert_eq!(settings.bindings.previous, None);
        assert_eq!(settings.bindings.pause, None);
    }

    #[test]
    fn test_save_to_unwritable_path_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        // A file where the parent directory should be
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "").unwrap();
        let store = SettingsStore::new(blocker.join(config::FILENAME));

        assert!(matches!(
            store.try_save(&PersistedSettings::default()),
            Err(CarouselError::SettingsIo { .. })
        ));
        // The logging variant swallows the same failure
        store.save(&PersistedSettings::default());
    }
}
