//! Client settings

use std::path::PathBuf;

use anyhow::{Context, Result};
use hub_archive::{ArchiveConfig, LiveUpdate};
use hub_ingest::LiveConfig;
use serde::{Deserialize, Serialize};

/// Client settings, stored as JSON
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Hub host, e.g. `radarhub.arrc.ou.edu`
    pub host: String,
    /// Use `wss`/`https`
    pub secure: bool,
    /// Radar to follow when none is given
    pub pathway: String,
    /// Live-update mode applied when browsing the archive
    pub live_update: LiveUpdate,
    pub live: LiveConfig,
    pub archive: ArchiveConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "radarhub.arrc.ou.edu".to_string(),
            secure: true,
            pathway: "px1000".to_string(),
            live_update: LiveUpdate::Scan,
            live: LiveConfig::default(),
            archive: ArchiveConfig::default(),
        }
    }
}

impl Settings {
    /// `$XDG_CONFIG_HOME/radarhub`, falling back to `~/.config/radarhub`
    fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_config);
            if path.is_absolute() {
                return Some(path.join("radarhub"));
            }
        }
        dirs::home_dir().map(|h| h.join(".config").join("radarhub"))
    }

    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.json"))
    }

    /// Load settings from disk; defaults when the file is missing or unreadable
    pub fn load() -> Self {
        Self::settings_path()
            .and_then(|path| std::fs::read_to_string(path).ok())
            .map(|s| Self::from_json(&s))
            .unwrap_or_default()
    }

    /// Parse settings text; defaults when it is not valid JSON
    pub fn from_json(text: &str) -> Self {
        match serde_json::from_str(text) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Ignoring corrupt settings: {}", e);
                Self::default()
            }
        }
    }

    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::settings_path().context("Could not determine settings path")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }

    /// Archive server origin
    pub fn origin(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{scheme}://{}", self.host)
    }

    /// Archive configuration with the preferred live-update mode applied
    pub fn archive_config(&self) -> ArchiveConfig {
        ArchiveConfig {
            live_update: self.live_update,
            ..self.archive.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let settings = Settings::from_json(r#"{"host": "localhost:8000", "secure": false}"#);
        assert_eq!(settings.host, "localhost:8000");
        assert_eq!(settings.origin(), "http://localhost:8000");
        assert_eq!(settings.pathway, "px1000");
        assert_eq!(settings.live, LiveConfig::default());
    }

    #[test]
    fn test_corrupt_file_gives_defaults() {
        assert_eq!(Settings::from_json("{not json"), Settings::default());
    }

    #[test]
    fn test_archive_config_takes_live_update() {
        let settings = Settings {
            live_update: LiveUpdate::Offline,
            ..Default::default()
        };
        assert_eq!(settings.archive_config().live_update, LiveUpdate::Offline);
        assert_eq!(settings.archive_config().watchdog_ms, 3000);
    }

    #[test]
    fn test_round_trip() {
        let settings = Settings {
            pathway: "raxpol".into(),
            ..Default::default()
        };
        let json = serde_json::to_string_pretty(&settings).unwrap();
        assert_eq!(Settings::from_json(&json), settings);
    }
}
