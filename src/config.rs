//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: `%APPDATA%\ouroboros\config.toml`
//! - macOS: `~/Library/Application Support/ouroboros/config.toml`
//! - Linux: `~/.config/ouroboros/config.toml`
//!
//! Unknown keys are ignored and unknown values fall back to defaults, so an
//! older or hand-edited config file never prevents startup.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::model::RepeatMode;

/// Top-level application configuration. Mirrors the `[section] key`
/// table in the external-interfaces design.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub playback: PlaybackConfig,
    pub ui: UiConfig,
    pub paths: PathsConfig,
    pub performance: PerformanceConfig,
    pub cache: CacheConfig,
    pub keybinds: std::collections::BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Initial volume, 0..=100.
    pub default_volume: u8,
    pub shuffle: bool,
    pub repeat: RepeatMode,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            default_volume: 50,
            shuffle: false,
            repeat: RepeatMode::All,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub enable_album_art: bool,
    pub album_grid_columns: u32,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            enable_album_art: true,
            album_grid_columns: 4,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root directory to scan (singular, matches the distilled schema).
    pub music_directory: Option<PathBuf>,
    /// Additional roots, for multi-directory libraries.
    #[serde(default)]
    pub music_directories: Vec<PathBuf>,
}

impl PathsConfig {
    /// All configured roots, deduplicating directories that are strict
    /// prefixes of one another (see DESIGN.md Open Questions).
    pub fn all_roots(&self) -> Vec<PathBuf> {
        let mut roots: Vec<PathBuf> = self.music_directory.iter().cloned().collect();
        roots.extend(self.music_directories.iter().cloned());
        if roots.is_empty() {
            if let Some(default) = dirs::audio_dir() {
                roots.push(default);
            }
        }
        crate::library::dedup_directories(roots)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// ArtworkWindow byte budget, in megabytes.
    pub artwork_memory_limit_mb: u64,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            artwork_memory_limit_mb: 3072,
        }
    }
}

/// Cache-location overrides, supplementing the distilled config schema
/// (`original_source/include/backend/Config.hpp` carries cache-dir
/// overrides that the distillation dropped).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub library_cache_path: Option<PathBuf>,
    pub artwork_cache_path: Option<PathBuf>,
}

impl CacheConfig {
    pub fn library_cache_path(&self) -> PathBuf {
        self.library_cache_path
            .clone()
            .unwrap_or_else(|| cache_dir().join("library.bin"))
    }

    pub fn artwork_cache_path(&self) -> PathBuf {
        self.artwork_cache_path
            .clone()
            .unwrap_or_else(|| cache_dir().join("artwork.cache"))
    }
}

/// Get the config directory path.
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("ouroboros"))
}

/// Get the full path to the config file.
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Get the cache directory path (`ouroboros/` under the user cache root).
pub fn cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("ouroboros")
}

/// Load configuration from disk.
///
/// Returns the default config if the file doesn't exist or can't be
/// parsed — malformed config is never fatal, only logged.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        tracing::warn!("could not determine config directory, using defaults");
        return Config::default();
    };

    if !path.exists() {
        tracing::info!(?path, "no config file found, using defaults");
        return Config::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => {
                tracing::info!(?path, "loaded config");
                config
            }
            Err(e) => {
                tracing::error!(?path, error = %e, "failed to parse config file, using defaults");
                Config::default()
            }
        },
        Err(e) => {
            tracing::error!(?path, error = %e, "failed to read config file, using defaults");
            Config::default()
        }
    }
}

/// Save configuration to disk, writing atomically via a temp file + rename.
pub fn save(config: &Config) -> crate::error::Result<()> {
    let dir = config_dir().ok_or_else(|| {
        crate::error::Error::config_parse("could not determine config directory")
    })?;
    std::fs::create_dir_all(&dir)?;

    let path = dir.join("config.toml");
    let contents = toml::to_string_pretty(config)
        .map_err(|e| crate::error::Error::config_parse(e.to_string()))?;

    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents)?;
    std::fs::rename(&temp_path, &path)?;

    tracing::info!(?path, "saved config");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[playback]"));
        assert!(toml.contains("[ui]"));
        assert!(toml.contains("[paths]"));
        assert!(toml.contains("[performance]"));
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.playback.default_volume = 75;
        config.paths.music_directories.push(PathBuf::from("/music"));

        let toml = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();

        assert_eq!(parsed.playback.default_volume, 75);
        assert_eq!(
            parsed.paths.music_directories,
            vec![PathBuf::from("/music")]
        );
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let toml = r#"
[playback]
default_volume = 40
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.playback.default_volume, 40);
        assert_eq!(config.playback.repeat, RepeatMode::All);
        assert!(config.ui.enable_album_art);
        assert_eq!(config.ui.album_grid_columns, 4);
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let toml = r#"
[playback]
default_volume = 20
nonsense_key = "ignored"

[made_up_section]
foo = "bar"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.playback.default_volume, 20);
    }

    #[test]
    fn test_cache_path_defaults() {
        let cache = CacheConfig::default();
        assert!(cache.library_cache_path().ends_with("library.bin"));
        assert!(cache.artwork_cache_path().ends_with("artwork.cache"));
    }
}
