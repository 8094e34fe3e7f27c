//! Mount configuration: CLI-derived paths plus optional JSON settings.

use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

static SETTINGS_FILE_NAME: &str = "settings.json";

fn default_attr_ttl_secs() -> u64 {
    1
}

/// Mount knobs read from `settings.json`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct MountSettings {
    /// Name shown in the mount table; defaults to the source path
    pub fsname: Option<String>,
    pub allow_other: bool,
    pub allow_root: bool,
    pub default_permissions: bool,
    pub auto_unmount: bool,
    #[serde(default = "default_attr_ttl_secs")]
    pub attr_ttl_secs: u64,
}

impl Default for MountSettings {
    fn default() -> Self {
        Self {
            fsname: None,
            allow_other: false,
            allow_root: false,
            default_permissions: false,
            auto_unmount: false,
            attr_ttl_secs: default_attr_ttl_secs(),
        }
    }
}

impl MountSettings {
    /// Load from `explicit` if given, otherwise from the per-user config dir.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_settings_from_file(path);
        }

        let Some(path) = Self::default_path() else {
            warn!("Could not determine config directory - using default settings");
            return Ok(Self::default());
        };
        if !path.exists() {
            warn!(
                "Settings file {} not found - using default settings",
                path.display()
            );
            return Ok(Self::default());
        }
        Self::load_settings_from_file(&path)
    }

    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "bindfs", "bindfs")
            .map(|dirs| dirs.config_dir().join(SETTINGS_FILE_NAME))
    }

    pub fn load_settings_from_file(config_file_path: &Path) -> Result<Self> {
        let data = fs::read_to_string(config_file_path).with_context(|| {
            format!("Failed to read settings from {}", config_file_path.display())
        })?;
        let settings: Self = serde_json::from_str(&data).with_context(|| {
            format!("Failed to parse settings in {}", config_file_path.display())
        })?;
        info!("Loaded settings from {}", config_file_path.display());
        Ok(settings)
    }

    pub fn attr_ttl(&self) -> Duration {
        Duration::from_secs(self.attr_ttl_secs)
    }
}

/// Everything the launcher needs to mount.
#[derive(Debug, Clone)]
pub struct MountConfig {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub foreground: bool,
    pub settings: MountSettings,
}

impl MountConfig {
    /// Canonicalise both paths; each must be an existing directory.
    pub fn new(
        source: impl AsRef<Path>,
        destination: impl AsRef<Path>,
        foreground: bool,
        settings: MountSettings,
    ) -> Result<Self> {
        Ok(Self {
            source: existing_dir(source.as_ref(), "Source")?,
            destination: existing_dir(destination.as_ref(), "Mount point")?,
            foreground,
            settings,
        })
    }

    /// Source and destination are the same directory.
    pub fn is_self_bind(&self) -> bool {
        self.source == self.destination
    }

    pub fn fsname(&self) -> String {
        self.settings
            .fsname
            .clone()
            .unwrap_or_else(|| self.source.display().to_string())
    }
}

fn existing_dir(path: &Path, what: &str) -> Result<PathBuf> {
    let real = fs::canonicalize(path)
        .with_context(|| format!("{} does not exist: {}", what, path.display()))?;
    if !real.is_dir() {
        return Err(anyhow!("{} is not a directory: {}", what, real.display()));
    }
    Ok(real)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_settings_default() {
        let settings = MountSettings::default();
        assert_eq!(settings.attr_ttl(), Duration::from_secs(1));
        assert!(!settings.allow_other);
        assert!(settings.fsname.is_none());
    }

    #[test]
    fn test_partial_settings_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(SETTINGS_FILE_NAME);
        fs::write(&path, r#"{ "allow_other": true }"#).unwrap();

        let settings = MountSettings::load(Some(&path)).unwrap();
        assert!(settings.allow_other);
        assert_eq!(settings.attr_ttl_secs, 1);
    }

    #[test]
    fn test_explicit_settings_errors() {
        let temp_dir = TempDir::new().unwrap();
        assert!(MountSettings::load(Some(&temp_dir.path().join("missing.json"))).is_err());

        let path = temp_dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(MountSettings::load(Some(&path)).is_err());
    }

    #[test]
    fn test_mount_config_canonicalises() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("src");
        fs::create_dir(&src).unwrap();

        let config = MountConfig::new(
            src.join("..").join("src"),
            &src,
            true,
            MountSettings::default(),
        )
        .unwrap();
        assert_eq!(config.source, fs::canonicalize(&src).unwrap());
        assert!(config.is_self_bind());
        assert_eq!(config.fsname(), config.source.display().to_string());
    }

    #[test]
    fn test_mount_config_rejects_files_and_missing_paths() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("file");
        fs::write(&file, b"x").unwrap();

        let settings = MountSettings::default();
        assert!(MountConfig::new(&file, temp_dir.path(), true, settings.clone()).is_err());
        assert!(
            MountConfig::new(temp_dir.path().join("nope"), temp_dir.path(), true, settings)
                .is_err()
        );
    }
}
