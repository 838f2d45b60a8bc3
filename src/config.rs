use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Overrides `data_directory` when set, either in the environment or in `.env`.
pub const DATA_DIRECTORY_ENV: &str = "PROJECT_DATA_DIRECTORY";

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Base directory for relative paths. Relative values are taken from the
    /// process working directory.
    pub data_directory: PathBuf,
    /// Whether paths passed with `use_data_dir = false` may leave the base directory.
    pub allow_external_paths: bool,
    pub max_versions_per_file: usize,
    pub max_versioned_files: usize,
    pub max_tracked_directories: usize,
    pub max_watch_events: usize,
    pub hash_chunk_size: usize,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_directory: PathBuf::from("."),
            allow_external_paths: true,
            max_versions_per_file: 50,
            max_versioned_files: 256,
            max_tracked_directories: 64,
            max_watch_events: 10_000,
            hash_chunk_size: 8192,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Applies `PROJECT_DATA_DIRECTORY`, loading a `.env` file from the
    /// working directory first if one exists.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }
        if let Some(dir) = std::env::var_os(DATA_DIRECTORY_ENV).filter(|dir| !dir.is_empty()) {
            self.data_directory = PathBuf::from(dir);
        }
    }

    // Zero limits would make every store useless, so they fall back to defaults.
    fn fill_missing(mut self) -> Self {
        let defaults = Config::default();
        if self.data_directory.as_os_str().is_empty() {
            self.data_directory = defaults.data_directory;
        }
        if self.max_versions_per_file == 0 {
            self.max_versions_per_file = defaults.max_versions_per_file;
        }
        if self.max_versioned_files == 0 {
            self.max_versioned_files = defaults.max_versioned_files;
        }
        if self.max_tracked_directories == 0 {
            self.max_tracked_directories = defaults.max_tracked_directories;
        }
        if self.max_watch_events == 0 {
            self.max_watch_events = defaults.max_watch_events;
        }
        if self.hash_chunk_size == 0 {
            self.hash_chunk_size = defaults.hash_chunk_size;
        }
        if self.log_level.is_empty() {
            self.log_level = defaults.log_level;
        }
        self
    }
}

/// Loads the config from the XDG config directory, creating it with defaults
/// on first run.
pub fn load_or_create() -> Result<Config> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("filehand");
    let config_path = xdg_dirs
        .place_config_file("config.toml")
        .context("Failed to create config directory")?;
    load_from(&config_path)
}

/// Loads the config at `config_path`. A missing file is created with the
/// defaults; an existing one is rewritten when fields had to be filled in so
/// that all options stay visible.
pub fn load_from(config_path: &Path) -> Result<Config> {
    if !config_path.exists() {
        let default_config = Config::default();
        let toml_string = toml::to_string_pretty(&default_config)?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(config_path, toml_string)
            .with_context(|| format!("Failed to write {}", config_path.display()))?;

        eprintln!("Created default config at: {}", config_path.display());
        return Ok(default_config);
    }

    let config_string = fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read {}", config_path.display()))?;
    let config: Config = toml::from_str(&config_string)
        .with_context(|| format!("Invalid config file {}", config_path.display()))?;
    let final_config = config.fill_missing();

    let final_toml_string = toml::to_string_pretty(&final_config)?;
    if final_toml_string != config_string {
        fs::write(config_path, final_toml_string)?;
    }

    Ok(final_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::Builder;

    #[test]
    fn test_load_from_creates_defaults() {
        let tmp_dir = Builder::new().prefix("test-config-").tempdir().unwrap();
        let path = tmp_dir.path().join("nested/config.toml");

        let config = load_from(&path).unwrap();
        assert_eq!(config, Config::default());
        assert!(path.exists());
    }

    #[test]
    fn test_load_from_fills_missing_fields() {
        let tmp_dir = Builder::new().prefix("test-config-").tempdir().unwrap();
        let path = tmp_dir.path().join("config.toml");
        fs::write(&path, "max_versions_per_file = 3\nhash_chunk_size = 0\n").unwrap();

        let config = load_from(&path).unwrap();
        assert_eq!(config.max_versions_per_file, 3);
        assert_eq!(config.hash_chunk_size, 8192);
        assert!(config.allow_external_paths);

        let rewritten = fs::read_to_string(&path).unwrap();
        assert!(rewritten.contains("max_watch_events = 10000"));
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let tmp_dir = Builder::new().prefix("test-config-").tempdir().unwrap();
        let path = tmp_dir.path().join("config.toml");
        fs::write(&path, "max_versions_per_file = \"many\"").unwrap();
        assert!(load_from(&path).is_err());
    }
}
