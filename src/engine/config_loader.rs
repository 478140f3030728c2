use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::hasher::HashAlgorithm;
use crate::gelbooru::{ScanMode, TagStyle};

// Define error types for config loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(String),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

// Result type alias for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Name of the config file looked up in the config directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

// Config structs for config.toml
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Api {
    pub base_url: String,
    /// Optional credentials, sent as `api_key` / `user_id` query params.
    pub api_key: Option<String>,
    pub user_id: Option<String>,
    pub user_agent: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Query {
    pub tags: String,
    pub max_images: usize,
    /// Posts requested per page, clamped to 1..=100.
    pub unit: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Download {
    pub directory: String,
    pub max_workers: usize,
    /// Per-request timeout. 0 disables it.
    pub timeout_secs: u64,
    pub hash_algorithm: HashAlgorithm,
    pub show_progress: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Tags {
    pub add_comma: bool,
    pub remove_underscore: bool,
    pub use_escape: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Pacing {
    pub countdown_secs: u64,
    pub round_pause_ms: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Logging {
    pub log_level: String,
    pub log_format: String,
    pub log_directory: String,
    pub log_to_file: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Check {
    /// `None` skips the scan after downloading.
    pub mode: Option<ScanMode>,
    /// 0 means one worker per CPU.
    pub workers: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AppConfig {
    pub api: Api,
    pub query: Query,
    pub download: Download,
    pub tags: Tags,
    pub pacing: Pacing,
    pub logging: Logging,
    pub check: Check,
}

// Default implementation for AppConfig
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api: Api {
                base_url: "https://gelbooru.com/index.php".to_string(),
                api_key: None,
                user_id: None,
                user_agent: format!("gelbooru_downloader/{}", env!("CARGO_PKG_VERSION")),
            },
            query: Query {
                tags: "girl".to_string(),
                max_images: 50,
                unit: 50,
            },
            download: Download {
                directory: "./images".to_string(),
                max_workers: 15,
                timeout_secs: 10,
                hash_algorithm: HashAlgorithm::Md5,
                show_progress: true,
            },
            tags: Tags {
                add_comma: false,
                remove_underscore: false,
                use_escape: false,
            },
            pacing: Pacing {
                countdown_secs: 3,
                round_pause_ms: 500,
            },
            logging: Logging {
                log_level: "info".to_string(),
                log_format: "text".to_string(),
                log_directory: "./logs".to_string(),
                log_to_file: true,
            },
            check: Check {
                mode: None,
                workers: 0,
            },
        }
    }
}

impl AppConfig {
    /// Checks the values that would otherwise stall or misbehave at runtime.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.download.max_workers == 0 {
            return Err(ConfigError::Invalid(
                "download.max_workers must be at least 1".to_string(),
            ));
        }
        if self.query.tags.trim().is_empty() {
            return Err(ConfigError::Invalid("query.tags must not be empty".to_string()));
        }
        if !matches!(self.logging.log_format.as_str(), "text" | "json") {
            return Err(ConfigError::Invalid(format!(
                "logging.log_format must be text or json, got \"{}\"",
                self.logging.log_format
            )));
        }
        Ok(())
    }

    /// `None` when the timeout is disabled.
    pub fn request_timeout(&self) -> Option<Duration> {
        match self.download.timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn download_dir(&self) -> PathBuf {
        PathBuf::from(&self.download.directory)
    }

    pub fn tag_style(&self) -> TagStyle {
        TagStyle {
            add_comma: self.tags.add_comma,
            remove_underscore: self.tags.remove_underscore,
            use_escape: self.tags.use_escape,
        }
    }
}

// Load app config from config.toml, writing the defaults if it is missing
pub fn load_app_config(config_dir: &Path) -> ConfigResult<AppConfig> {
    let config_path = config_dir.join(CONFIG_FILE_NAME);

    if !config_path.exists() {
        log::warn!("Config file not found: {}", config_path.display());
        let default_config = AppConfig::default();
        if let Err(e) = save_app_config(config_dir, &default_config) {
            log::warn!("Failed to write default config: {}", e);
        } else {
            log::info!("Created {} with default values", config_path.display());
        }
        return Ok(default_config);
    }

    let content = fs::read_to_string(&config_path)?;
    match toml::from_str(&content) {
        Ok(config) => Ok(config),
        Err(e) => {
            log::error!("Failed to parse {}: {}", CONFIG_FILE_NAME, e);
            log::info!("Backing up old config and creating new one with default values");

            // Backup the old config file
            if let Err(backup_err) = fs::rename(&config_path, config_path.with_extension("toml.backup")) {
                log::warn!("Failed to backup old config: {}", backup_err);
            }

            let default_config = AppConfig::default();
            if let Err(write_err) = save_app_config(config_dir, &default_config) {
                log::error!("Failed to write new config file: {}", write_err);
            }

            Ok(default_config)
        }
    }
}

// Save app config to file
pub fn save_app_config(config_dir: &Path, config: &AppConfig) -> ConfigResult<()> {
    if !config_dir.exists() {
        fs::create_dir_all(config_dir)?;
    }
    let toml_string = toml::to_string_pretty(config)
        .map_err(|e| ConfigError::TomlSer(e.to_string()))?;
    fs::write(config_dir.join(CONFIG_FILE_NAME), toml_string)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = AppConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_app_config(dir.path()).unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(dir.path().join(CONFIG_FILE_NAME).exists());
    }

    #[test]
    fn corrupt_file_is_backed_up() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE_NAME), "this is = = not toml").unwrap();

        let config = load_app_config(dir.path()).unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(dir.path().join("config.toml.backup").exists());
    }

    #[test]
    fn scan_mode_parses_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.check.mode = Some(ScanMode::Delete);
        config.download.max_workers = 4;
        save_app_config(dir.path(), &config).unwrap();

        let loaded = load_app_config(dir.path()).unwrap();
        assert_eq!(loaded.check.mode, Some(ScanMode::Delete));
        assert_eq!(loaded.download.max_workers, 4);
    }

    #[test]
    fn zero_workers_is_rejected() {
        let mut config = AppConfig::default();
        config.download.max_workers = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn zero_timeout_disables_it() {
        let mut config = AppConfig::default();
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(10)));
        config.download.timeout_secs = 0;
        assert_eq!(config.request_timeout(), None);
    }
}
