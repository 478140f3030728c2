//! Command line flags. Anything given here overrides `config.toml`.

use std::path::PathBuf;

use clap::{ArgAction, Parser};

use crate::engine::{AppConfig, HashAlgorithm};
use crate::gelbooru::ScanMode;

#[derive(Debug, Parser)]
#[command(name = "gelbooru_downloader")]
#[command(version, about = "Bulk image downloader for Gelbooru", long_about = None)]
pub struct Cli {
    /// Directory holding config.toml.
    #[arg(long, default_value = ".", value_name = "DIR")]
    pub config_dir: PathBuf,

    /// Search tags, space separated (e.g. "blue_sky rating:general").
    #[arg(short, long)]
    pub tags: Option<String>,

    /// Maximum number of images to download.
    #[arg(short = 'n', long, value_name = "N")]
    pub max_images: Option<usize>,

    /// Directory the images and tag files are saved to.
    #[arg(short = 'd', long, value_name = "DIR")]
    pub download_dir: Option<String>,

    /// Concurrent downloads.
    #[arg(short = 'w', long, value_name = "N")]
    pub max_workers: Option<usize>,

    /// Posts per API page (1-100).
    #[arg(short, long, value_name = "N")]
    pub unit: Option<usize>,

    /// Per-request timeout in seconds, 0 for none.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Digest compared against the hash the API reports for each post.
    #[arg(long, value_enum)]
    pub hash: Option<HashAlgorithm>,

    /// Join tags with ", " instead of " ". Pass `=false` to turn off.
    #[arg(long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true", action = ArgAction::Set)]
    pub add_comma: Option<bool>,

    /// Replace "_" with spaces in tags. Pass `=false` to turn off.
    #[arg(long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true", action = ArgAction::Set)]
    pub remove_underscore: Option<bool>,

    /// Escape parentheses in tags. Pass `=false` to turn off.
    #[arg(long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true", action = ArgAction::Set)]
    pub use_escape: Option<bool>,

    /// Check the downloaded images afterwards.
    #[arg(long, value_enum)]
    pub check_images: Option<ScanMode>,

    /// Log filter, e.g. "debug" or "gelbooru_downloader=trace". RUST_LOG wins.
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Hide the progress bar.
    #[arg(long)]
    pub no_progress: bool,
}

impl Cli {
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(tags) = &self.tags {
            config.query.tags = tags.clone();
        }
        if let Some(max_images) = self.max_images {
            config.query.max_images = max_images;
        }
        if let Some(unit) = self.unit {
            config.query.unit = unit;
        }
        if let Some(dir) = &self.download_dir {
            config.download.directory = dir.clone();
        }
        if let Some(workers) = self.max_workers {
            config.download.max_workers = workers;
        }
        if let Some(timeout) = self.timeout {
            config.download.timeout_secs = timeout;
        }
        if let Some(hash) = self.hash {
            config.download.hash_algorithm = hash;
        }
        if self.no_progress {
            config.download.show_progress = false;
        }

        if let Some(add_comma) = self.add_comma {
            config.tags.add_comma = add_comma;
        }
        if let Some(remove_underscore) = self.remove_underscore {
            config.tags.remove_underscore = remove_underscore;
        }
        if let Some(use_escape) = self.use_escape {
            config.tags.use_escape = use_escape;
        }

        if let Some(mode) = self.check_images {
            config.check.mode = Some(mode);
        }
        if let Some(level) = &self.log_level {
            config.logging.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_flags_leave_config_alone() {
        let cli = Cli::try_parse_from(["gelbooru_downloader"]).unwrap();
        let mut config = AppConfig::default();
        cli.apply(&mut config);
        assert_eq!(config, AppConfig::default());
        assert_eq!(cli.config_dir, PathBuf::from("."));
    }

    #[test]
    fn flags_override_config() {
        let cli = Cli::try_parse_from([
            "gelbooru_downloader",
            "--tags",
            "cat ears",
            "-n",
            "120",
            "-w",
            "4",
            "--timeout",
            "0",
            "--hash",
            "blake3",
            "--add-comma",
            "--check-images",
            "repair",
            "--no-progress",
        ])
        .unwrap();

        let mut config = AppConfig::default();
        cli.apply(&mut config);
        assert_eq!(config.query.tags, "cat ears");
        assert_eq!(config.query.max_images, 120);
        assert_eq!(config.download.max_workers, 4);
        assert_eq!(config.request_timeout(), None);
        assert_eq!(config.download.hash_algorithm, HashAlgorithm::Blake3);
        assert!(config.tags.add_comma);
        assert!(!config.tags.use_escape);
        assert_eq!(config.check.mode, Some(ScanMode::Repair));
        assert!(!config.download.show_progress);
    }

    #[test]
    fn tag_options_can_be_switched_off() {
        let cli = Cli::try_parse_from([
            "gelbooru_downloader",
            "--add-comma=false",
            "--use-escape",
            "false",
        ])
        .unwrap();

        let mut config = AppConfig::default();
        config.tags.add_comma = true;
        config.tags.remove_underscore = true;
        config.tags.use_escape = true;
        cli.apply(&mut config);

        assert!(!config.tags.add_comma);
        assert!(!config.tags.use_escape);
        // Not given, so the file's value stands.
        assert!(config.tags.remove_underscore);
    }

    #[test]
    fn unknown_scan_mode_is_rejected() {
        assert!(Cli::try_parse_from(["gelbooru_downloader", "--check-images", "fix"]).is_err());
    }
}
