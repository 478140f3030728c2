//! Integrity scanner for a download directory
//!
//! Fully decodes every image directly inside the directory on a rayon pool,
//! then optionally repairs or deletes the ones that fail.

use std::path::{Path, PathBuf};

use clap::ValueEnum;
use image::{DynamicImage, ImageFormat, ImageReader};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Error types for the scanner
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Directory not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to build scan thread pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Result type for scan operations
pub type ScanResult<T> = Result<T, ScanError>;

/// What to do with images that fail to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    /// Report only
    Inspect,
    /// Re-decode with the sniffed format and re-encode in place
    Repair,
    /// Remove unreadable files
    Delete,
}

#[derive(Debug, Default)]
pub struct ScanReport {
    pub scanned: usize,
    /// Files that failed to decode, with the decoder's message.
    pub unreadable: Vec<(PathBuf, String)>,
    pub repaired: Vec<PathBuf>,
    pub deleted: Vec<PathBuf>,
    /// Repairs or deletions that did not go through.
    pub failed: Vec<(PathBuf, String)>,
}

impl ScanReport {
    pub fn print(&self, mode: ScanMode) {
        println!(
            "Checked {} images, {} could not be read",
            self.scanned,
            self.unreadable.len()
        );
        match mode {
            ScanMode::Inspect => {}
            ScanMode::Repair => println!(
                "Tried to repair {} images: {} repaired, {} failed",
                self.unreadable.len(),
                self.repaired.len(),
                self.failed.len()
            ),
            ScanMode::Delete => println!(
                "Tried to delete {} images: {} deleted, {} failed",
                self.unreadable.len(),
                self.deleted.len(),
                self.failed.len()
            ),
        }
    }
}

/// Image files directly inside `dir`, by extension.
pub fn find_images(dir: &Path) -> ScanResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(ScanError::NotFound(dir.to_path_buf()));
    }

    let mut images = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let known = ImageFormat::from_path(entry.path())
            .map(|format| format.reading_enabled())
            .unwrap_or(false);
        if known {
            images.push(entry.into_path());
        }
    }
    images.sort();
    Ok(images)
}

fn try_read(path: &Path) -> Result<(), String> {
    ImageReader::open(path)
        .map_err(|e| e.to_string())?
        .decode()
        .map(|_| ())
        .map_err(|e| e.to_string())
}

fn try_repair(path: &Path) -> Result<(), String> {
    let image = ImageReader::open(path)
        .map_err(|e| e.to_string())?
        .with_guessed_format()
        .map_err(|e| e.to_string())?
        .decode()
        .map_err(|e| e.to_string())?;

    // JPEG has no alpha channel.
    let image = match ImageFormat::from_path(path) {
        Ok(ImageFormat::Jpeg) => DynamicImage::ImageRgb8(image.to_rgb8()),
        _ => image,
    };
    image.save(path).map_err(|e| e.to_string())
}

/// Scans `dir` with `workers` threads, 0 meaning one per CPU.
pub fn scan_images(dir: &Path, mode: ScanMode, workers: usize) -> ScanResult<ScanReport> {
    let images = find_images(dir)?;
    let workers = if workers == 0 { num_cpus::get() } else { workers };
    let pool = rayon::ThreadPoolBuilder::new().num_threads(workers).build()?;
    info!("Checking {} images in {} with {} threads", images.len(), dir.display(), workers);

    let unreadable: Vec<(PathBuf, String)> = pool.install(|| {
        images
            .par_iter()
            .filter_map(|path| try_read(path).err().map(|e| (path.clone(), e)))
            .collect()
    });
    for (path, e) in &unreadable {
        debug!("{} could not be read: {}", path.display(), e);
    }

    let mut report = ScanReport {
        scanned: images.len(),
        unreadable,
        ..ScanReport::default()
    };

    match mode {
        ScanMode::Inspect => {}
        ScanMode::Repair => {
            let results: Vec<(PathBuf, Result<(), String>)> = pool.install(|| {
                report
                    .unreadable
                    .par_iter()
                    .map(|(path, _)| (path.clone(), try_repair(path)))
                    .collect()
            });
            for (path, result) in results {
                match result {
                    Ok(()) => {
                        debug!("{} repaired", path.display());
                        report.repaired.push(path);
                    }
                    Err(e) => {
                        debug!("{} could not be repaired: {}", path.display(), e);
                        report.failed.push((path, e));
                    }
                }
            }
        }
        ScanMode::Delete => {
            for (path, _) in &report.unreadable {
                match std::fs::remove_file(path) {
                    Ok(()) => {
                        debug!("{} deleted", path.display());
                        report.deleted.push(path.clone());
                    }
                    Err(e) => {
                        warn!("Failed to delete {}: {}", path.display(), e);
                        report.failed.push((path.clone(), e.to_string()));
                    }
                }
            }
        }
    }

    Ok(report)
}
