//! Download engine
//! Hashing, admission, unit downloads, the worker pool and run accounting

pub mod config_loader;
pub mod downloader;
pub mod executor;
pub mod hasher;
pub mod logger;
pub mod tally;
pub mod throughput;
pub mod ticket;

#[cfg(test)]
pub(crate) mod test_server;

// Re-export commonly used types for convenience
pub use config_loader::{AppConfig, load_app_config};

pub use downloader::WorkItem;

pub use executor::{Executor, ExecutorConfig, ExecutorError};

pub use hasher::HashAlgorithm;

pub use logger::init_logger;

pub use tally::RunAggregator;
