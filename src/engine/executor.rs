//! Worker pool orchestrator
//!
//! Spawns one unit download per work item, lets the admission pool bound how
//! many run at once, and drains completions in the order they finish. Every
//! completion feeds the round tally and the throughput estimator. A failure of
//! the draining loop itself aborts every outstanding task before returning.

use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::pin::pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use reqwest::Client;
use thiserror::Error;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::engine::downloader::{DownloadError, DownloadResult, Downloader, Outcome, WorkItem};
use crate::engine::hasher::HashAlgorithm;
use crate::engine::tally::RunTally;
use crate::engine::throughput::{ThroughputEstimator, bytes_to_mb};
use crate::engine::ticket::TicketPool;

/// Round-fatal errors. Per-item failures never show up here.
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Round interrupted; {0} outstanding tasks cancelled")]
    Interrupted(usize),

    #[error("Admission pool closed; {0} outstanding tasks cancelled")]
    PoolClosed(usize),
}

/// Result type for executor operations
pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// Executor configuration
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub max_workers: usize,
    pub timeout: Option<Duration>,
    pub hash_algorithm: HashAlgorithm,
    pub show_progress: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_workers: 10,
            timeout: Some(Duration::from_secs(10)),
            hash_algorithm: HashAlgorithm::Md5,
            show_progress: true,
        }
    }
}

type Completion = (u64, DownloadResult<Outcome>);

/// Bookkeeping owned by the draining loop of one round.
struct RoundState {
    tally: RunTally,
    total_bytes: u64,
    origin: Instant,
    estimator: ThroughputEstimator,
    bar: ProgressBar,
}

impl RoundState {
    fn new(total: usize, window: usize, bar: ProgressBar) -> Self {
        Self {
            tally: RunTally::with_total(total),
            total_bytes: 0,
            origin: Instant::now(),
            estimator: ThroughputEstimator::new(window, 0, 0.0),
            bar,
        }
    }

    fn mark_dispatched(&mut self) {
        let now = self.origin.elapsed().as_secs_f64();
        self.estimator.reset_baseline(None, Some(now));
    }

    /// Folds one completion in. Breaks when the admission pool was closed.
    fn settle(&mut self, joined: Result<Completion, JoinError>) -> ControlFlow<()> {
        match joined {
            Ok((_, Ok(outcome))) => {
                self.tally.record(outcome.kind);
                self.total_bytes += outcome.bytes;
                let at = outcome.finished_at.saturating_duration_since(self.origin).as_secs_f64();
                self.estimator.update(self.total_bytes, at);

                if let Some(speed) = self.estimator.speed() {
                    let message = format!(
                        "current: {:.2}MB/s, average: {:.2}MB/s, total: {:.2}MB",
                        speed.instantaneous_mb(),
                        speed.average_mb(),
                        bytes_to_mb(self.total_bytes as f64)
                    );
                    debug!("{} -> {:?}; {}", outcome.path.display(), outcome.kind, message);
                    self.bar.set_message(message);
                }
            }
            Ok((_, Err(DownloadError::PoolClosed))) => return ControlFlow::Break(()),
            Ok((id, Err(e))) => {
                self.tally.record_error();
                error!("Task for post {} failed: {}", id, e);
            }
            Err(e) => {
                self.tally.record_error();
                error!("Download task did not complete: {}", e);
            }
        }
        self.bar.inc(1);
        ControlFlow::Continue(())
    }
}

/// Runs rounds of downloads against a caller-owned HTTP client.
pub struct Executor {
    client: Client,
    config: ExecutorConfig,
}

impl Executor {
    pub fn new(client: Client, config: ExecutorConfig) -> Self {
        Self { client, config }
    }

    /// Download every item of one round into `target_dir`.
    ///
    /// Resolves when all items have settled, or with an error as soon as
    /// `shutdown` completes (all outstanding work is cancelled first).
    pub async fn run<S>(
        &self,
        items: Vec<WorkItem>,
        target_dir: &Path,
        shutdown: S,
    ) -> ExecutorResult<RunTally>
    where
        S: Future<Output = ()>,
    {
        let tickets = TicketPool::new(self.config.max_workers);
        self.run_with_pool(items, target_dir, tickets, shutdown).await
    }

    #[instrument(skip_all, fields(round_id = %Uuid::new_v4(), items = items.len(), max_workers = tickets.capacity()))]
    pub async fn run_with_pool<S>(
        &self,
        items: Vec<WorkItem>,
        target_dir: &Path,
        tickets: Arc<TicketPool>,
        shutdown: S,
    ) -> ExecutorResult<RunTally>
    where
        S: Future<Output = ()>,
    {
        let total = items.len();
        if total == 0 {
            return Ok(RunTally::with_total(0));
        }

        let downloader = Downloader::new(
            self.client.clone(),
            Arc::clone(&tickets),
            self.config.timeout,
            self.config.hash_algorithm,
        );
        let target_dir: Arc<PathBuf> = Arc::new(target_dir.to_path_buf());

        // Window matches the pool size: that many completions can land together.
        let mut round = RoundState::new(total, tickets.capacity(), self.progress_bar(total as u64));

        let mut tasks: JoinSet<Completion> = JoinSet::new();
        for item in items {
            let downloader = downloader.clone();
            let target_dir = Arc::clone(&target_dir);
            tasks.spawn(async move {
                let result = downloader.download(&target_dir, &item).await;
                (item.id, result)
            });
        }
        round.mark_dispatched();
        info!("Dispatched {} download tasks", total);

        let mut shutdown = pin!(shutdown);

        let drained: ExecutorResult<()> = loop {
            let next = tokio::select! {
                biased;
                _ = &mut shutdown => break Err(ExecutorError::Interrupted(tasks.len())),
                next = tasks.join_next() => next,
            };
            let Some(joined) = next else {
                break Ok(());
            };

            if round.settle(joined).is_break() {
                break Err(ExecutorError::PoolClosed(tasks.len()));
            }
        };

        if let Err(e) = drained {
            warn!("Cancelling round: {}", e);
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
            round.bar.abandon_with_message("cancelled");
            return Err(e);
        }

        round.bar.finish();
        let tally = round.tally;
        info!(
            total = tally.total,
            success = tally.success,
            duplicate = tally.duplicate,
            error = tally.error,
            bytes = round.total_bytes,
            "Round finished"
        );
        if self.config.show_progress {
            println!("Round finished\n{}", tally);
        }

        Ok(tally)
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }

        let progress_style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");

        let progress = ProgressBar::new(len);
        progress.set_style(progress_style);
        progress.set_draw_target(ProgressDrawTarget::stderr_with_hz(5));
        progress
    }
}
