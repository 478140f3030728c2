use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Error};
use console::{Term, style};
use reqwest::Client;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{error, info, trace, warn};

use crate::engine::{AppConfig, Executor, ExecutorConfig, ExecutorError, RunAggregator};
use crate::gelbooru::{ApiConfig, GelbooruClient, plan_rounds, process_tags, scan_images};

/// The name of the cargo package.
const NAME: &str = env!("CARGO_PKG_NAME");

/// The version of the cargo package.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The authors who created the package.
const AUTHORS: &str = env!("CARGO_PKG_AUTHORS");

/// Resolves once Ctrl-C has been pressed. Never resolves if the handler
/// could not be installed.
async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Drives a whole run: probe, plan, download round by round, summarize, scan.
pub(crate) struct Program {
    config: AppConfig,
    shutdown: watch::Receiver<bool>,
}

impl Program {
    pub(crate) fn new(config: AppConfig) -> Self {
        let (stop, shutdown) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling downloads...");
                let _ = stop.send(true);
            }
        });

        Self { config, shutdown }
    }

    fn build_client(&self) -> Result<Client, Error> {
        let mut builder = Client::builder()
            .user_agent(&self.config.api.user_agent)
            .pool_max_idle_per_host(self.config.download.max_workers)
            .tcp_keepalive(Duration::from_secs(60));
        if let Some(timeout) = self.config.request_timeout() {
            builder = builder.connect_timeout(timeout);
        }
        builder.build().context("Failed to build HTTP client")
    }

    fn interrupted(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Sleeps for `duration`, returning `false` early if interrupted.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = sleep(duration) => true,
            _ = wait_for_shutdown(self.shutdown.clone()) => false,
        }
    }

    /// Runs the downloader program.
    pub(crate) async fn run(&self) -> Result<(), Error> {
        Term::stdout().set_title("gelbooru downloader");
        trace!("Starting gelbooru downloader...");
        trace!("Program Name: {}", NAME);
        trace!("Program Version: {}", VERSION);
        trace!("Program Authors: {}", AUTHORS);

        let config = &self.config;
        let tags = config.query.tags.as_str();
        let client = self.build_client()?;
        let api = GelbooruClient::new(client.clone(), ApiConfig::from(&config.api));

        println!("Open this link to check the results: {}", api.show_url(tags)?);

        let count = api
            .probe(tags)
            .await
            .context("Could not read the post count from the API")?;
        if count == 0 {
            println!("No images found, check the tags");
            return Ok(());
        }

        let plan = plan_rounds(count, config.query.max_images, config.query.unit);
        println!("Found {} images", count);
        println!(
            "Requested {} images, downloading in {} rounds",
            config.query.max_images, plan.rounds
        );
        println!("Download starts in {} seconds", config.pacing.countdown_secs);
        for remaining in (1..=config.pacing.countdown_secs).rev() {
            println!("{}", remaining);
            if !self.pause(Duration::from_secs(1)).await {
                info!("Interrupted before downloading started");
                return Ok(());
            }
        }

        let download_dir: PathBuf = config.download_dir();
        tokio::fs::create_dir_all(&download_dir)
            .await
            .with_context(|| format!("Failed to create {}", download_dir.display()))?;

        let executor = Executor::new(
            client,
            ExecutorConfig {
                max_workers: config.download.max_workers,
                timeout: config.request_timeout(),
                hash_algorithm: config.download.hash_algorithm,
                show_progress: config.download.show_progress,
            },
        );
        let tag_style = config.tag_style();
        let round_pause = Duration::from_millis(config.pacing.round_pause_ms);
        let mut aggregator = RunAggregator::new();

        for pid in 0..plan.rounds {
            println!(
                "{}\n{}",
                style("#".repeat(20)).dim(),
                style(format!("Round {} / {}", pid + 1, plan.rounds)).bold()
            );

            let posts = match api.fetch_page(tags, plan.limit, pid).await {
                Ok(Some(posts)) => posts,
                Ok(None) => {
                    println!("Round {} failed: the page listed no posts", pid + 1);
                    aggregator.fold(None);
                    continue;
                }
                Err(e) => {
                    error!("Failed to fetch page {}: {}", pid, e);
                    println!("Round {} failed", pid + 1);
                    aggregator.fold(None);
                    continue;
                }
            };

            let items = posts
                .into_iter()
                .map(|post| {
                    let tag_text = process_tags(&post.tags, tag_style);
                    post.into_work_item(tag_text)
                })
                .collect();

            match executor
                .run(items, &download_dir, wait_for_shutdown(self.shutdown.clone()))
                .await
            {
                Ok(tally) => aggregator.fold(Some(tally)),
                Err(ExecutorError::Interrupted(outstanding)) => {
                    warn!("Stopped with {} downloads outstanding", outstanding);
                    aggregator.fold(None);
                    break;
                }
                Err(e) => {
                    error!("Round {} failed: {}", pid + 1, e);
                    aggregator.fold(None);
                }
            }

            if pid + 1 < plan.rounds && !self.pause(round_pause).await {
                break;
            }
        }

        aggregator.print();

        if self.interrupted() {
            return Ok(());
        }

        if let Some(mode) = config.check.mode {
            let workers = config.check.workers;
            let dir = download_dir.clone();
            let report = tokio::task::spawn_blocking(move || scan_images(&dir, mode, workers))
                .await
                .context("Image check panicked")??;
            report.print(mode);
        }

        Ok(())
    }
}
