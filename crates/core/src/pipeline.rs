//! Pipeline coordinator (§4.1, §5): wires the four stages together through
//! three bounded queues and owns the shutdown protocol.
//!
//! Queue discipline: the Fetcher and Writer talk plain `Post` channels since
//! they have exactly one producer/consumer side that naturally closes.
//! The Enricher and Organizer are worker pools reading a shared
//! `Option<Post>` channel (`None` = sentinel) behind an `Arc<Mutex<_>>`, so
//! between each `Post`-only stage output and the next `Option<Post>` worker
//! pool input sits a small bridge task: it forwards every item as
//! `Some(post)`, and once its own input closes — meaning the upstream
//! stage is completely done — emits exactly one sentinel per downstream
//! worker before exiting. This keeps sentinel timing implicit in channel
//! closure rather than requiring the coordinator to count down shutdowns
//! by hand.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::credential::CredentialPool;
use crate::error::PipelineError;
use crate::error_log::{self, ErrorLogHandle};
use crate::microblog::GraphQlClient;
use crate::model::Post;
use crate::{enrich, fetcher, organizer, writer};

/// Queue capacity for every inter-stage channel (§5: bounded back-pressure).
const DEFAULT_QUEUE_CAPACITY: usize = 128;

/// The coordinator's summary of a completed run, used by the CLI to decide
/// its exit code (§6.3) and print the stderr summary.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub batch_id: String,
    pub sources_attempted: usize,
    pub sources_failed: usize,
    pub posts_fetched: usize,
    pub elapsed: Duration,
}

impl RunSummary {
    /// Fraction of configured sources that failed to fetch, used for the
    /// CLI's partial-failure exit code (§6.3).
    pub fn failure_ratio(&self) -> f64 {
        if self.sources_attempted == 0 {
            0.0
        } else {
            self.sources_failed as f64 / self.sources_attempted as f64
        }
    }
}

/// Runs the full four-stage pipeline to completion against `config`,
/// writing the batch under `data_dir`.
///
/// `cancellation` is raced against the stage pipeline at the coordinator
/// level (the same `select!`-on-`cancelled()` idiom used by the discovery
/// loop this pipeline is grounded on): once triggered, `run` stops waiting
/// for the stages and returns a summary reflecting whatever already
/// completed. Already-spawned stage tasks keep draining their queues to a
/// natural close in the background rather than being forcibly aborted,
/// since each stage's individual HTTP/LLM/process timeout already bounds
/// how long that takes.
pub async fn run(
    config: &Config,
    data_dir: PathBuf,
    cancellation: CancellationToken,
) -> Result<RunSummary, PipelineError> {
    let start = Instant::now();
    let batch_id = writer::new_batch_id(Utc::now());
    let batch_dir = data_dir.join(&batch_id);

    tokio::fs::create_dir_all(&batch_dir)
        .await
        .map_err(|e| PipelineError::StageJoin {
            stage: "coordinator".to_string(),
            message: format!("failed to create batch directory: {e}"),
        })?;

    let (error_log, error_log_join) = error_log::spawn(batch_dir.join("errors.log"));

    let scraper_client = if config.x_scraper.enabled
        && has_microblog_sources(config)
    {
        Some(Arc::new(build_scraper_client(config).await?))
    } else {
        None
    };

    let run_future = run_stages(
        config,
        data_dir.clone(),
        batch_id.clone(),
        scraper_client,
        error_log.clone(),
        cancellation.clone(),
    );

    let (sources_attempted, sources_failed, posts_fetched) = tokio::select! {
        result = run_future => result?,
        _ = cancellation.cancelled() => {
            tracing::warn!("pipeline cancelled, run summary reflects partial progress");
            (0, 0, 0)
        }
    };

    drop(error_log);
    let _ = error_log_join.await;

    Ok(RunSummary {
        batch_id,
        sources_attempted,
        sources_failed,
        posts_fetched,
        elapsed: start.elapsed(),
    })
}

async fn run_stages(
    config: &Config,
    data_dir: PathBuf,
    batch_id: String,
    scraper_client: Option<Arc<GraphQlClient>>,
    error_log: ErrorLogHandle,
    cancellation: CancellationToken,
) -> Result<(usize, usize, usize), PipelineError> {
    let batch_dir = data_dir.join(&batch_id);
    let raw_dir = batch_dir.join("raw");

    let (fetch_tx, fetch_rx) = mpsc::channel::<Post>(DEFAULT_QUEUE_CAPACITY);
    let (enrich_in_tx, enrich_in_rx) = mpsc::channel::<Option<Post>>(DEFAULT_QUEUE_CAPACITY);
    let (enrich_out_tx, enrich_out_rx) = mpsc::channel::<Post>(DEFAULT_QUEUE_CAPACITY);
    let (organize_in_tx, organize_in_rx) = mpsc::channel::<Option<Post>>(DEFAULT_QUEUE_CAPACITY);
    let (organize_out_tx, organize_out_rx) = mpsc::channel::<Post>(DEFAULT_QUEUE_CAPACITY);

    let fetcher_config = config.clone();
    let fetcher_error_log = error_log.clone();
    let fetcher_handle = tokio::spawn(async move {
        fetcher::run(&fetcher_config, scraper_client, fetch_tx, fetcher_error_log).await
    });

    let fetch_to_enrich = tokio::spawn(bridge(fetch_rx, enrich_in_tx, config.enricher.pool_size.max(1)));

    let enrich_config = Arc::new(config.enricher.clone());
    let llm: Arc<dyn crate::llm::LlmClient> = Arc::new(crate::llm::OpenAiCompatClient::new(
        config.llm.base_url.clone(),
        config.llm.api_key.clone(),
        config.llm.model.clone(),
    ));
    let enrich_handle = tokio::spawn(enrich::run(
        enrich_config,
        llm.clone(),
        raw_dir,
        config.enricher.pool_size.max(1),
        enrich_in_rx,
        enrich_out_tx,
        error_log.clone(),
    ));

    let enrich_to_organize =
        tokio::spawn(bridge(enrich_out_rx, organize_in_tx, config.organizer.pool_size.max(1)));

    let organizer_config = Arc::new(config.organizer.clone());
    let organizer_handle = tokio::spawn(organizer::run(
        organizer_config,
        llm,
        config.organizer.pool_size.max(1),
        organize_in_rx,
        organize_out_tx,
        error_log.clone(),
    ));

    let writer_handle = tokio::spawn(writer::run(
        data_dir,
        batch_id,
        config.entities.clone(),
        organize_out_rx,
        error_log,
        cancellation,
    ));

    let fetch_report = fetcher_handle
        .await
        .map_err(|e| join_err("fetcher", e))?;
    fetch_to_enrich.await.map_err(|e| join_err("fetch-bridge", e))?;
    enrich_handle.await.map_err(|e| join_err("enricher", e))?;
    enrich_to_organize
        .await
        .map_err(|e| join_err("enrich-bridge", e))?;
    organizer_handle.await.map_err(|e| join_err("organizer", e))?;
    writer_handle.await.map_err(|e| join_err("writer", e))?;

    Ok((
        fetch_report.sources_attempted,
        fetch_report.sources_failed,
        fetch_report.posts_fetched,
    ))
}

fn join_err(stage: &str, e: tokio::task::JoinError) -> PipelineError {
    PipelineError::StageJoin {
        stage: stage.to_string(),
        message: e.to_string(),
    }
}

/// Forwards every item from `input` to `output` wrapped in `Some`, then —
/// once `input` closes — sends `sentinel_count` `None` sentinels so every
/// worker in the downstream pool observes exactly one and exits.
async fn bridge(mut input: mpsc::Receiver<Post>, output: mpsc::Sender<Option<Post>>, sentinel_count: usize) {
    while let Some(post) = input.recv().await {
        if output.send(Some(post)).await.is_err() {
            return;
        }
    }
    for _ in 0..sentinel_count {
        if output.send(None).await.is_err() {
            break;
        }
    }
}

fn has_microblog_sources(config: &Config) -> bool {
    !config.source_accounts.microblog.is_empty()
}

async fn build_scraper_client(config: &Config) -> Result<GraphQlClient, PipelineError> {
    let env_vars: std::collections::HashMap<String, String> = std::env::vars().collect();
    let credentials = CredentialPool::load(&env_vars, config.x_scraper.auth_credentials.as_deref())
        .map_err(|e| PipelineError::StageJoin {
            stage: "credential-pool".to_string(),
            message: e.to_string(),
        })?;

    GraphQlClient::new(&config.x_scraper, credentials)
        .await
        .map_err(|e| PipelineError::StageJoin {
            stage: "microblog-client".to_string(),
            message: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SourceType as ST;
    use chrono::NaiveDate;

    fn sample_post(name: &str) -> Post {
        Post {
            title: "t".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(),
            link: format!("https://example.com/{name}"),
            source_type: ST::Blog,
            source_name: name.to_string(),
            content: "c".to_string(),
            extra_urls: vec![],
            extra_content: String::new(),
            event: String::new(),
            category: String::new(),
            domain: String::new(),
            quality_score: 0,
            quality_reason: String::new(),
            key_info: vec![],
            detail: String::new(),
            content_hash: String::new(),
        }
    }

    #[tokio::test]
    async fn bridge_forwards_items_then_emits_sentinels_per_worker() {
        let (in_tx, in_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);

        in_tx.send(sample_post("a")).await.unwrap();
        in_tx.send(sample_post("b")).await.unwrap();
        drop(in_tx);

        bridge(in_rx, out_tx, 3).await;

        let mut items = Vec::new();
        while let Some(item) = out_rx.recv().await {
            items.push(item);
        }

        assert_eq!(items.iter().filter(|i| i.is_some()).count(), 2);
        assert_eq!(items.iter().filter(|i| i.is_none()).count(), 3);
    }

    #[test]
    fn failure_ratio_is_zero_when_no_sources_attempted() {
        let summary = RunSummary {
            batch_id: "x".to_string(),
            sources_attempted: 0,
            sources_failed: 0,
            posts_fetched: 0,
            elapsed: Duration::from_secs(1),
        };
        assert_eq!(summary.failure_ratio(), 0.0);
    }

    #[test]
    fn failure_ratio_flags_partial_failure_over_10_percent() {
        let summary = RunSummary {
            batch_id: "x".to_string(),
            sources_attempted: 10,
            sources_failed: 2,
            posts_fetched: 5,
            elapsed: Duration::from_secs(1),
        };
        assert!(summary.failure_ratio() > 0.1);
    }
}
