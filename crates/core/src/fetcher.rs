//! Fetcher stage (§4.2): for each configured source, fetch recent items and
//! push normalized `Post` records onto the fetch queue.
//!
//! Two pools run concurrently:
//! - the **general pool** (default parallelism 5) fetches RSS-style
//!   sources (public accounts, video channels, blogs, and microblog
//!   accounts when the direct scraper is disabled);
//! - the **restricted pool** (parallelism 1, serial) fetches microblog
//!   accounts through the direct GraphQL scraper, pausing between tasks to
//!   respect the target platform's rate limits.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tokio::sync::{mpsc, Semaphore};

use crate::config::Config;
use crate::error_log::ErrorLogHandle;
use crate::microblog::{scrape_user, sleep_uniform, GraphQlClient};
use crate::model::{Post, SourceType};
use crate::source::{catalog_from_config, FeedFetcher, RssFeedFetcher, SourceEntry};

/// Summary of one fetcher run, used to decide the CLI's exit code (§6.3).
#[derive(Debug, Default, Clone, Copy)]
pub struct FetchReport {
    pub sources_attempted: usize,
    pub sources_failed: usize,
    pub posts_fetched: usize,
}

impl FetchReport {
    pub fn failure_ratio(&self) -> f64 {
        if self.sources_attempted == 0 {
            0.0
        } else {
            self.sources_failed as f64 / self.sources_attempted as f64
        }
    }
}

fn lookback_cutoff(lookback_days: u32) -> NaiveDate {
    (Utc::now() - chrono::Duration::days(lookback_days as i64)).date_naive()
}

/// Runs the full Fetcher stage, sending qualifying posts to `out`.
///
/// `scraper_client` must be `Some` when any microblog source is configured
/// with `x_scraper.enabled = true`; those sources are counted as failed
/// (logged, not fatal) if it is absent.
pub async fn run(
    config: &Config,
    scraper_client: Option<Arc<GraphQlClient>>,
    out: mpsc::Sender<Post>,
    error_log: ErrorLogHandle,
) -> FetchReport {
    let cutoff = lookback_cutoff(config.fetcher.lookback_days);
    let catalog = catalog_from_config(&config.source_accounts);

    let (direct_microblog, general): (Vec<SourceEntry>, Vec<SourceEntry>) =
        catalog
            .into_iter()
            .partition(|e| e.source_type == SourceType::Microblog && config.x_scraper.enabled);

    let sources_attempted = direct_microblog.len() + general.len();
    let failed = Arc::new(AtomicUsize::new(0));
    let fetched = Arc::new(AtomicUsize::new(0));

    // The restricted (microblog) pool runs serially within itself, but must
    // still overlap with the general pool rather than wait behind it (§4.2:
    // "Batch-across-sources happens serially but still overlaps with all
    // other source types via the general pool").
    tokio::join!(
        run_general_pool(
            config,
            general,
            cutoff,
            out.clone(),
            &failed,
            &fetched,
            &error_log,
        ),
        run_restricted_pool(
            config,
            direct_microblog,
            scraper_client,
            cutoff,
            out,
            &failed,
            &fetched,
            &error_log,
        ),
    );

    FetchReport {
        sources_attempted,
        sources_failed: failed.load(Ordering::SeqCst),
        posts_fetched: fetched.load(Ordering::SeqCst),
    }
}

async fn run_general_pool(
    config: &Config,
    general: Vec<SourceEntry>,
    cutoff: NaiveDate,
    out: mpsc::Sender<Post>,
    failed: &Arc<AtomicUsize>,
    fetched: &Arc<AtomicUsize>,
    error_log: &ErrorLogHandle,
) {
    let semaphore = Arc::new(Semaphore::new(config.fetcher.general_pool_size.max(1)));
    let feed_fetcher: Arc<dyn FeedFetcher> = Arc::new(RssFeedFetcher::new());

    let mut handles = Vec::with_capacity(general.len());
    for entry in general {
        let semaphore = semaphore.clone();
        let feed_fetcher = feed_fetcher.clone();
        let out = out.clone();
        let failed = failed.clone();
        let fetched = fetched.clone();
        let error_log = error_log.clone();

        handles.push(tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("fetcher semaphore closed unexpectedly");

            match feed_fetcher.fetch(&entry).await {
                Ok(posts) => {
                    for post in posts {
                        if post.date < cutoff {
                            continue;
                        }
                        fetched.fetch_add(1, Ordering::SeqCst);
                        if out.send(post).await.is_err() {
                            break;
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(source = %entry.name, error = %e, "source fetch failed, skipping");
                    error_log.record("fetcher", &entry.name, "SourceError", e.to_string());
                    failed.fetch_add(1, Ordering::SeqCst);
                }
            }
        }));
    }

    for handle in handles {
        let _ = handle.await;
    }
}

async fn run_restricted_pool(
    config: &Config,
    direct_microblog: Vec<SourceEntry>,
    scraper_client: Option<Arc<GraphQlClient>>,
    cutoff: NaiveDate,
    out: mpsc::Sender<Post>,
    failed: &Arc<AtomicUsize>,
    fetched: &Arc<AtomicUsize>,
    error_log: &ErrorLogHandle,
) {
    if direct_microblog.is_empty() {
        return;
    }

    let Some(client) = scraper_client else {
        tracing::error!(
            count = direct_microblog.len(),
            "x_scraper enabled but no GraphQL client available, skipping all microblog sources"
        );
        for entry in &direct_microblog {
            error_log.record(
                "fetcher",
                &entry.name,
                "SourceError",
                "x_scraper enabled but no GraphQL client available",
            );
        }
        failed.fetch_add(direct_microblog.len(), Ordering::SeqCst);
        return;
    };

    for entry in direct_microblog {
        sleep_uniform(
            config.x_scraper.user_switch_delay_min,
            config.x_scraper.user_switch_delay_max,
        )
        .await;

        match scrape_user(&client, &config.x_scraper, &entry.url, cutoff).await {
            Ok(tweets) => {
                for tweet in tweets {
                    let post = tweet.to_post(&entry.name);
                    if post.date < cutoff {
                        continue;
                    }
                    fetched.fetch_add(1, Ordering::SeqCst);
                    if out.send(post).await.is_err() {
                        break;
                    }
                }
            }
            Err(e) => {
                tracing::warn!(source = %entry.name, error = %e, "microblog scrape failed, skipping");
                error_log.record("fetcher", &entry.name, "XClientError", e.to_string());
                failed.fetch_add(1, Ordering::SeqCst);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_ratio_is_zero_with_no_sources() {
        let report = FetchReport::default();
        assert_eq!(report.failure_ratio(), 0.0);
    }

    #[test]
    fn failure_ratio_computes_fraction() {
        let report = FetchReport {
            sources_attempted: 10,
            sources_failed: 3,
            posts_fetched: 40,
        };
        assert!((report.failure_ratio() - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn lookback_cutoff_is_in_the_past() {
        let cutoff = lookback_cutoff(7);
        assert!(cutoff <= Utc::now().date_naive());
    }
}
