//! CLI entry point for the reconnaissance pipeline.
//!
//! Two subcommands: `pipeline` runs the full fetch/enrich/organize/write
//! pipeline; `scraper` runs only the microblog direct-scraper in isolation
//! and dumps raw tweets per user as JSON, bypassing the rest of the
//! pipeline entirely.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use recon_core::config::Config;
use recon_core::credential::CredentialPool;
use recon_core::microblog::{scrape_user, GraphQlClient};
use recon_core::pipeline::{self, RunSummary};
use recon_core::writer::new_batch_id;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const EXIT_SUCCESS: i32 = 0;
const EXIT_CONFIG_ERROR: i32 = 1;
const EXIT_PARTIAL_FAILURE: i32 = 2;
const EXIT_FATAL_ERROR: i32 = 3;

/// Product-intelligence reconnaissance pipeline
#[derive(Parser)]
#[command(name = "recon", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full fetch/enrich/organize/write pipeline
    Pipeline {
        /// Path to config.ini (defaults to ./config.ini)
        #[arg(short, long)]
        config: Option<String>,
    },
    /// Run only the microblog direct-scraper, one JSON file per user
    Scraper {
        /// Path to config.ini (defaults to ./config.ini)
        #[arg(short, long)]
        config: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Pipeline { config } => run_pipeline(config.as_deref()).await,
        Commands::Scraper { config } => run_scraper(config.as_deref()).await,
    };

    std::process::exit(code);
}

fn load_config(config_path: Option<&str>) -> Result<Config, i32> {
    Config::load_and_validate(config_path).map_err(|errors| {
        eprintln!("configuration error:");
        for error in errors {
            eprintln!("  - {error}");
        }
        EXIT_CONFIG_ERROR
    })
}

async fn run_pipeline(config_path: Option<&str>) -> i32 {
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(code) => return code,
    };

    let data_dir = PathBuf::from("data");
    let cancellation = CancellationToken::new();

    let summary: RunSummary = match pipeline::run(&config, data_dir, cancellation).await {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("pipeline run failed: {e}");
            return EXIT_FATAL_ERROR;
        }
    };

    eprintln!(
        "batch {}: {} posts written, {}/{} sources failed, took {:.1}s",
        summary.batch_id,
        summary.posts_fetched,
        summary.sources_failed,
        summary.sources_attempted,
        summary.elapsed.as_secs_f64()
    );

    if summary.failure_ratio() > 0.1 {
        EXIT_PARTIAL_FAILURE
    } else {
        EXIT_SUCCESS
    }
}

async fn run_scraper(config_path: Option<&str>) -> i32 {
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(code) => return code,
    };

    if config.source_accounts.microblog.is_empty() {
        eprintln!("no microblog accounts configured under [microblog_accounts]");
        return EXIT_CONFIG_ERROR;
    }

    let env_vars: HashMap<String, String> = std::env::vars().collect();
    let credentials =
        match CredentialPool::load(&env_vars, config.x_scraper.auth_credentials.as_deref()) {
            Ok(pool) => pool,
            Err(e) => {
                eprintln!("failed to load scraper credentials: {e}");
                return EXIT_CONFIG_ERROR;
            }
        };

    let client = match GraphQlClient::new(&config.x_scraper, credentials).await {
        Ok(client) => Arc::new(client),
        Err(e) => {
            eprintln!("failed to build scraper client: {e}");
            return EXIT_FATAL_ERROR;
        }
    };

    let batch_id = new_batch_id(chrono::Utc::now());
    let out_dir = PathBuf::from("data").join(format!("x_scraper_{batch_id}"));
    if let Err(e) = tokio::fs::create_dir_all(&out_dir).await {
        eprintln!("failed to create output directory: {e}");
        return EXIT_FATAL_ERROR;
    }

    let cutoff =
        (chrono::Utc::now() - chrono::Duration::days(config.fetcher.lookback_days as i64))
            .date_naive();

    let mut attempted = 0usize;
    let mut failed = 0usize;

    for username in config.source_accounts.microblog.keys() {
        attempted += 1;
        match scrape_user(&client, &config.x_scraper, username, cutoff).await {
            Ok(tweets) => {
                let path = out_dir.join(format!("{username}.json"));
                match serde_json::to_vec_pretty(&tweets) {
                    Ok(bytes) => {
                        if let Err(e) = tokio::fs::write(&path, bytes).await {
                            eprintln!("failed to write {}: {e}", path.display());
                            failed += 1;
                        }
                    }
                    Err(e) => {
                        eprintln!("failed to serialize tweets for {username}: {e}");
                        failed += 1;
                    }
                }
            }
            Err(e) => {
                eprintln!("scrape failed for {username}: {e}");
                failed += 1;
            }
        }
    }

    eprintln!(
        "scraper: {attempted} users attempted, {failed} failed, output under {}",
        out_dir.display()
    );

    if attempted > 0 && failed as f64 / attempted as f64 > 0.1 {
        EXIT_PARTIAL_FAILURE
    } else {
        EXIT_SUCCESS
    }
}
