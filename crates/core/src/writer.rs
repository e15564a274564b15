//! Writer stage (§4.7): persists each Post to the on-disk corpus layout
//! (§6.2), tracks running statistics, and emits the batch manifest.
//!
//! Single-threaded by design (§4.7 scheduling note): writes are cheap and
//! serializing them keeps the on-disk layout consistent without needing a
//! lock.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::EntitiesConfig;
use crate::error::WriteError;
use crate::error_log::ErrorLogHandle;
use crate::model::{Bucket, Post, SourceType};

const ENTITY_OTHERS: &str = "Others";

/// Aggregate statistics accumulated across the batch, serialized into
/// `batch_manifest.json` on sentinel.
#[derive(Debug, Default, Serialize)]
struct RunStats {
    counts_by_source_type: HashMap<String, u64>,
    counts_by_bucket: HashMap<String, u64>,
    counts_by_domain: HashMap<String, u64>,
    counts_by_entity: HashMap<String, u64>,
}

impl RunStats {
    fn record(&mut self, post: &Post, bucket: Bucket, entities: &[String]) {
        *self
            .counts_by_source_type
            .entry(post.source_type.as_str().to_string())
            .or_insert(0) += 1;
        *self.counts_by_bucket.entry(bucket.as_str().to_string()).or_insert(0) += 1;
        *self.counts_by_domain.entry(post.domain.clone()).or_insert(0) += 1;
        for entity in entities {
            *self.counts_by_entity.entry(entity.clone()).or_insert(0) += 1;
        }
    }
}

#[derive(Serialize)]
struct BatchManifest<'a> {
    batch_id: &'a str,
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
    cancelled: bool,
    #[serde(flatten)]
    stats: &'a RunStats,
}

#[derive(Serialize)]
struct LatestBatchPointer<'a> {
    batch_id: &'a str,
    path: String,
}

/// Runs the single-threaded Writer until the input channel closes or
/// `cancellation` fires, then writes the batch manifest and latest-batch
/// pointer. A manifest written after cancellation carries `cancelled: true`
/// (§5 cancellation; §8 E6) so a reader can tell a partial batch from a
/// complete one.
pub async fn run(
    data_dir: PathBuf,
    batch_id: String,
    entities: EntitiesConfig,
    mut input: mpsc::Receiver<Post>,
    error_log: ErrorLogHandle,
    cancellation: CancellationToken,
) {
    let started_at = Utc::now();
    let batch_dir = data_dir.join(&batch_id);
    let mut stats = RunStats::default();
    let mut cancelled = false;

    loop {
        tokio::select! {
            maybe_post = input.recv() => {
                match maybe_post {
                    Some(mut post) => {
                        if let Err(e) = write_post(&batch_dir, &entities, &mut post, &mut stats).await {
                            tracing::error!(source = %post.source_name, error = %e, "dropping post after write failure");
                            error_log.record("writer", &post.source_name, "WriteError", e.to_string());
                        }
                    }
                    None => break,
                }
            }
            _ = cancellation.cancelled() => {
                cancelled = true;
                break;
            }
        }
    }

    let ended_at = Utc::now();
    if let Err(e) =
        write_manifest(&data_dir, &batch_id, &batch_dir, started_at, ended_at, cancelled, &stats).await
    {
        tracing::error!(error = %e, "failed to write batch manifest");
        error_log.record("writer", &batch_id, "WriteError", e.to_string());
    }
}

/// Computes the content hash, chooses the bucket, and writes the post's
/// Markdown file under both `By-Domain/` and `By-Entity/`. Retries once on
/// I/O failure before giving up (§7: `WriteError` policy).
async fn write_post(
    batch_dir: &Path,
    entities: &EntitiesConfig,
    post: &mut Post,
    stats: &mut RunStats,
) -> Result<(), WriteError> {
    post.compute_content_hash();
    let bucket = post.bucket();

    let matched_entities = matching_entities(post, entities);
    let markdown = render_markdown(post);
    let filename = format!("{}_{}_{}.md", post.source_name, post.date, post.content_hash);

    let domain_path = batch_dir
        .join("By-Domain")
        .join(sanitize_component(&post.domain))
        .join(bucket.as_str())
        .join(&filename);
    write_with_retry(&domain_path, &markdown).await?;

    for entity in &matched_entities {
        let entity_path = batch_dir
            .join("By-Entity")
            .join(sanitize_component(entity))
            .join(&filename);
        write_with_retry(&entity_path, &markdown).await?;
    }

    stats.record(post, bucket, &matched_entities);
    Ok(())
}

/// The configured entities a post matches, or `["Others"]` if none do
/// (§4.7 step 4).
fn matching_entities(post: &Post, entities: &EntitiesConfig) -> Vec<String> {
    let matched: Vec<String> = entities
        .entities
        .iter()
        .filter(|(_, aliases)| post.matches_entity(aliases))
        .map(|(name, _)| name.clone())
        .collect();

    if matched.is_empty() {
        vec![ENTITY_OTHERS.to_string()]
    } else {
        matched
    }
}

/// Replaces path separators in a domain/entity name so it can't escape its
/// parent directory or create unintended nesting.
fn sanitize_component(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return ENTITY_OTHERS.to_string();
    }
    trimmed.replace(['/', '\\'], "_")
}

async fn write_with_retry(path: &Path, contents: &str) -> Result<(), WriteError> {
    match write_once(path, contents).await {
        Ok(()) => Ok(()),
        Err(_) => write_once(path, contents).await,
    }
}

async fn write_once(path: &Path, contents: &str) -> Result<(), WriteError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| WriteError::Io {
                path: path.display().to_string(),
                source: e,
            })?;
    }
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| WriteError::Io {
            path: path.display().to_string(),
            source: e,
        })
}

/// Renders the exact Markdown shape mandated by §6.2.
fn render_markdown(post: &Post) -> String {
    let stars = "★".repeat(post.quality_score as usize) + &"☆".repeat(5 - post.quality_score as usize);
    let key_info = if post.key_info.is_empty() {
        String::new()
    } else {
        post.key_info
            .iter()
            .enumerate()
            .map(|(i, item)| format!("{}. {item}", i + 1))
            .collect::<Vec<_>>()
            .join("<br>")
    };

    format!(
        "# {event}\n\n\
         - **Date**: {date}\n\
         - **Category**: {category}\n\
         - **Domain**: {domain}\n\
         - **Quality**: {stars} ({score}/5)\n\
         - **Reason**: {reason}\n\
         - **Source_Type**: {source_type}\n\
         - **Source**: {source_name}\n\
         - **Link**: {link}\n\n\
         ## Key Info\n\
         {key_info}\n\n\
         ## Details\n\
         {detail}\n",
        event = post.event,
        date = post.date,
        category = post.category,
        domain = post.domain,
        stars = stars,
        score = post.quality_score,
        reason = post.quality_reason,
        source_type = post.source_type,
        source_name = post.source_name,
        link = post.link,
        key_info = key_info,
        detail = post.detail,
    )
}

async fn write_manifest(
    data_dir: &Path,
    batch_id: &str,
    batch_dir: &Path,
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
    cancelled: bool,
    stats: &RunStats,
) -> Result<(), WriteError> {
    let manifest = BatchManifest {
        batch_id,
        started_at,
        ended_at,
        cancelled,
        stats,
    };
    let manifest_json = serde_json::to_string_pretty(&manifest)
        .map_err(|e| WriteError::Serialize(e.to_string()))?;
    write_once(&batch_dir.join("batch_manifest.json"), &manifest_json).await?;

    let pointer = LatestBatchPointer {
        batch_id,
        path: batch_dir.display().to_string(),
    };
    let pointer_json =
        serde_json::to_string_pretty(&pointer).map_err(|e| WriteError::Serialize(e.to_string()))?;
    write_once(&data_dir.join("latest_batch.json"), &pointer_json).await?;

    Ok(())
}

/// Generates the `YYYYMMDD_HHMMSS` batch id used to name the run directory
/// (§6.2). Takes `now` as a parameter so callers control the timestamp
/// source.
pub fn new_batch_id(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d_%H%M%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SourceType;
    use chrono::NaiveDate;

    fn sample_post() -> Post {
        Post {
            title: "Launch day".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(),
            link: "https://x.com/acme/status/123".to_string(),
            source_type: SourceType::Microblog,
            source_name: "acme".to_string(),
            content: "We shipped Acme Widgets today.".to_string(),
            extra_urls: vec![],
            extra_content: String::new(),
            event: "Widget launch".to_string(),
            category: "product launch".to_string(),
            domain: "Engineering".to_string(),
            quality_score: 5,
            quality_reason: "strong signal".to_string(),
            key_info: vec!["shipped widgets".to_string(), "positive reception".to_string()],
            detail: "Acme shipped a new widget line.".to_string(),
            content_hash: String::new(),
        }
    }

    #[tokio::test]
    async fn writes_file_under_domain_and_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let entities = EntitiesConfig::default();
        let mut post = sample_post();
        let mut stats = RunStats::default();

        write_post(dir.path(), &entities, &mut post, &mut stats).await.unwrap();

        let expected = dir
            .path()
            .join("By-Domain")
            .join("Engineering")
            .join("high")
            .join(format!("acme_2026-07-01_{}.md", post.content_hash));
        assert!(expected.exists());
    }

    #[tokio::test]
    async fn entity_match_writes_under_by_entity() {
        let dir = tempfile::tempdir().unwrap();
        let mut entities = EntitiesConfig::default();
        entities
            .entities
            .insert("Acme".to_string(), vec!["Acme".to_string()]);
        let mut post = sample_post();
        let mut stats = RunStats::default();

        write_post(dir.path(), &entities, &mut post, &mut stats).await.unwrap();

        let expected = dir
            .path()
            .join("By-Entity")
            .join("Acme")
            .join(format!("acme_2026-07-01_{}.md", post.content_hash));
        assert!(expected.exists());
    }

    #[tokio::test]
    async fn no_entity_match_goes_under_others() {
        let dir = tempfile::tempdir().unwrap();
        let entities = EntitiesConfig::default();
        let mut post = sample_post();
        post.content = "no matching alias here".to_string();
        post.source_name = "zzz".to_string();
        let mut stats = RunStats::default();

        write_post(dir.path(), &entities, &mut post, &mut stats).await.unwrap();

        let expected = dir
            .path()
            .join("By-Entity")
            .join("Others")
            .join(format!("zzz_2026-07-01_{}.md", post.content_hash));
        assert!(expected.exists());
    }

    #[tokio::test]
    async fn excluded_bucket_for_low_quality_score() {
        let dir = tempfile::tempdir().unwrap();
        let entities = EntitiesConfig::default();
        let mut post = sample_post();
        post.quality_score = 0;
        let mut stats = RunStats::default();

        write_post(dir.path(), &entities, &mut post, &mut stats).await.unwrap();

        let expected = dir
            .path()
            .join("By-Domain")
            .join("Engineering")
            .join("excluded")
            .join(format!("acme_2026-07-01_{}.md", post.content_hash));
        assert!(expected.exists());
    }

    #[test]
    fn markdown_contains_expected_sections() {
        let post = sample_post();
        let markdown = render_markdown(&post);
        assert!(markdown.starts_with("# Widget launch\n"));
        assert!(markdown.contains("- **Quality**: ★★★★★ (5/5)"));
        assert!(markdown.contains("## Key Info\n1. shipped widgets<br>2. positive reception"));
        assert!(markdown.contains("## Details\nAcme shipped a new widget line."));
    }

    #[tokio::test]
    async fn run_writes_manifest_and_latest_pointer() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = mpsc::channel(8);
        let (error_log, _join) = crate::error_log::spawn(dir.path().join("errors.log"));

        tx.send(sample_post()).await.unwrap();
        drop(tx);

        run(
            dir.path().to_path_buf(),
            "20260701_000000".to_string(),
            EntitiesConfig::default(),
            rx,
            error_log,
            CancellationToken::new(),
        )
        .await;

        let manifest_path = dir.path().join("20260701_000000").join("batch_manifest.json");
        assert!(manifest_path.exists());
        let manifest: serde_json::Value =
            serde_json::from_str(&tokio::fs::read_to_string(&manifest_path).await.unwrap()).unwrap();
        assert_eq!(manifest["batch_id"], "20260701_000000");
        assert_eq!(manifest["counts_by_bucket"]["high"], 1);
        assert_eq!(manifest["cancelled"], false);

        let pointer_path = dir.path().join("latest_batch.json");
        assert!(pointer_path.exists());
        let pointer: serde_json::Value =
            serde_json::from_str(&tokio::fs::read_to_string(&pointer_path).await.unwrap()).unwrap();
        assert_eq!(pointer["batch_id"], "20260701_000000");
    }

    #[test]
    fn batch_id_format_matches_spec() {
        let now = DateTime::parse_from_rfc3339("2026-07-01T12:34:56Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(new_batch_id(now), "20260701_123456");
    }

    #[tokio::test]
    async fn cancellation_marks_manifest_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let (_tx, rx) = mpsc::channel(8);
        let (error_log, _join) = crate::error_log::spawn(dir.path().join("errors.log"));
        let token = CancellationToken::new();
        token.cancel();

        run(
            dir.path().to_path_buf(),
            "20260701_000000".to_string(),
            EntitiesConfig::default(),
            rx,
            error_log,
            token,
        )
        .await;

        let manifest_path = dir.path().join("20260701_000000").join("batch_manifest.json");
        let manifest: serde_json::Value =
            serde_json::from_str(&tokio::fs::read_to_string(&manifest_path).await.unwrap()).unwrap();
        assert_eq!(manifest["cancelled"], true);
    }
}
