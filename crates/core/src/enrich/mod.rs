//! Enricher stage (§4.4): expands each post with text pulled from the
//! embedded links it contains, skipping links back to the post's own
//! platform and routing video links to the transcriber instead of the web
//! renderer.
//!
//! Runs as a worker pool (default size 5) pulling from a single shared
//! receiver — `mpsc::Receiver` isn't `Clone`, so workers compete for posts
//! through an `Arc<Mutex<_>>`, the same fan-out shape the Organizer stage
//! uses. The queue carries `Option<Post>`; the upstream bridge task emits
//! exactly one `None` sentinel per pool worker once its own input closes,
//! so each worker exits after consuming one sentinel and the pool drains
//! completely without explicit coordination (§5).

pub mod video;
pub mod web;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};

use crate::config::EnricherConfig;
use crate::error_log::ErrorLogHandle;
use crate::llm::LlmClient;
use crate::model::{extract_urls, Post};

use video::{AsrBackend, HttpAsrBackend, VideoTranscriber};
use web::WebRenderer;

const VIDEO_HOST_PATTERNS: &[&str] = &["youtube.com", "youtu.be"];
const MICROBLOG_HOST_PATTERNS: &[&str] = &["x.com", "twitter.com"];

/// Runs the Enricher worker pool until the input channel is exhausted,
/// forwarding every post (enriched or not) to `output`.
pub async fn run(
    config: Arc<EnricherConfig>,
    llm: Arc<dyn LlmClient>,
    raw_dir: std::path::PathBuf,
    worker_count: usize,
    input: mpsc::Receiver<Option<Post>>,
    output: mpsc::Sender<Post>,
    error_log: ErrorLogHandle,
) {
    let renderer = Arc::new(WebRenderer::new(
        &config.web_renderer_url,
        config.web_renderer_token.as_deref(),
        config.url_timeout_s,
    ));
    let asr: Arc<dyn AsrBackend> = Arc::new(HttpAsrBackend::new(&config.asr_url, config.url_timeout_s));
    let transcriber = Arc::new(VideoTranscriber::new(
        config.video_downloader_bin.clone(),
        asr,
        llm,
        raw_dir,
    ));

    let shared_input = Arc::new(Mutex::new(input));
    let mut handles = Vec::with_capacity(worker_count.max(1));

    for _ in 0..worker_count.max(1) {
        let shared_input = shared_input.clone();
        let renderer = renderer.clone();
        let transcriber = transcriber.clone();
        let output = output.clone();
        let config = config.clone();
        let error_log = error_log.clone();

        handles.push(tokio::spawn(async move {
            loop {
                let item = shared_input.lock().await.recv().await;
                match item {
                    None => break,
                    Some(None) => break,
                    Some(Some(mut post)) => {
                        enrich_post(&mut post, &renderer, &transcriber, &config, &error_log).await;
                        if output.send(post).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }));
    }

    for handle in handles {
        let _ = handle.await;
    }
}

/// Appends rendered/transcribed content for up to `max_urls_per_post`
/// embedded URLs in `post`, per the §4.4 step order: self-links are
/// dropped, video links go to the transcriber, everything else goes to the
/// web renderer.
async fn enrich_post(
    post: &mut Post,
    renderer: &WebRenderer,
    transcriber: &VideoTranscriber,
    config: &EnricherConfig,
    error_log: &ErrorLogHandle,
) {
    let discovered = extract_urls(&post.content, &post.extra_urls);
    for url in discovered {
        post.add_extra_url(url);
    }

    let candidates: Vec<String> = post
        .extra_urls
        .iter()
        .filter(|url| !is_self_link(post.source_type, url))
        .take(config.max_urls_per_post)
        .cloned()
        .collect();

    for url in candidates {
        if is_video_url(&url) {
            let context = format!("{}\n{}", post.title, post.content);
            let transcript = transcriber.transcribe(&url, &context, &post.source_name).await;
            if !transcript.is_empty() {
                post.extra_content
                    .push_str(&format!("[Video Transcript]\n{transcript}\n"));
            }
            continue;
        }

        match tokio::time::timeout(
            Duration::from_secs(config.url_timeout_s),
            renderer.excerpt(&url),
        )
        .await
        {
            Ok(Ok(excerpt)) => {
                let host = url::Url::parse(&url)
                    .ok()
                    .and_then(|u| u.host_str().map(str::to_string))
                    .unwrap_or_else(|| url.clone());
                post.extra_content
                    .push_str(&format!("[Embedded: {host}]\n{excerpt}\n"));
            }
            Ok(Err(e)) => {
                tracing::warn!(url = %url, error = %e, "embedded link render failed, skipping");
                error_log.record("enricher", &post.source_name, "EnrichError", e.to_string());
            }
            Err(_) => {
                tracing::warn!(url = %url, "embedded link render timed out, skipping");
                error_log.record(
                    "enricher",
                    &post.source_name,
                    "EnrichError",
                    format!("enrichment timed out for {url} after {}s", config.url_timeout_s),
                );
            }
        }
    }
}

/// `true` if `url` points back at the same platform a post was sourced
/// from, in which case it carries no new information (§4.4 step 1).
fn is_self_link(source_type: crate::model::SourceType, url: &str) -> bool {
    if source_type != crate::model::SourceType::Microblog {
        return false;
    }
    let Some(host) = url::Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string)) else {
        return false;
    };
    MICROBLOG_HOST_PATTERNS.iter().any(|p| host.contains(p))
}

/// `true` if `url` is hosted on a supported video platform (§4.4 step 2).
fn is_video_url(url: &str) -> bool {
    let Some(host) = url::Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string)) else {
        return false;
    };
    VIDEO_HOST_PATTERNS.iter().any(|p| host.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SourceType;

    #[test]
    fn self_link_detected_for_microblog_posts() {
        assert!(is_self_link(SourceType::Microblog, "https://x.com/acme/status/1"));
        assert!(is_self_link(SourceType::Microblog, "https://twitter.com/acme/status/1"));
        assert!(!is_self_link(SourceType::Microblog, "https://acme.dev/post"));
    }

    #[test]
    fn self_link_check_ignores_non_microblog_sources() {
        assert!(!is_self_link(SourceType::Blog, "https://x.com/acme/status/1"));
    }

    #[test]
    fn video_url_recognizes_youtube_hosts() {
        assert!(is_video_url("https://www.youtube.com/watch?v=abc"));
        assert!(is_video_url("https://youtu.be/abc"));
        assert!(!is_video_url("https://acme.dev/post"));
    }
}
