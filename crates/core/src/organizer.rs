//! Organizer stage (§4.6): a single LLM call per post producing the
//! classification fields `{event, category, domain, quality_score,
//! quality_reason, key_info, detail}`.
//!
//! Runs as a worker pool identical in shape to the Enricher's: workers share
//! one input receiver behind an `Arc<Mutex<_>>` and the upstream bridge task
//! emits one sentinel per worker (§5).

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::{mpsc, Mutex};

use crate::config::OrganizerConfig;
use crate::error_log::ErrorLogHandle;
use crate::llm::{GenerationParams, LlmClient};
use crate::model::Post;

const ORGANIZER_SYSTEM_PROMPT: &str = "You are a research analyst triaging posts for a \
product-intelligence digest. Classify the given post and respond with a single JSON object \
with keys: event (string), category (string), domain (string), quality_score (integer 0-5), \
quality_reason (short string), key_info (array of up to 10 short bullet strings), detail \
(string, a short paragraph). Respond with the JSON object only, no surrounding text.";

const MAX_KEY_INFO: usize = 10;
const LLM_TIMEOUT_S: u64 = 120;

/// The raw shape the LLM is asked to return, before validation/defaulting.
#[derive(Debug, Deserialize)]
struct Classification {
    #[serde(default)]
    event: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    domain: String,
    #[serde(default)]
    quality_score: i64,
    #[serde(default)]
    quality_reason: String,
    #[serde(default)]
    key_info: Vec<String>,
    #[serde(default)]
    detail: String,
}

/// Runs the Organizer worker pool until the input channel is exhausted,
/// forwarding every classified post to `output`.
pub async fn run(
    config: Arc<OrganizerConfig>,
    llm: Arc<dyn LlmClient>,
    worker_count: usize,
    input: mpsc::Receiver<Option<Post>>,
    output: mpsc::Sender<Post>,
    error_log: ErrorLogHandle,
) {
    let shared_input = Arc::new(Mutex::new(input));
    let mut handles = Vec::with_capacity(worker_count.max(1));

    for _ in 0..worker_count.max(1) {
        let shared_input = shared_input.clone();
        let llm = llm.clone();
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
                        classify(&mut post, &llm, &config, &error_log).await;
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

/// Classifies `post` in place, retrying on timeout/parse failure up to
/// `config.retry_on_failure` times before applying the final-failure
/// fallback (§4.6).
async fn classify(
    post: &mut Post,
    llm: &Arc<dyn LlmClient>,
    config: &OrganizerConfig,
    error_log: &ErrorLogHandle,
) {
    let attempts = config.retry_on_failure + 1;
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match classify_once(post, llm, config).await {
            Ok(classification) => {
                apply_classification(post, classification, config);
                return;
            }
            Err(e) => {
                tracing::warn!(
                    source = %post.source_name,
                    attempt,
                    error = %e,
                    "organizer classification attempt failed"
                );
                last_error = e;
            }
        }
    }

    error_log.record(
        "organizer",
        &post.source_name,
        "LlmError",
        format!("organizer failed after {attempts} attempts: {last_error}"),
    );
    post.quality_score = 0;
    post.quality_reason = "organizer_failed".to_string();
    post.event.clear();
    post.category.clear();
    post.domain.clear();
    post.key_info.clear();
    post.detail.clear();
}

async fn classify_once(
    post: &Post,
    llm: &Arc<dyn LlmClient>,
    config: &OrganizerConfig,
) -> Result<Classification, String> {
    let user_message = format!(
        "Title: {}\nDate: {}\nSource: {}\nAllowed domains: {}\nAllowed categories: {}\n\nContent:\n{}\n\nAdditional context:\n{}",
        post.title,
        post.date,
        post.source_name,
        config.allowed_domains.join(", "),
        config.allowed_categories.join(", "),
        post.content,
        post.extra_content,
    );

    let response = tokio::time::timeout(
        Duration::from_secs(LLM_TIMEOUT_S),
        llm.complete(ORGANIZER_SYSTEM_PROMPT, &user_message, &GenerationParams::default()),
    )
    .await
    .map_err(|_| format!("organizer LLM call timed out after {LLM_TIMEOUT_S}s"))?
    .map_err(|e| e.to_string())?;

    let json_text = extract_json_object(&response.text).ok_or_else(|| {
        format!("no JSON object found in organizer response: {}", response.text)
    })?;

    serde_json::from_str::<Classification>(&json_text)
        .map_err(|e| format!("failed to parse organizer response: {e}"))
}

/// Validates and writes a successful classification onto `post` (§4.6
/// validation rules).
fn apply_classification(post: &mut Post, classification: Classification, config: &OrganizerConfig) {
    post.event = classification.event;
    post.category = classification.category;

    post.domain = if config.allowed_domains.contains(&classification.domain) {
        classification.domain
    } else {
        "Others".to_string()
    };

    post.quality_score = classification.quality_score.clamp(0, 5) as u8;
    post.quality_reason = classification.quality_reason;

    post.key_info = classification.key_info;
    post.key_info.truncate(MAX_KEY_INFO);

    post.detail = classification.detail;
}

/// LLMs often wrap JSON in markdown code fences despite instructions not
/// to; find the first top-level `{...}` span rather than rejecting it.
fn extract_json_object(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(text[start..=end].to_string())
}
