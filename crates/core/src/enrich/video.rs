//! Video transcription (§4.5): audio extraction, automatic speech
//! recognition, and context-aware optimization of the raw transcript.
//!
//! Every sub-step is an external collaborator — a downloader binary, an ASR
//! HTTP service, the shared LLM client — so a single sub-step failure never
//! aborts enrichment: [`VideoTranscriber::transcribe`] swallows every error
//! and returns an empty string, matching the "on any sub-step failure" rule
//! in §4.5.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::error::EnrichError;
use crate::llm::{GenerationParams, LlmClient};

const TRANSCRIBE_SYSTEM_PROMPT: &str = "You are a subtitle editor. Given a raw speech-to-text \
transcript and the surrounding post text as context, correct misrecognized domain terms using \
the context as a hint, remove filler words and false starts, and produce flowing prose that \
preserves the original information density. Return only the corrected transcript text.";

/// Bounds the whole extract-transcribe-optimize chain for one video (§5:
/// "each video transcription has its own [timeout] (default 600 s)").
const VIDEO_TRANSCRIPTION_TIMEOUT_S: u64 = 600;

/// A timed ASR segment.
#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptSegment {
    pub start_s: f64,
    pub end_s: f64,
    pub text: String,
}

/// The raw output of an ASR backend: timed segments plus the concatenated
/// text transcript.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTranscript {
    #[serde(default)]
    pub segments: Vec<TranscriptSegment>,
    pub text: String,
}

/// Capability for turning extracted audio bytes into a raw transcript.
/// Implemented once against an HTTP ASR service; tests inject a fake.
#[async_trait::async_trait]
pub trait AsrBackend: Send + Sync {
    async fn transcribe(&self, audio: &[u8]) -> Result<RawTranscript, EnrichError>;
}

/// An [`AsrBackend`] backed by an HTTP transcription service.
pub struct HttpAsrBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAsrBackend {
    pub fn new(base_url: impl Into<String>, timeout_s: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_s))
            .build()
            .expect("failed to build ASR HTTP client");
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait::async_trait]
impl AsrBackend for HttpAsrBackend {
    async fn transcribe(&self, audio: &[u8]) -> Result<RawTranscript, EnrichError> {
        let response = self
            .client
            .post(format!("{}/transcribe", self.base_url.trim_end_matches('/')))
            .header("content-type", "application/octet-stream")
            .body(audio.to_vec())
            .send()
            .await
            .map_err(|e| EnrichError::AsrFailed {
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(EnrichError::AsrFailed {
                message: format!("ASR service returned status {status}"),
            });
        }

        response
            .json::<RawTranscript>()
            .await
            .map_err(|e| EnrichError::AsrFailed {
                message: e.to_string(),
            })
    }
}

/// Given a video URL and optional context text, extracts audio, transcribes
/// it, and optimizes the transcript with the LLM. Persists the raw subtitle
/// and optimized text under `raw/<source>_<video_id>/`.
pub struct VideoTranscriber {
    downloader_bin: String,
    asr: Arc<dyn AsrBackend>,
    llm: Arc<dyn LlmClient>,
    raw_dir: PathBuf,
}

impl VideoTranscriber {
    pub fn new(
        downloader_bin: impl Into<String>,
        asr: Arc<dyn AsrBackend>,
        llm: Arc<dyn LlmClient>,
        raw_dir: PathBuf,
    ) -> Self {
        Self {
            downloader_bin: downloader_bin.into(),
            asr,
            llm,
            raw_dir,
        }
    }

    /// Transcribes `url`, returning the optimized plain-text transcript, or
    /// an empty string if any sub-step fails or the whole chain exceeds its
    /// timeout (§4.5, §5).
    pub async fn transcribe(&self, url: &str, context: &str, source_name: &str) -> String {
        let result = tokio::time::timeout(
            Duration::from_secs(VIDEO_TRANSCRIPTION_TIMEOUT_S),
            self.transcribe_inner(url, context, source_name),
        )
        .await;

        match result {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                tracing::warn!(url = %url, error = %e, "video transcription failed, skipping");
                String::new()
            }
            Err(_) => {
                tracing::warn!(
                    url = %url,
                    timeout_s = VIDEO_TRANSCRIPTION_TIMEOUT_S,
                    "video transcription timed out, skipping"
                );
                String::new()
            }
        }
    }

    async fn transcribe_inner(
        &self,
        url: &str,
        context: &str,
        source_name: &str,
    ) -> Result<String, EnrichError> {
        let video_id = video_id_from_url(url).unwrap_or_else(|| fallback_id(url));
        let work_dir = self.raw_dir.join(format!("{source_name}_{video_id}"));
        tokio::fs::create_dir_all(&work_dir)
            .await
            .map_err(|e| EnrichError::AudioExtractionFailed {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let audio = self.extract_audio(url, &work_dir).await?;
        let raw = self.asr.transcribe(&audio).await?;

        write_srt(&work_dir.join(format!("{video_id}.srt")), &raw.segments).await;

        let optimized = self.optimize(&raw.text, context).await?;
        write_text(&work_dir.join(format!("{video_id}.txt")), &optimized).await;

        Ok(optimized)
    }

    /// Shells out to the configured video-downloader binary (e.g. `yt-dlp`)
    /// for an audio-only stream, matching the external-tool invocation
    /// pattern for capability boundaries the rest of the pack uses for
    /// headless browser/media tooling.
    async fn extract_audio(&self, url: &str, work_dir: &Path) -> Result<Vec<u8>, EnrichError> {
        let output_path = work_dir.join("audio.m4a");

        let output = tokio::process::Command::new(&self.downloader_bin)
            .args([
                "-f",
                "bestaudio",
                "--no-playlist",
                "-o",
                output_path.to_string_lossy().as_ref(),
                url,
            ])
            .output()
            .await
            .map_err(|e| EnrichError::AudioExtractionFailed {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EnrichError::AudioExtractionFailed {
                url: url.to_string(),
                message: stderr.trim().to_string(),
            });
        }

        tokio::fs::read(&output_path)
            .await
            .map_err(|e| EnrichError::AudioExtractionFailed {
                url: url.to_string(),
                message: e.to_string(),
            })
    }

    async fn optimize(&self, raw_transcript: &str, context: &str) -> Result<String, EnrichError> {
        let user_message = format!("Context:\n{context}\n\nRaw transcript:\n{raw_transcript}");
        let response = self
            .llm
            .complete(
                TRANSCRIBE_SYSTEM_PROMPT,
                &user_message,
                &GenerationParams {
                    max_tokens: 2048,
                    temperature: 0.1,
                    system_prompt: None,
                },
            )
            .await
            .map_err(|e| EnrichError::AsrFailed {
                message: format!("optimization LLM call failed: {e}"),
            })?;
        Ok(response.text)
    }
}

fn video_id_from_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    if let Some(host) = parsed.host_str() {
        if host.contains("youtu.be") {
            return parsed.path_segments()?.next().map(str::to_string);
        }
        if host.contains("youtube.com") {
            return parsed
                .query_pairs()
                .find(|(k, _)| k == "v")
                .map(|(_, v)| v.into_owned());
        }
    }
    None
}

fn fallback_id(url: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())[..12].to_string()
}

async fn write_srt(path: &Path, segments: &[TranscriptSegment]) {
    let mut body = String::new();
    for (i, seg) in segments.iter().enumerate() {
        body.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            i + 1,
            format_srt_timestamp(seg.start_s),
            format_srt_timestamp(seg.end_s),
            seg.text
        ));
    }
    if let Err(e) = tokio::fs::write(path, body).await {
        tracing::warn!(path = %path.display(), error = %e, "failed to persist raw subtitle");
    }
}

async fn write_text(path: &Path, text: &str) {
    if let Err(e) = tokio::fs::write(path, text).await {
        tracing::warn!(path = %path.display(), error = %e, "failed to persist optimized transcript");
    }
}

fn format_srt_timestamp(total_seconds: f64) -> String {
    let total_ms = (total_seconds * 1000.0).round() as i64;
    let ms = total_ms % 1000;
    let total_s = total_ms / 1000;
    let s = total_s % 60;
    let total_m = total_s / 60;
    let m = total_m % 60;
    let h = total_m / 60;
    format!("{h:02}:{m:02}:{s:02},{ms:03}")
}
