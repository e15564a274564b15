//! The per-run structured error log (§7).
//!
//! Every stage records recoverable errors here instead of only logging them
//! with `tracing`; the coordinator owns the single consumer that appends
//! each event as a JSON line to `data/<batch>/errors.log`. The channel is
//! unbounded and the sender never blocks a stage's own queue.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

/// One recorded error, matching the `{timestamp, stage, source, kind,
/// message}` shape mandated by §7.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEvent {
    pub timestamp: DateTime<Utc>,
    pub stage: String,
    pub source: String,
    pub kind: String,
    pub message: String,
}

/// A cloneable handle stages use to record an error without waiting on the
/// coordinator.
#[derive(Clone)]
pub struct ErrorLogHandle {
    tx: mpsc::UnboundedSender<ErrorEvent>,
}

impl ErrorLogHandle {
    /// Records an error. Silently dropped if the coordinator's consumer has
    /// already shut down (end of run) — there is nothing further to log to.
    pub fn record(&self, stage: &str, source: &str, kind: &str, message: impl Into<String>) {
        let _ = self.tx.send(ErrorEvent {
            timestamp: Utc::now(),
            stage: stage.to_string(),
            source: source.to_string(),
            kind: kind.to_string(),
            message: message.into(),
        });
    }
}

/// Spawns the coordinator's error log consumer, writing one JSON line per
/// event to `path`. Returns the handle stages clone, plus a join handle the
/// coordinator awaits after every stage has exited (so every event queued
/// before shutdown is flushed before the run summary is returned).
pub fn spawn(path: std::path::PathBuf) -> (ErrorLogHandle, tokio::task::JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<ErrorEvent>();

    let join = tokio::spawn(async move {
        let mut file = match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
        {
            Ok(f) => f,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "failed to open error log");
                return;
            }
        };

        use tokio::io::AsyncWriteExt;
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(mut line) => {
                    line.push('\n');
                    if let Err(e) = file.write_all(line.as_bytes()).await {
                        tracing::error!(error = %e, "failed to write error log line");
                    }
                }
                Err(e) => tracing::error!(error = %e, "failed to serialize error event"),
            }
        }
    });

    (ErrorLogHandle { tx }, join)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recorded_events_are_flushed_as_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("errors.log");
        let (handle, join) = spawn(path.clone());

        handle.record("fetcher", "acme-blog", "SourceError", "feed parse failed");
        handle.record("organizer", "acme", "LlmError", "timeout");
        drop(handle);
        join.await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["stage"], "fetcher");
        assert_eq!(first["kind"], "SourceError");
    }

    #[tokio::test]
    async fn no_events_produces_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("errors.log");
        let (handle, join) = spawn(path.clone());
        drop(handle);
        join.await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(contents.is_empty());
    }
}
