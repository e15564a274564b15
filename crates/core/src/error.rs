//! Error types for the recon-core library.
//!
//! Each module has its own error enum to provide clear error boundaries,
//! matching the error taxonomy in §7: only `ConfigError` and unrecoverable
//! coordinator errors propagate up to abort a run. Every other error kind is
//! handled as close to its source as possible and recorded in the per-run
//! error log.

/// Errors related to configuration loading, parsing, and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required configuration field is absent.
    #[error("missing required config field: {field}")]
    MissingField {
        /// The name of the missing field.
        field: String,
    },

    /// A configuration field has an unacceptable value.
    #[error("invalid value for config field '{field}': {message}")]
    InvalidValue {
        /// The name of the invalid field.
        field: String,
        /// A description of why the value is invalid.
        message: String,
    },

    /// The configuration file does not exist at the specified path.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// The path that was searched.
        path: String,
    },

    /// INI deserialization failed.
    #[error("failed to parse config file: {message}")]
    ParseError {
        /// Description of the underlying parse failure.
        message: String,
    },
}

/// A single source's fetch failed (network error, feed parse failure).
///
/// Logged and skipped by the fetcher; never aborts the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The feed or page could not be fetched over HTTP.
    #[error("source '{source_name}' fetch failed: {message}")]
    FetchFailed {
        /// The configured display name of the source.
        source_name: String,
        /// Details about the failure.
        message: String,
    },

    /// The fetched payload could not be parsed as a feed.
    #[error("source '{source_name}' parse failed: {message}")]
    ParseFailed {
        /// The configured display name of the source.
        source_name: String,
        /// Details about the failure.
        message: String,
    },

    /// An item's publication date could not be parsed; the item is dropped.
    #[error("source '{source_name}' item has unparseable date: {raw}")]
    UnparseableDate {
        /// The configured display name of the source.
        source_name: String,
        /// The raw date string that failed to parse.
        raw: String,
    },
}

/// Errors from credential pool operations (§4.3.1).
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// Every credential in the pool has been permanently disabled.
    #[error("all credentials disabled, scraper cannot continue")]
    AllDisabled,

    /// The credential environment file could not be parsed.
    #[error("malformed credential file: {message}")]
    MalformedFile {
        /// Details about the malformed entry.
        message: String,
    },
}

/// Errors from the microblog GraphQL client (§4.3.2).
#[derive(Debug, thiserror::Error)]
pub enum XClientError {
    /// HTTP 429; caller should rotate credentials and retry.
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds to wait before retrying, resolved from `Retry-After` or
        /// the 900s default per §4.3.2 rule 1.
        retry_after_secs: u64,
    },

    /// HTTP 401/403; the credential itself is invalid.
    #[error("authentication failed for credential")]
    AuthFailure,

    /// HTTP 5xx or a network-level failure.
    #[error("network or server error: {message}")]
    NetworkError {
        /// Details about the failure.
        message: String,
    },

    /// HTTP 200 with a GraphQL `errors` array and no `data`.
    #[error("GraphQL business error: {message}")]
    BusinessError {
        /// The first error message from the response.
        message: String,
    },

    /// The response body did not match the expected timeline shape.
    #[error("failed to parse timeline response: {message}")]
    ParseError {
        /// Details about the malformed response.
        message: String,
    },

    /// The circuit breaker tripped after consecutive failures.
    #[error("circuit open, pausing for {cooldown_secs}s")]
    CircuitOpen {
        /// How long the scraper will pause before retrying.
        cooldown_secs: u64,
    },

    /// All retries against the endpoint were exhausted.
    #[error("max retries ({attempts}) exhausted")]
    RetriesExhausted {
        /// The number of attempts made.
        attempts: u32,
    },

    /// The credential pool could not hand back a usable credential.
    #[error("no credential available: {0}")]
    NoCredentialsAvailable(#[from] CredentialError),
}

/// Errors from enrichment of a single embedded URL or video (§4.4, §4.5).
///
/// Always logged and skipped; the owning Post proceeds regardless.
#[derive(Debug, thiserror::Error)]
pub enum EnrichError {
    /// Rendering the page via the web renderer failed.
    #[error("web render failed for {url}: {message}")]
    RenderFailed {
        /// The URL that failed to render.
        url: String,
        /// Details about the failure.
        message: String,
    },

    /// The per-URL fetch timed out.
    #[error("enrichment timed out for {url} after {timeout_s}s")]
    Timeout {
        /// The URL that timed out.
        url: String,
        /// The configured timeout in seconds.
        timeout_s: u64,
    },

    /// Audio extraction from a video URL failed.
    #[error("audio extraction failed for {url}: {message}")]
    AudioExtractionFailed {
        /// The video URL.
        url: String,
        /// Details about the failure.
        message: String,
    },

    /// Speech recognition failed or returned no segments.
    #[error("speech recognition failed: {message}")]
    AsrFailed {
        /// Details about the failure.
        message: String,
    },
}

/// Errors from interacting with the LLM classifier (§4.6, §4.5 step 3).
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// HTTP request to the LLM endpoint failed.
    #[error("LLM HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// LLM API returned an error response.
    #[error("LLM API error (status {status}): {message}")]
    Api {
        /// The HTTP status code.
        status: u16,
        /// The error message from the API.
        message: String,
    },

    /// LLM API rate limited the request (HTTP 429).
    #[error("LLM rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// The LLM call exceeded its configured timeout.
    #[error("LLM call timed out after {timeout_s}s")]
    Timeout {
        /// The configured timeout in seconds.
        timeout_s: u64,
    },

    /// LLM response could not be parsed into the expected structured shape.
    #[error("failed to parse LLM response: {0}")]
    Parse(String),
}

/// Errors from writing a post or manifest to disk (§4.7, §7).
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    /// The write failed due to an I/O error.
    #[error("write failed for {path}: {source}")]
    Io {
        /// The path being written.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The post or manifest could not be serialized.
    #[error("serialization failed: {0}")]
    Serialize(String),
}

/// Unrecoverable coordinator-level errors that abort the entire run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Configuration was invalid; nothing was started.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A stage task panicked or its join handle failed.
    #[error("stage '{stage}' failed to join: {message}")]
    StageJoin {
        /// The name of the stage.
        stage: String,
        /// Details about the join failure.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_missing_field_message() {
        let err = ConfigError::MissingField {
            field: "llm.api_key".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "missing required config field: llm.api_key"
        );
    }

    #[test]
    fn config_error_invalid_value_message() {
        let err = ConfigError::InvalidValue {
            field: "fetcher.lookback_days".to_string(),
            message: "must be positive".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid value for config field 'fetcher.lookback_days': must be positive"
        );
    }

    #[test]
    fn source_error_unparseable_date_message() {
        let err = SourceError::UnparseableDate {
            source_name: "acme-blog".to_string(),
            raw: "not-a-date".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "source 'acme-blog' item has unparseable date: not-a-date"
        );
    }

    #[test]
    fn credential_error_all_disabled_message() {
        let err = CredentialError::AllDisabled;
        assert_eq!(
            err.to_string(),
            "all credentials disabled, scraper cannot continue"
        );
    }

    #[test]
    fn x_client_error_rate_limited_default() {
        let err = XClientError::RateLimited {
            retry_after_secs: 900,
        };
        assert_eq!(err.to_string(), "rate limited, retry after 900s");
    }

    #[test]
    fn x_client_error_circuit_open_message() {
        let err = XClientError::CircuitOpen { cooldown_secs: 60 };
        assert_eq!(err.to_string(), "circuit open, pausing for 60s");
    }

    #[test]
    fn enrich_error_timeout_message() {
        let err = EnrichError::Timeout {
            url: "https://example.com".to_string(),
            timeout_s: 20,
        };
        assert_eq!(
            err.to_string(),
            "enrichment timed out for https://example.com after 20s"
        );
    }

    #[test]
    fn llm_error_timeout_message() {
        let err = LlmError::Timeout { timeout_s: 120 };
        assert_eq!(err.to_string(), "LLM call timed out after 120s");
    }

    #[test]
    fn write_error_serialize_message() {
        let err = WriteError::Serialize("bad utf8".to_string());
        assert_eq!(err.to_string(), "serialization failed: bad utf8");
    }
}
