//! GraphQL client for the microblog platform's internal endpoints (§4.3.2).
//!
//! Issues TLS-impersonated requests via `rquest` (a reqwest-API-compatible
//! fork with browser fingerprint emulation), enforcing the strict response
//! handling policy: rate-limit/auth/server-error handling, credential
//! rotation, and a cross-credential circuit breaker.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use rquest_util::Emulation;
use tokio::time::sleep;

use crate::config::XScraperConfig;
use crate::credential::CredentialPool;
use crate::error::XClientError;

use super::queries::{DEFAULT_FEATURES, DEFAULT_QUERY_IDS, WEB_BEARER_TOKEN};
use super::signing::TransactionSigner;

const DEFAULT_BASE_URL: &str = "https://x.com/i/api/graphql";
const HOME_URL: &str = "https://x.com/";
const DEFAULT_RATE_LIMIT_COOLDOWN_S: u64 = 900;
const BACKOFF_BASE_MS: u64 = 500;

/// HTTP client for the microblog platform's GraphQL endpoints.
pub struct GraphQlClient {
    http: rquest::Client,
    base_url: String,
    credentials: CredentialPool,
    signer: TransactionSigner,
    query_ids: serde_json::Value,
    features: serde_json::Value,
    max_retries: u32,
    circuit_breaker_threshold: u32,
    circuit_breaker_cooldown: u64,
    consecutive_failures: Arc<AtomicU32>,
}

impl GraphQlClient {
    /// Builds a client that impersonates a mainstream desktop browser's TLS
    /// fingerprint and bootstraps its transaction signer against the live
    /// platform.
    pub async fn new(
        config: &XScraperConfig,
        credentials: CredentialPool,
    ) -> Result<Self, XClientError> {
        let http = build_http_client(config.request_timeout)?;
        let signer = TransactionSigner::bootstrap(&http, HOME_URL).await?;
        Self::assemble(http, DEFAULT_BASE_URL.to_string(), config, credentials, signer)
    }

    /// Builds a client against a custom base URL with a test-fixture signer,
    /// for use with `wiremock`.
    pub fn with_base_url_for_tests(
        base_url: String,
        config: &XScraperConfig,
        credentials: CredentialPool,
    ) -> Result<Self, XClientError> {
        let http = build_http_client(config.request_timeout)?;
        Self::assemble(
            http,
            base_url,
            config,
            credentials,
            TransactionSigner::test_fixture(),
        )
    }

    fn assemble(
        http: rquest::Client,
        base_url: String,
        config: &XScraperConfig,
        credentials: CredentialPool,
        signer: TransactionSigner,
    ) -> Result<Self, XClientError> {
        let query_ids = parse_json_override(config.query_ids.as_deref(), DEFAULT_QUERY_IDS)?;
        let features = parse_json_override(config.features.as_deref(), DEFAULT_FEATURES)?;
        Ok(Self {
            http,
            base_url,
            credentials,
            signer,
            query_ids,
            features,
            max_retries: config.max_retries,
            circuit_breaker_threshold: config.circuit_breaker_threshold,
            circuit_breaker_cooldown: config.circuit_breaker_cooldown,
            consecutive_failures: Arc::new(AtomicU32::new(0)),
        })
    }

    /// `UserByScreenName(username) -> user_id`.
    pub async fn user_by_screen_name(&self, username: &str) -> Result<String, XClientError> {
        let query_id = self.operation_query_id("UserByScreenName")?;
        let variables = serde_json::json!({
            "screen_name": username,
            "withSafetyModeUserFields": true,
        });
        let path = format!("/{query_id}/UserByScreenName");

        let data = self.execute(&path, &variables).await?;
        data.pointer("/user/result/rest_id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| XClientError::ParseError {
                message: format!("no user_id found for '{username}'"),
            })
    }

    /// `UserTweets(user_id, count, cursor) -> timeline page` (raw `data`
    /// object; shape is walked by [`crate::microblog::parser`]).
    pub async fn user_tweets(
        &self,
        user_id: &str,
        count: u32,
        cursor: Option<&str>,
    ) -> Result<serde_json::Value, XClientError> {
        let query_id = self.operation_query_id("UserTweets")?;
        let mut variables = serde_json::json!({
            "userId": user_id,
            "count": count,
            "includePromotedContent": false,
            "withQuickPromoteEligibilityTweetFields": false,
            "withVoice": true,
        });
        if let Some(cursor) = cursor {
            variables["cursor"] = serde_json::Value::String(cursor.to_string());
        }
        let path = format!("/{query_id}/UserTweets");

        self.execute(&path, &variables).await
    }

    fn operation_query_id(&self, operation: &str) -> Result<String, XClientError> {
        self.query_ids
            .get(operation)
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| XClientError::ParseError {
                message: format!("no queryId configured for operation '{operation}'"),
            })
    }

    async fn execute(
        &self,
        path: &str,
        variables: &serde_json::Value,
    ) -> Result<serde_json::Value, XClientError> {
        let mut last_err: Option<XClientError> = None;

        for attempt in 0..=self.max_retries {
            self.maybe_trip_circuit_breaker().await;

            let credential = self.credentials.get_next().await?;
            let url = format!("{}{}", self.base_url, path);
            let transaction_id = self.signer.sign("GET", path)?;

            let response = self
                .http
                .get(&url)
                .header("authorization", format!("Bearer {WEB_BEARER_TOKEN}"))
                .header("x-csrf-token", &credential.csrf_token)
                .header(
                    "cookie",
                    format!(
                        "auth_token={}; ct0={}",
                        credential.auth_token, credential.csrf_token
                    ),
                )
                .header("x-twitter-active-user", "yes")
                .header("x-twitter-client-language", "en")
                .header("x-client-transaction-id", transaction_id)
                .query(&[
                    ("variables", variables.to_string()),
                    ("features", self.features.to_string()),
                ])
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    self.record_failure();
                    last_err = Some(XClientError::NetworkError {
                        message: e.to_string(),
                    });
                    self.backoff_sleep(attempt).await;
                    continue;
                }
            };

            let status = response.status().as_u16();
            match status {
                200 => match self.handle_success(response, &credential.auth_token).await {
                    Ok(Some(data)) => return Ok(data),
                    Ok(None) => continue,
                    Err(e) => return Err(e),
                },
                429 => {
                    let retry_after = parse_retry_after(response.headers());
                    self.credentials
                        .report_rate_limited(&credential.auth_token, retry_after)
                        .await;
                    self.record_failure();
                    last_err = Some(XClientError::RateLimited {
                        retry_after_secs: retry_after,
                    });
                }
                401 | 403 => {
                    self.credentials
                        .report_auth_failure(&credential.auth_token)
                        .await;
                    self.record_failure();
                    last_err = Some(XClientError::AuthFailure);
                }
                500..=599 => {
                    self.record_failure();
                    last_err = Some(XClientError::NetworkError {
                        message: format!("server error, status {status}"),
                    });
                    self.backoff_sleep(attempt).await;
                }
                other => {
                    self.record_failure();
                    last_err = Some(XClientError::NetworkError {
                        message: format!("unexpected status {other}"),
                    });
                }
            }
        }

        Err(last_err.unwrap_or(XClientError::RetriesExhausted {
            attempts: self.max_retries,
        }))
    }

    /// Returns `Ok(Some(data))` on a usable response, `Ok(None)` to signal
    /// the caller should retry, or `Err` for an unretryable business error.
    async fn handle_success(
        &self,
        response: rquest::Response,
        auth_token: &str,
    ) -> Result<Option<serde_json::Value>, XClientError> {
        let body: serde_json::Value =
            response
                .json()
                .await
                .map_err(|e| XClientError::ParseError {
                    message: e.to_string(),
                })?;

        match (body.get("errors"), body.get("data")) {
            (Some(errors), None) => {
                self.record_failure();
                Err(XClientError::BusinessError {
                    message: first_error_message(errors),
                })
            }
            (Some(errors), Some(data)) => {
                tracing::warn!(?errors, "graphql response carried partial errors");
                self.credentials.report_success(auth_token).await;
                self.record_success();
                Ok(Some(data.clone()))
            }
            (None, Some(data)) => {
                self.credentials.report_success(auth_token).await;
                self.record_success();
                Ok(Some(data.clone()))
            }
            (None, None) => {
                self.record_failure();
                Err(XClientError::ParseError {
                    message: "response had neither 'data' nor 'errors'".to_string(),
                })
            }
        }
    }

    async fn maybe_trip_circuit_breaker(&self) {
        let failures = self.consecutive_failures.load(Ordering::SeqCst);
        if failures >= self.circuit_breaker_threshold {
            tracing::warn!(
                failures,
                cooldown_s = self.circuit_breaker_cooldown,
                "circuit breaker open, pausing scraper"
            );
            sleep(Duration::from_secs(self.circuit_breaker_cooldown)).await;
            self.consecutive_failures.store(0, Ordering::SeqCst);
        }
    }

    fn record_failure(&self) {
        self.consecutive_failures.fetch_add(1, Ordering::SeqCst);
    }

    fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
    }

    async fn backoff_sleep(&self, attempt: u32) {
        let base = BACKOFF_BASE_MS * 2u64.saturating_pow(attempt);
        let jitter = rand::thread_rng().gen_range(0..=base / 2 + 1);
        sleep(Duration::from_millis(base + jitter)).await;
    }
}

fn build_http_client(timeout_s: u64) -> Result<rquest::Client, XClientError> {
    rquest::Client::builder()
        .emulation(Emulation::Chrome131)
        .timeout(Duration::from_secs(timeout_s))
        .build()
        .map_err(|e| XClientError::NetworkError {
            message: format!("failed to build impersonated HTTP client: {e}"),
        })
}

fn parse_json_override(
    raw: Option<&str>,
    default: &str,
) -> Result<serde_json::Value, XClientError> {
    let source = raw.unwrap_or(default);
    serde_json::from_str(source).map_err(|e| XClientError::ParseError {
        message: format!("invalid JSON override: {e}"),
    })
}

fn parse_retry_after(headers: &rquest::header::HeaderMap) -> u64 {
    headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_RATE_LIMIT_COOLDOWN_S)
}

fn first_error_message(errors: &serde_json::Value) -> String {
    errors
        .as_array()
        .and_then(|arr| arr.first())
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .unwrap_or("unknown GraphQL error")
        .to_string()
}
