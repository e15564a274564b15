//! Credential pool for the microblog direct scraper (§4.3.1).
//!
//! The pool is the only mutable shared resource in the scraper; every
//! mutation goes through its documented operations, which serialize access
//! behind a single mutex — mirroring the teacher's `TokenManager` in
//! `x_api/auth.rs`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::time::sleep;

use crate::error::CredentialError;

/// A single `(auth_token, csrf_token)` pair granting authenticated access
/// to the microblog platform, plus the pool's bookkeeping for it.
#[derive(Debug, Clone)]
pub struct Credential {
    pub auth_token: String,
    pub csrf_token: String,
    cooldown_until: Option<Instant>,
    request_count: u64,
    failure_count: u32,
    is_disabled: bool,
    last_used: Option<Instant>,
}

impl Credential {
    pub fn new(auth_token: impl Into<String>, csrf_token: impl Into<String>) -> Self {
        Self {
            auth_token: auth_token.into(),
            csrf_token: csrf_token.into(),
            cooldown_until: None,
            request_count: 0,
            failure_count: 0,
            is_disabled: false,
            last_used: None,
        }
    }

    fn is_cooling(&self, now: Instant) -> bool {
        self.cooldown_until.is_some_and(|until| until > now)
    }
}

/// A read-only snapshot of one credential's state, with tokens masked
/// beyond their first 4 characters (§8 testable property 8).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialStatus {
    pub auth_token_masked: String,
    pub request_count: u64,
    pub failure_count: u32,
    pub is_disabled: bool,
    pub is_cooling: bool,
}

fn mask_token(token: &str) -> String {
    let visible: String = token.chars().take(4).collect();
    format!("{visible}****")
}

/// Shared, cloneable handle to a pool of credentials.
#[derive(Clone)]
pub struct CredentialPool {
    credentials: Arc<Mutex<Vec<Credential>>>,
}

impl CredentialPool {
    pub fn new(credentials: Vec<Credential>) -> Result<Self, CredentialError> {
        if credentials.is_empty() {
            return Err(CredentialError::AllDisabled);
        }
        Ok(Self {
            credentials: Arc::new(Mutex::new(credentials)),
        })
    }

    /// Loads credentials from the environment-style file (`TWITTER_AUTH_TOKEN`
    /// / `TWITTER_CT0`, alias `XCSRF_TOKEN`) and merges in any pairs from a
    /// pipe-delimited config string (`token:csrf|token2:csrf2`).
    pub fn load(
        env_vars: &std::collections::HashMap<String, String>,
        pipe_delimited: Option<&str>,
    ) -> Result<Self, CredentialError> {
        let mut credentials = Vec::new();

        let auth_token = env_vars.get("TWITTER_AUTH_TOKEN");
        let csrf_token = env_vars
            .get("TWITTER_CT0")
            .or_else(|| env_vars.get("XCSRF_TOKEN"));
        if let (Some(auth), Some(csrf)) = (auth_token, csrf_token) {
            credentials.push(Credential::new(auth.clone(), csrf.clone()));
        }

        if let Some(list) = pipe_delimited {
            for pair in list.split('|') {
                let pair = pair.trim();
                if pair.is_empty() {
                    continue;
                }
                let (token, csrf) = pair.split_once(':').ok_or_else(|| {
                    CredentialError::MalformedFile {
                        message: format!("expected 'token:csrf', got '{pair}'"),
                    }
                })?;
                credentials.push(Credential::new(token.trim(), csrf.trim()));
            }
        }

        Self::new(credentials)
    }

    /// Returns a non-cooling, non-disabled credential, favoring the one with
    /// (lowest `failure_count`, oldest `last_used`). Blocks until the
    /// earliest cooldown expires if every credential is currently cooling.
    /// Returns `CredentialError::AllDisabled` if every credential has been
    /// permanently disabled.
    pub async fn get_next(&self) -> Result<Credential, CredentialError> {
        loop {
            let wait_until = {
                let mut guard = self.credentials.lock().await;
                if guard.iter().all(|c| c.is_disabled) {
                    return Err(CredentialError::AllDisabled);
                }

                let now = Instant::now();
                let candidate_idx = guard
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| !c.is_disabled && !c.is_cooling(now))
                    .min_by_key(|(_, c)| (c.failure_count, c.last_used.unwrap_or(now)))
                    .map(|(i, _)| i);

                match candidate_idx {
                    Some(idx) => {
                        let cred = &mut guard[idx];
                        cred.last_used = Some(now);
                        cred.request_count += 1;
                        return Ok(cred.clone());
                    }
                    None => guard
                        .iter()
                        .filter(|c| !c.is_disabled)
                        .filter_map(|c| c.cooldown_until)
                        .min(),
                }
            };

            match wait_until {
                Some(until) => {
                    let now = Instant::now();
                    if until > now {
                        sleep(until - now).await;
                    }
                }
                None => return Err(CredentialError::AllDisabled),
            }
        }
    }

    pub async fn report_rate_limited(&self, auth_token: &str, cooldown_s: u64) {
        let mut guard = self.credentials.lock().await;
        if let Some(cred) = guard.iter_mut().find(|c| c.auth_token == auth_token) {
            cred.cooldown_until = Some(Instant::now() + Duration::from_secs(cooldown_s));
            cred.failure_count += 1;
            tracing::warn!(
                token = %mask_token(auth_token),
                cooldown_s,
                "credential rate limited"
            );
        }
    }

    pub async fn report_auth_failure(&self, auth_token: &str) {
        let mut guard = self.credentials.lock().await;
        if let Some(cred) = guard.iter_mut().find(|c| c.auth_token == auth_token) {
            cred.is_disabled = true;
            tracing::warn!(token = %mask_token(auth_token), "credential disabled after auth failure");
        }
    }

    pub async fn report_success(&self, auth_token: &str) {
        let mut guard = self.credentials.lock().await;
        if let Some(cred) = guard.iter_mut().find(|c| c.auth_token == auth_token) {
            cred.failure_count = cred.failure_count.saturating_sub(1);
        }
    }

    pub async fn status(&self) -> Vec<CredentialStatus> {
        let guard = self.credentials.lock().await;
        let now = Instant::now();
        guard
            .iter()
            .map(|c| CredentialStatus {
                auth_token_masked: mask_token(&c.auth_token),
                request_count: c.request_count,
                failure_count: c.failure_count,
                is_disabled: c.is_disabled,
                is_cooling: c.is_cooling(now),
            })
            .collect()
    }
}
