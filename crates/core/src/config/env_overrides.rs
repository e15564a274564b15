//! Environment variable overrides for configuration.
//!
//! Environment variables use the `RECON_` prefix with double underscores
//! separating nested keys (e.g. `RECON_LLM__API_KEY`).

use super::Config;
use crate::error::ConfigError;
use std::env;

impl Config {
    pub(super) fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(val) = env::var("RECON_LLM__API_KEY") {
            self.llm.api_key = val;
        }
        if let Ok(val) = env::var("RECON_LLM__BASE_URL") {
            self.llm.base_url = val;
        }
        if let Ok(val) = env::var("RECON_LLM__MODEL") {
            self.llm.model = val;
        }

        if let Ok(val) = env::var("RECON_X_SCRAPER__ENABLED") {
            self.x_scraper.enabled = parse_env_bool("RECON_X_SCRAPER__ENABLED", &val)?;
        }
        if let Ok(val) = env::var("RECON_X_SCRAPER__AUTH_CREDENTIALS") {
            self.x_scraper.auth_credentials = Some(val);
        }
        if let Ok(val) = env::var("RECON_X_SCRAPER__MAX_TWEETS_PER_USER") {
            self.x_scraper.max_tweets_per_user =
                parse_env_u32("RECON_X_SCRAPER__MAX_TWEETS_PER_USER", &val)?;
        }
        if let Ok(val) = env::var("RECON_X_SCRAPER__MAX_RETRIES") {
            self.x_scraper.max_retries = parse_env_u32("RECON_X_SCRAPER__MAX_RETRIES", &val)?;
        }
        if let Ok(val) = env::var("RECON_X_SCRAPER__INCLUDE_RETWEETS") {
            self.x_scraper.include_retweets =
                parse_env_bool("RECON_X_SCRAPER__INCLUDE_RETWEETS", &val)?;
        }
        if let Ok(val) = env::var("RECON_X_SCRAPER__INCLUDE_REPLIES") {
            self.x_scraper.include_replies =
                parse_env_bool("RECON_X_SCRAPER__INCLUDE_REPLIES", &val)?;
        }
        if let Ok(val) = env::var("RECON_X_SCRAPER__CIRCUIT_BREAKER_THRESHOLD") {
            self.x_scraper.circuit_breaker_threshold =
                parse_env_u32("RECON_X_SCRAPER__CIRCUIT_BREAKER_THRESHOLD", &val)?;
        }
        if let Ok(val) = env::var("RECON_X_SCRAPER__CIRCUIT_BREAKER_COOLDOWN") {
            self.x_scraper.circuit_breaker_cooldown =
                parse_env_u64("RECON_X_SCRAPER__CIRCUIT_BREAKER_COOLDOWN", &val)?;
        }

        if let Ok(val) = env::var("RECON_FETCHER__LOOKBACK_DAYS") {
            self.fetcher.lookback_days = parse_env_u32("RECON_FETCHER__LOOKBACK_DAYS", &val)?;
        }
        if let Ok(val) = env::var("RECON_FETCHER__GENERAL_POOL_SIZE") {
            self.fetcher.general_pool_size =
                parse_env_usize("RECON_FETCHER__GENERAL_POOL_SIZE", &val)?;
        }

        if let Ok(val) = env::var("RECON_ENRICHER__POOL_SIZE") {
            self.enricher.pool_size = parse_env_usize("RECON_ENRICHER__POOL_SIZE", &val)?;
        }
        if let Ok(val) = env::var("RECON_ENRICHER__MAX_URLS_PER_POST") {
            self.enricher.max_urls_per_post =
                parse_env_usize("RECON_ENRICHER__MAX_URLS_PER_POST", &val)?;
        }
        if let Ok(val) = env::var("RECON_ENRICHER__URL_TIMEOUT_S") {
            self.enricher.url_timeout_s = parse_env_u64("RECON_ENRICHER__URL_TIMEOUT_S", &val)?;
        }
        if let Ok(val) = env::var("RECON_ENRICHER__WEB_RENDERER_URL") {
            self.enricher.web_renderer_url = val;
        }
        if let Ok(val) = env::var("RECON_ENRICHER__WEB_RENDERER_TOKEN") {
            self.enricher.web_renderer_token = Some(val);
        }
        if let Ok(val) = env::var("RECON_ENRICHER__VIDEO_DOWNLOADER_BIN") {
            self.enricher.video_downloader_bin = val;
        }
        if let Ok(val) = env::var("RECON_ENRICHER__ASR_URL") {
            self.enricher.asr_url = val;
        }

        if let Ok(val) = env::var("RECON_ORGANIZER__POOL_SIZE") {
            self.organizer.pool_size = parse_env_usize("RECON_ORGANIZER__POOL_SIZE", &val)?;
        }
        if let Ok(val) = env::var("RECON_ORGANIZER__RETRY_ON_FAILURE") {
            self.organizer.retry_on_failure =
                parse_env_u32("RECON_ORGANIZER__RETRY_ON_FAILURE", &val)?;
        }

        Ok(())
    }
}

/// Split a comma-separated string into trimmed, non-empty values.
pub(super) fn split_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

pub(super) fn parse_env_u32(var_name: &str, val: &str) -> Result<u32, ConfigError> {
    val.parse::<u32>().map_err(|_| ConfigError::InvalidValue {
        field: var_name.to_string(),
        message: format!("'{val}' is not a valid u32"),
    })
}

pub(super) fn parse_env_u64(var_name: &str, val: &str) -> Result<u64, ConfigError> {
    val.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
        field: var_name.to_string(),
        message: format!("'{val}' is not a valid u64"),
    })
}

pub(super) fn parse_env_usize(var_name: &str, val: &str) -> Result<usize, ConfigError> {
    val.parse::<usize>()
        .map_err(|_| ConfigError::InvalidValue {
            field: var_name.to_string(),
            message: format!("'{val}' is not a valid usize"),
        })
}

/// Accepts: `true`, `false`, `1`, `0`, `yes`, `no` (case-insensitive).
pub(super) fn parse_env_bool(var_name: &str, val: &str) -> Result<bool, ConfigError> {
    match val.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            field: var_name.to_string(),
            message: format!("'{val}' is not a valid boolean (use true/false/1/0/yes/no)"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_var_override_string() {
        env::set_var("RECON_LLM__MODEL", "gpt-4o");
        let mut config = Config::default();
        config.apply_env_overrides().expect("env override");
        assert_eq!(config.llm.model, "gpt-4o");
        env::remove_var("RECON_LLM__MODEL");
    }

    #[test]
    fn env_var_override_numeric() {
        env::set_var("RECON_FETCHER__LOOKBACK_DAYS", "14");
        let mut config = Config::default();
        config.apply_env_overrides().expect("env override");
        assert_eq!(config.fetcher.lookback_days, 14);
        env::remove_var("RECON_FETCHER__LOOKBACK_DAYS");
    }

    #[test]
    fn env_var_invalid_numeric_returns_error() {
        let result = parse_env_u32("RECON_FETCHER__LOOKBACK_DAYS", "not_a_number");
        assert!(result.is_err());
    }

    #[test]
    fn split_csv_trims_and_filters() {
        let result = split_csv("  rust , cli ,, tools  ");
        assert_eq!(result, vec!["rust", "cli", "tools"]);
    }

    #[test]
    fn parse_env_bool_values() {
        assert!(parse_env_bool("TEST", "true").unwrap());
        assert!(parse_env_bool("TEST", "YES").unwrap());
        assert!(!parse_env_bool("TEST", "0").unwrap());
        assert!(parse_env_bool("TEST", "maybe").is_err());
    }
}
