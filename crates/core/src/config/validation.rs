//! Configuration validation logic.

use super::Config;
use crate::error::ConfigError;

impl Config {
    /// Validate the configuration, returning all errors found (not just the
    /// first).
    pub fn validate(&self) -> Result<(), Vec<ConfigError>> {
        let mut errors = Vec::new();

        if self.llm.api_key.is_empty() {
            errors.push(ConfigError::MissingField {
                field: "llm.api_key".to_string(),
            });
        }
        if self.llm.model.is_empty() {
            errors.push(ConfigError::MissingField {
                field: "llm.model".to_string(),
            });
        }

        if self.fetcher.lookback_days == 0 {
            errors.push(ConfigError::InvalidValue {
                field: "fetcher.lookback_days".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        if self.fetcher.general_pool_size == 0 {
            errors.push(ConfigError::InvalidValue {
                field: "fetcher.general_pool_size".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        if self.enricher.pool_size == 0 {
            errors.push(ConfigError::InvalidValue {
                field: "enricher.pool_size".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        if self.enricher.max_urls_per_post == 0 {
            errors.push(ConfigError::InvalidValue {
                field: "enricher.max_urls_per_post".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        if self.organizer.pool_size == 0 {
            errors.push(ConfigError::InvalidValue {
                field: "organizer.pool_size".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        if self.x_scraper.enabled {
            if self.x_scraper.request_delay_min > self.x_scraper.request_delay_max {
                errors.push(ConfigError::InvalidValue {
                    field: "x_scraper.request_delay_min".to_string(),
                    message: "must be less than or equal to request_delay_max".to_string(),
                });
            }
            if self.x_scraper.user_switch_delay_min > self.x_scraper.user_switch_delay_max {
                errors.push(ConfigError::InvalidValue {
                    field: "x_scraper.user_switch_delay_min".to_string(),
                    message: "must be less than or equal to user_switch_delay_max".to_string(),
                });
            }
            if self.x_scraper.max_tweets_per_user == 0 {
                errors.push(ConfigError::InvalidValue {
                    field: "x_scraper.max_tweets_per_user".to_string(),
                    message: "must be greater than 0".to_string(),
                });
            }
            if self.x_scraper.circuit_breaker_threshold == 0 {
                errors.push(ConfigError::InvalidValue {
                    field: "x_scraper.circuit_breaker_threshold".to_string(),
                    message: "must be greater than 0".to_string(),
                });
            }
            for (name, json) in [
                ("x_scraper.query_ids", &self.x_scraper.query_ids),
                ("x_scraper.features", &self.x_scraper.features),
            ] {
                if let Some(raw) = json {
                    if serde_json::from_str::<serde_json::Value>(raw).is_err() {
                        errors.push(ConfigError::InvalidValue {
                            field: name.to_string(),
                            message: "must be valid JSON".to_string(),
                        });
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
