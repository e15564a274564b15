//! Default values for all configuration sections.
//!
//! These defaults match the values specified in the CLI interface contract
//! (§6.1). Users only need to supply an `[llm]` section, account lists, and
//! (if scraping) credentials.

use super::{EnricherConfig, FetcherConfig, OrganizerConfig, XScraperConfig};

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            lookback_days: 7,
            general_pool_size: 5,
        }
    }
}

impl Default for EnricherConfig {
    fn default() -> Self {
        Self {
            pool_size: 5,
            max_urls_per_post: 5,
            url_timeout_s: 20,
            web_renderer_url: "http://localhost:3000".to_string(),
            web_renderer_token: None,
            video_downloader_bin: "yt-dlp".to_string(),
            asr_url: "http://localhost:9000".to_string(),
        }
    }
}

impl Default for OrganizerConfig {
    fn default() -> Self {
        Self {
            pool_size: 5,
            retry_on_failure: 2,
            allowed_domains: vec![
                "Engineering".to_string(),
                "Product".to_string(),
                "Marketing".to_string(),
                "Funding".to_string(),
                "Hiring".to_string(),
                "Others".to_string(),
            ],
            allowed_categories: vec![
                "product launch".to_string(),
                "opinion".to_string(),
                "announcement".to_string(),
                "discussion".to_string(),
                "other".to_string(),
            ],
        }
    }
}

impl Default for XScraperConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            auth_credentials: None,
            max_tweets_per_user: 20,
            request_delay_min: 15,
            request_delay_max: 25,
            user_switch_delay_min: 30,
            user_switch_delay_max: 60,
            request_timeout: 30,
            max_retries: 3,
            include_retweets: false,
            include_replies: false,
            circuit_breaker_threshold: 5,
            circuit_breaker_cooldown: 60,
            query_ids: None,
            features: None,
        }
    }
}
