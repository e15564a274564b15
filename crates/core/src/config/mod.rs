//! Configuration management for the reconnaissance pipeline.
//!
//! Supports three-layer configuration loading:
//! 1. Built-in defaults
//! 2. An INI config file (`config.ini` in the working directory, or
//!    `--config <path>`)
//! 3. Environment variable overrides (`RECON_` prefix)
//!
//! CLI flag overrides are applied by the binary crate after loading.

mod defaults;
mod env_overrides;
mod validation;

use crate::error::ConfigError;
use ini::Ini;
use std::collections::HashMap;
use std::path::Path;

/// Top-level configuration for a pipeline run.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub llm: LlmConfig,
    pub source_accounts: SourceAccounts,
    pub x_scraper: XScraperConfig,
    pub fetcher: FetcherConfig,
    pub enricher: EnricherConfig,
    pub organizer: OrganizerConfig,
    pub entities: EntitiesConfig,
}

/// `[llm]` — the LLM classifier/enrichment endpoint.
#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

/// `[<source_type>_accounts]` sections — one map per non-microblog source
/// type, plus the microblog account list (which may also be scraped
/// directly per `[x_scraper]`).
#[derive(Debug, Clone, Default)]
pub struct SourceAccounts {
    pub microblog: HashMap<String, String>,
    pub public_account: HashMap<String, String>,
    pub video: HashMap<String, String>,
    pub blog: HashMap<String, String>,
}

/// `[x_scraper]` — the microblog direct-scraper subsystem.
#[derive(Debug, Clone)]
pub struct XScraperConfig {
    pub enabled: bool,
    /// Pipe-delimited `token:csrf|token2:csrf2` list; falls back to the
    /// environment-style credential file when absent.
    pub auth_credentials: Option<String>,
    pub max_tweets_per_user: u32,
    pub request_delay_min: u64,
    pub request_delay_max: u64,
    pub user_switch_delay_min: u64,
    pub user_switch_delay_max: u64,
    pub request_timeout: u64,
    pub max_retries: u32,
    pub include_retweets: bool,
    pub include_replies: bool,
    pub circuit_breaker_threshold: u32,
    pub circuit_breaker_cooldown: u64,
    /// JSON override for the GraphQL `queryId`s, keyed by operation name.
    pub query_ids: Option<String>,
    /// JSON override for the GraphQL `features` flag set.
    pub features: Option<String>,
}

/// `[fetcher]`.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub lookback_days: u32,
    pub general_pool_size: usize,
}

/// `[enricher]`.
#[derive(Debug, Clone)]
pub struct EnricherConfig {
    pub pool_size: usize,
    pub max_urls_per_post: usize,
    pub url_timeout_s: u64,
    /// Base URL of the headless-browser rendering service (Browserless-
    /// compatible `/content` endpoint).
    pub web_renderer_url: String,
    pub web_renderer_token: Option<String>,
    /// External video-downloader tool invoked for audio extraction (§4.5).
    pub video_downloader_bin: String,
    /// Base URL of the automatic speech recognition HTTP service (§4.5).
    pub asr_url: String,
}

/// `[organizer]`.
#[derive(Debug, Clone)]
pub struct OrganizerConfig {
    pub pool_size: usize,
    pub retry_on_failure: u32,
    /// The configurable topical domain enum (§4.6); a classification
    /// outside this set is normalized to `"Others"`.
    pub allowed_domains: Vec<String>,
    /// The configurable category enum offered to the LLM prompt.
    pub allowed_categories: Vec<String>,
}

/// `[entities]` — `display_name = comma-separated-aliases`.
#[derive(Debug, Clone, Default)]
pub struct EntitiesConfig {
    pub entities: HashMap<String, Vec<String>>,
}

impl Config {
    /// Load configuration from an INI file with environment variable
    /// overrides.
    ///
    /// The loading sequence:
    /// 1. Determine the config file path (argument > `RECON_CONFIG` env var
    ///    > `config.ini` in the working directory).
    /// 2. Parse the INI file.
    /// 3. Apply environment variable overrides.
    pub fn load(config_path: Option<&str>) -> Result<Config, ConfigError> {
        let (path, explicit) = Self::resolve_config_path(config_path);

        let mut config = if path.exists() {
            let ini = Ini::load_from_file(&path).map_err(|e| ConfigError::ParseError {
                message: e.to_string(),
            })?;
            Config::from_ini(&ini)?
        } else if explicit {
            return Err(ConfigError::FileNotFound {
                path: path.display().to_string(),
            });
        } else {
            Config::default()
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load configuration and validate it, returning all validation errors
    /// at once.
    pub fn load_and_validate(config_path: Option<&str>) -> Result<Config, Vec<ConfigError>> {
        let config = Config::load(config_path).map_err(|e| vec![e])?;
        config.validate()?;
        Ok(config)
    }

    fn resolve_config_path(config_path: Option<&str>) -> (std::path::PathBuf, bool) {
        if let Some(path) = config_path {
            return (std::path::PathBuf::from(path), true);
        }
        if let Ok(env_path) = std::env::var("RECON_CONFIG") {
            return (std::path::PathBuf::from(env_path), true);
        }
        (std::path::PathBuf::from("config.ini"), false)
    }

    fn from_ini(ini: &Ini) -> Result<Config, ConfigError> {
        let mut config = Config::default();

        if let Some(section) = ini.section(Some("llm")) {
            config.llm.api_key = section.get("api_key").unwrap_or_default().to_string();
            config.llm.base_url = section
                .get("base_url")
                .unwrap_or("https://api.openai.com/v1")
                .to_string();
            config.llm.model = section.get("model").unwrap_or_default().to_string();
        }

        for (section_name, map) in [
            ("microblog_accounts", &mut config.source_accounts.microblog),
            (
                "public_account_accounts",
                &mut config.source_accounts.public_account,
            ),
            ("video_accounts", &mut config.source_accounts.video),
            ("blog_accounts", &mut config.source_accounts.blog),
        ] {
            if let Some(section) = ini.section(Some(section_name)) {
                for (key, value) in section.iter() {
                    map.insert(key.to_string(), value.to_string());
                }
            }
        }

        if let Some(section) = ini.section(Some("x_scraper")) {
            let x = &mut config.x_scraper;
            x.enabled = parse_opt_bool(section.get("enabled"), "x_scraper.enabled")?
                .unwrap_or(x.enabled);
            x.auth_credentials = section.get("auth_credentials").map(str::to_string);
            x.max_tweets_per_user = parse_opt_u32(
                section.get("max_tweets_per_user"),
                "x_scraper.max_tweets_per_user",
            )?
            .unwrap_or(x.max_tweets_per_user);
            x.request_delay_min = parse_opt_u64(
                section.get("request_delay_min"),
                "x_scraper.request_delay_min",
            )?
            .unwrap_or(x.request_delay_min);
            x.request_delay_max = parse_opt_u64(
                section.get("request_delay_max"),
                "x_scraper.request_delay_max",
            )?
            .unwrap_or(x.request_delay_max);
            x.user_switch_delay_min = parse_opt_u64(
                section.get("user_switch_delay_min"),
                "x_scraper.user_switch_delay_min",
            )?
            .unwrap_or(x.user_switch_delay_min);
            x.user_switch_delay_max = parse_opt_u64(
                section.get("user_switch_delay_max"),
                "x_scraper.user_switch_delay_max",
            )?
            .unwrap_or(x.user_switch_delay_max);
            x.request_timeout =
                parse_opt_u64(section.get("request_timeout"), "x_scraper.request_timeout")?
                    .unwrap_or(x.request_timeout);
            x.max_retries = parse_opt_u32(section.get("max_retries"), "x_scraper.max_retries")?
                .unwrap_or(x.max_retries);
            x.include_retweets = parse_opt_bool(
                section.get("include_retweets"),
                "x_scraper.include_retweets",
            )?
            .unwrap_or(x.include_retweets);
            x.include_replies = parse_opt_bool(
                section.get("include_replies"),
                "x_scraper.include_replies",
            )?
            .unwrap_or(x.include_replies);
            x.circuit_breaker_threshold = parse_opt_u32(
                section.get("circuit_breaker_threshold"),
                "x_scraper.circuit_breaker_threshold",
            )?
            .unwrap_or(x.circuit_breaker_threshold);
            x.circuit_breaker_cooldown = parse_opt_u64(
                section.get("circuit_breaker_cooldown"),
                "x_scraper.circuit_breaker_cooldown",
            )?
            .unwrap_or(x.circuit_breaker_cooldown);
            x.query_ids = section.get("query_ids").map(str::to_string);
            x.features = section.get("features").map(str::to_string);
        }

        if let Some(section) = ini.section(Some("fetcher")) {
            config.fetcher.lookback_days =
                parse_opt_u32(section.get("lookback_days"), "fetcher.lookback_days")?
                    .unwrap_or(config.fetcher.lookback_days);
            config.fetcher.general_pool_size = parse_opt_usize(
                section.get("general_pool_size"),
                "fetcher.general_pool_size",
            )?
            .unwrap_or(config.fetcher.general_pool_size);
        }

        if let Some(section) = ini.section(Some("enricher")) {
            config.enricher.pool_size =
                parse_opt_usize(section.get("pool_size"), "enricher.pool_size")?
                    .unwrap_or(config.enricher.pool_size);
            config.enricher.max_urls_per_post = parse_opt_usize(
                section.get("max_urls_per_post"),
                "enricher.max_urls_per_post",
            )?
            .unwrap_or(config.enricher.max_urls_per_post);
            config.enricher.url_timeout_s =
                parse_opt_u64(section.get("url_timeout_s"), "enricher.url_timeout_s")?
                    .unwrap_or(config.enricher.url_timeout_s);
            if let Some(v) = section.get("web_renderer_url") {
                config.enricher.web_renderer_url = v.to_string();
            }
            config.enricher.web_renderer_token =
                section.get("web_renderer_token").map(str::to_string);
            if let Some(v) = section.get("video_downloader_bin") {
                config.enricher.video_downloader_bin = v.to_string();
            }
            if let Some(v) = section.get("asr_url") {
                config.enricher.asr_url = v.to_string();
            }
        }

        if let Some(section) = ini.section(Some("organizer")) {
            config.organizer.pool_size =
                parse_opt_usize(section.get("pool_size"), "organizer.pool_size")?
                    .unwrap_or(config.organizer.pool_size);
            config.organizer.retry_on_failure = parse_opt_u32(
                section.get("retry_on_failure"),
                "organizer.retry_on_failure",
            )?
            .unwrap_or(config.organizer.retry_on_failure);
            if let Some(v) = section.get("allowed_domains") {
                config.organizer.allowed_domains = env_overrides::split_csv(v);
            }
            if let Some(v) = section.get("allowed_categories") {
                config.organizer.allowed_categories = env_overrides::split_csv(v);
            }
        }

        if let Some(section) = ini.section(Some("entities")) {
            for (display_name, aliases) in section.iter() {
                config
                    .entities
                    .entities
                    .insert(display_name.to_string(), env_overrides::split_csv(aliases));
            }
        }

        Ok(config)
    }
}

fn parse_opt_bool(val: Option<&str>, field: &str) -> Result<Option<bool>, ConfigError> {
    match val {
        None => Ok(None),
        Some(v) => env_overrides::parse_env_bool(field, v).map(Some),
    }
}

fn parse_opt_u32(val: Option<&str>, field: &str) -> Result<Option<u32>, ConfigError> {
    match val {
        None => Ok(None),
        Some(v) => v
            .parse::<u32>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                field: field.to_string(),
                message: format!("'{v}' is not a valid u32"),
            }),
    }
}

fn parse_opt_u64(val: Option<&str>, field: &str) -> Result<Option<u64>, ConfigError> {
    match val {
        None => Ok(None),
        Some(v) => v
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                field: field.to_string(),
                message: format!("'{v}' is not a valid u64"),
            }),
    }
}

fn parse_opt_usize(val: Option<&str>, field: &str) -> Result<Option<usize>, ConfigError> {
    match val {
        None => Ok(None),
        Some(v) => v
            .parse::<usize>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                field: field.to_string(),
                message: format!("'{v}' is not a valid usize"),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_ini(dir: &Path, contents: &str) -> std::path::PathBuf {
        let path = dir.join("config.ini");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn load_valid_ini() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_ini(
            dir.path(),
            r#"
[llm]
api_key = sk-test
model = gpt-4o-mini

[public_account_accounts]
acme = https://acme.example.com/feed.xml

[x_scraper]
enabled = true
max_tweets_per_user = 50
"#,
        );
        let config = Config::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(config.llm.api_key, "sk-test");
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(
            config.source_accounts.public_account.get("acme"),
            Some(&"https://acme.example.com/feed.xml".to_string())
        );
        assert!(config.x_scraper.enabled);
        assert_eq!(config.x_scraper.max_tweets_per_user, 50);
    }

    #[test]
    fn missing_sections_use_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_ini(dir.path(), "[llm]\napi_key = k\n");
        let config = Config::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(config.fetcher.lookback_days, 7);
        assert_eq!(config.fetcher.general_pool_size, 5);
        assert_eq!(config.enricher.pool_size, 5);
        assert_eq!(config.x_scraper.request_delay_min, 15);
        assert_eq!(config.x_scraper.circuit_breaker_threshold, 5);
    }

    #[test]
    fn entities_section_splits_aliases() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_ini(
            dir.path(),
            "[entities]\nAcme = acme, Acme Corp, ACME\n",
        );
        let config = Config::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(
            config.entities.entities.get("Acme"),
            Some(&vec![
                "acme".to_string(),
                "Acme Corp".to_string(),
                "ACME".to_string()
            ])
        );
    }

    #[test]
    fn config_file_not_found_explicit_path() {
        let result = Config::load(Some("/nonexistent/path/config.ini"));
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn invalid_numeric_field_raises_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_ini(dir.path(), "[fetcher]\nlookback_days = not-a-number\n");
        let result = Config::load(Some(path.to_str().unwrap()));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }
}
