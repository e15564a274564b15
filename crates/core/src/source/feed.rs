//! RSS/Atom-backed source fetcher, for public account, video, and blog
//! sources, and for microblog sources when the direct scraper is disabled.

use std::time::Duration;

use chrono::Utc;

use crate::error::SourceError;
use crate::model::Post;

use super::{FeedFetcher, SourceEntry};

const USER_AGENT: &str = "recon-bot/0.1";
const REQUEST_TIMEOUT_S: u64 = 20;

pub struct RssFeedFetcher {
    client: reqwest::Client,
}

impl RssFeedFetcher {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_S))
            .user_agent(USER_AGENT)
            .build()
            .expect("failed to build RSS HTTP client");
        Self { client }
    }
}

impl Default for RssFeedFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl FeedFetcher for RssFeedFetcher {
    async fn fetch(&self, entry: &SourceEntry) -> Result<Vec<Post>, SourceError> {
        let response =
            self.client
                .get(&entry.url)
                .send()
                .await
                .map_err(|e| SourceError::FetchFailed {
                    source_name: entry.name.clone(),
                    message: e.to_string(),
                })?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SourceError::FetchFailed {
                source_name: entry.name.clone(),
                message: e.to_string(),
            })?;

        let feed = feed_rs::parser::parse(&bytes[..]).map_err(|e| SourceError::ParseFailed {
            source_name: entry.name.clone(),
            message: e.to_string(),
        })?;

        let mut posts = Vec::new();
        for item in feed.entries {
            let link = match item.links.first().map(|l| l.href.clone()) {
                Some(link) => link,
                None => continue,
            };

            let raw_date = item.published.or(item.updated);
            let date = match raw_date {
                Some(dt) => dt.with_timezone(&Utc).date_naive(),
                None => {
                    tracing::warn!(
                        source = %entry.name,
                        link = %link,
                        "feed item has no publication date, dropping"
                    );
                    continue;
                }
            };

            let title = item
                .title
                .map(|t| t.content)
                .unwrap_or_else(|| link.clone());
            let content = item
                .summary
                .map(|s| s.content)
                .or_else(|| item.content.and_then(|c| c.body))
                .unwrap_or_default();

            posts.push(Post {
                title,
                date,
                link,
                source_type: entry.source_type,
                source_name: entry.name.clone(),
                content,
                extra_urls: Vec::new(),
                extra_content: String::new(),
                event: String::new(),
                category: String::new(),
                domain: String::new(),
                quality_score: 0,
                quality_reason: String::new(),
                key_info: Vec::new(),
                detail: String::new(),
                content_hash: String::new(),
            });
        }

        Ok(posts)
    }
}
