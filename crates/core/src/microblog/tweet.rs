//! The `Tweet` record, internal to the microblog scraper (§3).
//!
//! Tweets live only inside a scraper call; they are projected into `Post`
//! records via [`Tweet::to_post`] on egress and discarded afterward.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Post, SourceType};

/// The kind of media item attached to a tweet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Photo,
    Video,
    Gif,
}

/// A single media attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Media {
    #[serde(rename = "type")]
    pub media_type: MediaType,
    pub url: String,
    #[serde(default)]
    pub alt: Option<String>,
}

/// A single post from the microblog platform's timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tweet {
    pub id: String,
    pub user_id: String,
    pub username: String,
    pub display_name: String,
    /// Full text, including expanded "note tweet" content when present.
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub reply_count: u64,
    pub retweet_count: u64,
    pub like_count: u64,
    pub view_count: u64,
    pub bookmark_count: u64,
    pub quote_count: u64,
    /// External URLs found in `entities.urls[].expanded_url`, in document
    /// order.
    pub urls: Vec<String>,
    pub media: Vec<Media>,
    pub is_retweet: bool,
    pub is_quote: bool,
    pub quoted_tweet: Option<Box<Tweet>>,
    pub in_reply_to_id: Option<String>,
    pub conversation_id: Option<String>,
}

impl Tweet {
    /// Whether this tweet is a reply at all (vs. a top-level post).
    pub fn is_reply(&self) -> bool {
        self.in_reply_to_id.is_some()
    }

    /// Projects this tweet into a `Post` for the given source name.
    ///
    /// `content` carries the expanded text; `extra_urls` seeds from this
    /// tweet's URLs plus the quoted tweet's URLs, if any (§4.3.4).
    pub fn to_post(&self, source_name: &str) -> Post {
        let mut post = Post {
            title: format!("@{} — {}", self.username, truncate_title(&self.text)),
            date: self.created_at.date_naive(),
            link: format!("https://x.com/{}/status/{}", self.username, self.id),
            source_type: SourceType::Microblog,
            source_name: source_name.to_string(),
            content: self.text.clone(),
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
        };

        for url in &self.urls {
            post.add_extra_url(url.clone());
        }
        if let Some(quoted) = &self.quoted_tweet {
            for url in &quoted.urls {
                post.add_extra_url(url.clone());
            }
        }

        post
    }
}

fn truncate_title(text: &str) -> String {
    const MAX_LEN: usize = 80;
    let trimmed = text.trim().replace('\n', " ");
    if trimmed.chars().count() <= MAX_LEN {
        trimmed
    } else {
        let head: String = trimmed.chars().take(MAX_LEN).collect();
        format!("{head}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_tweet() -> Tweet {
        Tweet {
            id: "100".to_string(),
            user_id: "u1".to_string(),
            username: "acme".to_string(),
            display_name: "Acme Corp".to_string(),
            text: "Launching our new widget https://acme.example.com/widget".to_string(),
            created_at: Utc.with_ymd_and_hms(2026, 7, 1, 12, 0, 0).unwrap(),
            reply_count: 0,
            retweet_count: 0,
            like_count: 0,
            view_count: 0,
            bookmark_count: 0,
            quote_count: 0,
            urls: vec!["https://acme.example.com/widget".to_string()],
            media: vec![],
            is_retweet: false,
            is_quote: false,
            quoted_tweet: None,
            in_reply_to_id: None,
            conversation_id: Some("100".to_string()),
        }
    }

    #[test]
    fn to_post_sets_microblog_source_type_and_link() {
        let tweet = sample_tweet();
        let post = tweet.to_post("acme");
        assert_eq!(post.source_type, SourceType::Microblog);
        assert_eq!(post.link, "https://x.com/acme/status/100");
        assert_eq!(post.source_name, "acme");
    }

    #[test]
    fn to_post_seeds_extra_urls_from_tweet_and_quoted_tweet() {
        let mut tweet = sample_tweet();
        let mut quoted = sample_tweet();
        quoted.id = "99".to_string();
        quoted.urls = vec!["https://example.com/quoted".to_string()];
        tweet.quoted_tweet = Some(Box::new(quoted));

        let post = tweet.to_post("acme");
        assert!(post
            .extra_urls
            .contains(&"https://acme.example.com/widget".to_string()));
        assert!(post
            .extra_urls
            .contains(&"https://example.com/quoted".to_string()));
    }

    #[test]
    fn title_truncates_long_text() {
        let mut tweet = sample_tweet();
        tweet.text = "x".repeat(200);
        let post = tweet.to_post("acme");
        assert!(post.title.chars().count() < 200);
        assert!(post.title.ends_with('…'));
    }
}
