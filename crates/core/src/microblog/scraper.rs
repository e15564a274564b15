//! Paginated fetch over a single user's timeline (§4.3.4).

use std::collections::HashSet;
use std::time::Duration;

use chrono::NaiveDate;
use rand::Rng;
use tokio::time::sleep;

use crate::config::XScraperConfig;
use crate::error::XClientError;

use super::client::GraphQlClient;
use super::parser::parse_timeline;
use super::tweet::Tweet;

/// Fetches one user's recent tweets, stopping at the first of: the
/// configured limit, a page with nothing newer than `lookback_cutoff`, or
/// pagination running out of cursor.
pub async fn scrape_user(
    client: &GraphQlClient,
    config: &XScraperConfig,
    username: &str,
    lookback_cutoff: NaiveDate,
) -> Result<Vec<Tweet>, XClientError> {
    let user_id = client.user_by_screen_name(username).await?;
    let limit = config.max_tweets_per_user as usize;

    let mut collected = Vec::new();
    let mut own_ids: HashSet<String> = HashSet::new();
    let mut cursor: Option<String> = None;

    loop {
        let data = client
            .user_tweets(&user_id, config.max_tweets_per_user, cursor.as_deref())
            .await?;
        let page = parse_timeline(&data)?;

        let page_has_new_enough = page
            .tweets
            .iter()
            .any(|t| t.created_at.date_naive() >= lookback_cutoff);

        for tweet in &page.tweets {
            own_ids.insert(tweet.id.clone());
        }

        for tweet in page.tweets {
            if collected.len() >= limit {
                break;
            }
            if passes_inclusion_filter(&tweet, config, &own_ids) {
                collected.push(tweet);
            }
        }

        let next_cursor = page.next_cursor;
        let done = collected.len() >= limit || !page_has_new_enough || next_cursor.is_none();
        if done {
            break;
        }

        cursor = next_cursor;
        sleep_uniform(config.request_delay_min, config.request_delay_max).await;
    }

    Ok(collected)
}

/// Sleeps a random duration in `[min, max]` seconds, for pacing between
/// pages of the same user.
pub async fn sleep_uniform(min_s: u64, max_s: u64) {
    let secs = if min_s >= max_s {
        min_s
    } else {
        rand::thread_rng().gen_range(min_s..=max_s)
    };
    sleep(Duration::from_secs(secs)).await;
}

/// Retweets are dropped unless `include_retweets`. Replies are dropped
/// unless they are a self-reply thread continuation (replying to a tweet
/// already seen from this same user in this scrape) or `include_replies`
/// is set.
fn passes_inclusion_filter(
    tweet: &Tweet,
    config: &XScraperConfig,
    own_ids: &HashSet<String>,
) -> bool {
    if tweet.is_retweet && !config.include_retweets {
        return false;
    }

    if tweet.is_reply() {
        let is_self_reply = tweet
            .in_reply_to_id
            .as_deref()
            .is_some_and(|id| own_ids.contains(id));
        if !is_self_reply && !config.include_replies {
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::{Credential, CredentialPool};
    use chrono::{TimeZone, Utc};

    fn sample_tweet(id: &str, reply_to: Option<&str>, is_retweet: bool) -> Tweet {
        Tweet {
            id: id.to_string(),
            user_id: "u1".to_string(),
            username: "acme".to_string(),
            display_name: "Acme".to_string(),
            text: "hello".to_string(),
            created_at: Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).unwrap(),
            reply_count: 0,
            retweet_count: 0,
            like_count: 0,
            view_count: 0,
            bookmark_count: 0,
            quote_count: 0,
            urls: vec![],
            media: vec![],
            is_retweet,
            is_quote: false,
            quoted_tweet: None,
            in_reply_to_id: reply_to.map(str::to_string),
            conversation_id: None,
        }
    }

    #[test]
    fn filter_drops_retweets_by_default() {
        let config = XScraperConfig::default();
        let tweet = sample_tweet("1", None, true);
        assert!(!passes_inclusion_filter(&tweet, &config, &HashSet::new()));
    }

    #[test]
    fn filter_keeps_retweets_when_configured() {
        let mut config = XScraperConfig::default();
        config.include_retweets = true;
        let tweet = sample_tweet("1", None, true);
        assert!(passes_inclusion_filter(&tweet, &config, &HashSet::new()));
    }

    #[test]
    fn filter_drops_replies_to_others_by_default() {
        let config = XScraperConfig::default();
        let tweet = sample_tweet("2", Some("999"), false);
        assert!(!passes_inclusion_filter(&tweet, &config, &HashSet::new()));
    }

    #[test]
    fn filter_keeps_self_reply_threads_regardless_of_config() {
        let config = XScraperConfig::default();
        let mut own_ids = HashSet::new();
        own_ids.insert("1".to_string());
        let tweet = sample_tweet("2", Some("1"), false);
        assert!(passes_inclusion_filter(&tweet, &config, &own_ids));
    }

    fn one_credential_pool() -> CredentialPool {
        CredentialPool::new(vec![Credential::new("tok123456", "csrf123456")]).unwrap()
    }

    #[tokio::test]
    async fn scrape_user_stops_when_page_has_nothing_newer_than_cutoff() {
        use wiremock::matchers::{method, path_regex};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/.*/UserByScreenName$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "user": { "result": { "rest_id": "42" } } }
            })))
            .mount(&server)
            .await;

        let old_tweet_entry = serde_json::json!({
            "content": { "itemContent": { "tweet_results": { "result": {
                "rest_id": "1",
                "legacy": {
                    "full_text": "old news",
                    "created_at": "Wed Jan 01 00:00:00 +0000 2020",
                    "user_id_str": "42",
                    "reply_count": 0, "retweet_count": 0, "favorite_count": 0,
                    "bookmark_count": 0, "quote_count": 0, "is_quote_status": false,
                    "entities": { "urls": [] }
                },
                "core": { "user_results": { "result": { "legacy": { "screen_name": "acme", "name": "Acme" } } } }
            } } } }
        });

        Mock::given(method("GET"))
            .and(path_regex(r"^/.*/UserTweets$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "user": { "result": { "timeline_v2": { "timeline": { "instructions": [
                    { "type": "TimelineAddEntries", "entries": [old_tweet_entry] }
                ] } } } } }
            })))
            .mount(&server)
            .await;

        let mut config = XScraperConfig::default();
        config.max_tweets_per_user = 10;
        let client =
            GraphQlClient::with_base_url_for_tests(server.uri(), &config, one_credential_pool())
                .unwrap();

        let cutoff = NaiveDate::from_ymd_opt(2026, 6, 1).unwrap();
        let tweets = scrape_user(&client, &config, "acme", cutoff).await.unwrap();
        // The page has nothing newer than the cutoff, so pagination stops
        // after this page; the tweet itself is still returned (date
        // filtering against the lookback window happens in the fetcher).
        assert_eq!(tweets.len(), 1);
        assert_eq!(tweets[0].id, "1");
    }
}
