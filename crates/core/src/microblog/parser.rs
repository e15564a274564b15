//! Timeline response parser (§4.3.3).
//!
//! Walks the raw GraphQL `data` object returned by `UserTweets` and produces
//! a deduplicated tweet list plus the pagination cursor for the next page.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::error::XClientError;

use super::tweet::{Media, MediaType, Tweet};

/// One page of a user's timeline: the tweets found on it, in document
/// order, and the cursor to request the next page (if any).
pub struct TimelinePage {
    pub tweets: Vec<Tweet>,
    pub next_cursor: Option<String>,
}

/// Parses a `UserTweets` response's `data` object into a [`TimelinePage`].
pub fn parse_timeline(data: &serde_json::Value) -> Result<TimelinePage, XClientError> {
    let instructions = data
        .pointer("/user/result/timeline_v2/timeline/instructions")
        .and_then(|v| v.as_array())
        .ok_or_else(|| XClientError::ParseError {
            message: "missing timeline instructions".to_string(),
        })?;

    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut tweets = Vec::new();
    let mut next_cursor = None;

    for instruction in instructions {
        let kind = instruction.get("type").and_then(|v| v.as_str()).unwrap_or("");
        match kind {
            "TimelinePinEntry" => {
                if let Some(entry) = instruction.get("entry") {
                    if let Some(tweet) = parse_entry_tweet(entry) {
                        push_if_new(&mut tweets, &mut seen_ids, tweet);
                    }
                }
            }
            "TimelineAddEntries" => {
                let entries = instruction
                    .get("entries")
                    .and_then(|v| v.as_array())
                    .cloned()
                    .unwrap_or_default();
                for entry in &entries {
                    if let Some(cursor) = parse_bottom_cursor(entry) {
                        next_cursor = Some(cursor);
                        continue;
                    }
                    if let Some(tweet) = parse_entry_tweet(entry) {
                        push_if_new(&mut tweets, &mut seen_ids, tweet);
                    }
                }
            }
            _ => {}
        }
    }

    Ok(TimelinePage {
        tweets,
        next_cursor,
    })
}

fn push_if_new(tweets: &mut Vec<Tweet>, seen_ids: &mut HashSet<String>, tweet: Tweet) {
    if seen_ids.insert(tweet.id.clone()) {
        tweets.push(tweet);
    }
}

fn parse_bottom_cursor(entry: &serde_json::Value) -> Option<String> {
    let content_type = entry.pointer("/content/entryType").and_then(|v| v.as_str());
    let cursor_type = entry
        .pointer("/content/cursorType")
        .and_then(|v| v.as_str());
    if content_type == Some("TimelineTimelineCursor") && cursor_type == Some("Bottom") {
        entry
            .pointer("/content/value")
            .and_then(|v| v.as_str())
            .map(str::to_string)
    } else {
        None
    }
}

fn parse_entry_tweet(entry: &serde_json::Value) -> Option<Tweet> {
    let result = entry.pointer("/content/itemContent/tweet_results/result")?;
    parse_tweet_result(result)
}

fn parse_tweet_result(result: &serde_json::Value) -> Option<Tweet> {
    let legacy = result.get("legacy")?;
    let user_legacy = result.pointer("/core/user_results/result/legacy");

    let id = result
        .get("rest_id")
        .and_then(|v| v.as_str())
        .map(str::to_string)?;

    let text = legacy
        .pointer("/note_tweet/note_tweet_results/result/text")
        .and_then(|v| v.as_str())
        .or_else(|| legacy.get("full_text").and_then(|v| v.as_str()))
        .unwrap_or_default()
        .to_string();

    let created_at = legacy
        .get("created_at")
        .and_then(|v| v.as_str())
        .and_then(parse_twitter_timestamp)
        .unwrap_or_else(Utc::now);

    let username = user_legacy
        .and_then(|u| u.get("screen_name"))
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let display_name = user_legacy
        .and_then(|u| u.get("name"))
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let user_id = legacy
        .get("user_id_str")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    let urls = legacy
        .pointer("/entities/urls")
        .and_then(|v| v.as_array())
        .map(|urls| {
            urls.iter()
                .filter_map(|u| u.get("expanded_url").and_then(|v| v.as_str()))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let media = legacy
        .pointer("/extended_entities/media")
        .and_then(|v| v.as_array())
        .map(|items| items.iter().filter_map(parse_media).collect())
        .unwrap_or_default();

    let is_quote = legacy
        .get("is_quote_status")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let quoted_tweet = if is_quote {
        result
            .get("quoted_status_result")
            .and_then(|q| q.get("result"))
            .and_then(parse_tweet_result)
            .map(Box::new)
    } else {
        None
    };

    Some(Tweet {
        id,
        user_id,
        username,
        display_name,
        text,
        created_at,
        reply_count: legacy_u64(legacy, "reply_count"),
        retweet_count: legacy_u64(legacy, "retweet_count"),
        like_count: legacy_u64(legacy, "favorite_count"),
        view_count: result
            .pointer("/views/count")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0),
        bookmark_count: legacy_u64(legacy, "bookmark_count"),
        quote_count: legacy_u64(legacy, "quote_count"),
        urls,
        media,
        is_retweet: legacy.get("retweeted_status_result").is_some(),
        is_quote,
        quoted_tweet,
        in_reply_to_id: legacy
            .get("in_reply_to_status_id_str")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        conversation_id: legacy
            .get("conversation_id_str")
            .and_then(|v| v.as_str())
            .map(str::to_string),
    })
}

fn legacy_u64(legacy: &serde_json::Value, field: &str) -> u64 {
    legacy.get(field).and_then(|v| v.as_u64()).unwrap_or(0)
}

fn parse_media(item: &serde_json::Value) -> Option<Media> {
    let media_type = match item.get("type").and_then(|v| v.as_str())? {
        "photo" => MediaType::Photo,
        "video" => MediaType::Video,
        "animated_gif" => MediaType::Gif,
        _ => return None,
    };
    let url = item
        .get("media_url_https")
        .and_then(|v| v.as_str())
        .map(str::to_string)?;
    let alt = item
        .get("ext_alt_text")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    Some(Media {
        media_type,
        url,
        alt,
    })
}

/// Parses the platform's `"%a %b %d %H:%M:%S %z %Y"` timestamp format.
fn parse_twitter_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(raw, "%a %b %d %H:%M:%S %z %Y")
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tweet_entry(id: &str, text: &str) -> serde_json::Value {
        serde_json::json!({
            "content": {
                "itemContent": {
                    "tweet_results": {
                        "result": {
                            "rest_id": id,
                            "legacy": {
                                "full_text": text,
                                "created_at": "Wed Jul 01 12:00:00 +0000 2026",
                                "user_id_str": "u1",
                                "reply_count": 1,
                                "retweet_count": 2,
                                "favorite_count": 3,
                                "bookmark_count": 0,
                                "quote_count": 0,
                                "is_quote_status": false,
                                "entities": { "urls": [] }
                            },
                            "core": {
                                "user_results": {
                                    "result": {
                                        "legacy": { "screen_name": "acme", "name": "Acme" }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        })
    }

    fn cursor_entry(value: &str) -> serde_json::Value {
        serde_json::json!({
            "content": {
                "entryType": "TimelineTimelineCursor",
                "cursorType": "Bottom",
                "value": value
            }
        })
    }

    #[test]
    fn parses_tweets_and_bottom_cursor() {
        let data = serde_json::json!({
            "user": { "result": { "timeline_v2": { "timeline": { "instructions": [
                {
                    "type": "TimelineAddEntries",
                    "entries": [tweet_entry("1", "hello world"), cursor_entry("cursor-abc")]
                }
            ] } } } }
        });

        let page = parse_timeline(&data).unwrap();
        assert_eq!(page.tweets.len(), 1);
        assert_eq!(page.tweets[0].text, "hello world");
        assert_eq!(page.next_cursor, Some("cursor-abc".to_string()));
    }

    #[test]
    fn dedupes_pinned_tweet_against_main_feed() {
        let data = serde_json::json!({
            "user": { "result": { "timeline_v2": { "timeline": { "instructions": [
                { "type": "TimelinePinEntry", "entry": tweet_entry("1", "pinned") },
                {
                    "type": "TimelineAddEntries",
                    "entries": [tweet_entry("1", "pinned"), tweet_entry("2", "second")]
                }
            ] } } } }
        });

        let page = parse_timeline(&data).unwrap();
        assert_eq!(page.tweets.len(), 2);
        assert_eq!(page.tweets[0].id, "1");
        assert_eq!(page.tweets[1].id, "2");
    }

    #[test]
    fn missing_instructions_is_parse_error() {
        let data = serde_json::json!({});
        let result = parse_timeline(&data);
        assert!(matches!(result, Err(XClientError::ParseError { .. })));
    }

    #[test]
    fn note_tweet_text_preferred_over_full_text() {
        let mut entry = tweet_entry("1", "truncated...");
        entry["content"]["itemContent"]["tweet_results"]["result"]["legacy"]["note_tweet"] =
            serde_json::json!({ "note_tweet_results": { "result": { "text": "full long text" } } });

        let tweet = parse_entry_tweet(&entry).unwrap();
        assert_eq!(tweet.text, "full long text");
    }
}
