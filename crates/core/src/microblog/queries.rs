//! Default GraphQL `queryId`s and `features` flags for the microblog
//! platform's internal endpoints (§4.3.2).
//!
//! These are versioned by the platform and drift over time; operators
//! override them via `[x_scraper] query_ids` / `features` in configuration
//! without a code change.

/// Default operation name → `queryId` map, as a JSON object literal.
pub const DEFAULT_QUERY_IDS: &str = r#"{
    "UserByScreenName": "G3KGOASz96M-Qu0nwmGXNg",
    "UserTweets": "V7H0Ap3_Hh2FyS75OCDO3Q"
}"#;

/// Default `features` flag set sent with every GraphQL request.
pub const DEFAULT_FEATURES: &str = r#"{
    "responsive_web_graphql_exclude_directive_enabled": true,
    "verified_phone_label_enabled": false,
    "creator_subscriptions_tweet_preview_api_enabled": true,
    "responsive_web_graphql_timeline_navigation_enabled": true,
    "responsive_web_graphql_skip_user_profile_image_extensions_enabled": false,
    "communities_web_enable_tweet_community_results_fetch": true,
    "c9s_tweet_anatomy_moderator_badge_enabled": true,
    "articles_preview_enabled": true,
    "responsive_web_edit_tweet_api_enabled": true,
    "graphql_is_translatable_rweb_tweet_is_translatable_enabled": true,
    "view_counts_everywhere_api_enabled": true,
    "longform_notetweets_consumption_enabled": true,
    "responsive_web_twitter_article_tweet_consumption_enabled": true,
    "tweet_awards_web_tipping_enabled": false,
    "creator_subscriptions_quote_tweet_preview_enabled": false,
    "freedom_of_speech_not_reach_fetch_enabled": true,
    "standardized_nudges_misinfo": true,
    "tweet_with_visibility_results_prefer_gql_limited_actions_policy_enabled": true,
    "rweb_video_timestamps_enabled": true,
    "longform_notetweets_rich_text_read_enabled": true,
    "longform_notetweets_inline_media_enabled": true,
    "rweb_tipjar_consumption_enabled": true,
    "responsive_web_enhance_cards_enabled": false
}"#;

/// The platform's fixed public web-client bearer token (not a secret;
/// shared by every unauthenticated and guest session).
pub const WEB_BEARER_TOKEN: &str = "AAAAAAAAAAAAAAAAAAAAANRILgAAAAAAnNwIzUejRCOuH5E6I8xnZz4puTs%3D1Zv7ttfk8LF81IUq16cHjhLTvJu4FA33AGWWjCpTnA";
