//! Headless-browser web rendering for embedded URLs (§4.4 step 3).
//!
//! Talks to a Browserless-compatible `/content` endpoint to get
//! fully-rendered HTML (so JS-heavy pages still yield real text), then
//! extracts the page's main textual body with the `scraper` crate.

use std::time::Duration;

use scraper::{Html, Selector};

use crate::error::EnrichError;

const EXCERPT_MAX_CHARS: usize = 2000;

/// Renders a URL via a headless browser and extracts a plain-text excerpt
/// of its main content.
pub struct WebRenderer {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl WebRenderer {
    pub fn new(base_url: &str, token: Option<&str>, timeout_s: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_s))
            .build()
            .expect("failed to build web renderer HTTP client");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
        }
    }

    /// Fetches fully-rendered HTML content for `url` via the `/content`
    /// endpoint.
    async fn render(&self, url: &str) -> Result<String, EnrichError> {
        let mut endpoint = format!("{}/content", self.base_url);
        if let Some(token) = &self.token {
            endpoint.push_str(&format!("?token={token}"));
        }

        let response = self
            .client
            .post(&endpoint)
            .json(&serde_json::json!({ "url": url }))
            .send()
            .await
            .map_err(|e| EnrichError::RenderFailed {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EnrichError::RenderFailed {
                url: url.to_string(),
                message: format!("renderer returned status {status}: {body}"),
            });
        }

        response.text().await.map_err(|e| EnrichError::RenderFailed {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    /// Renders `url` and returns a plain-text excerpt of its body, capped
    /// at [`EXCERPT_MAX_CHARS`] characters.
    pub async fn excerpt(&self, url: &str) -> Result<String, EnrichError> {
        let html = self.render(url).await?;
        Ok(extract_excerpt(&html))
    }
}

/// Extracts visible body text from rendered HTML, collapsing whitespace and
/// truncating to a fixed character budget.
fn extract_excerpt(html: &str) -> String {
    let document = Html::parse_document(html);
    let body_selector = Selector::parse("body").expect("valid body selector");

    let text: String = document
        .select(&body_selector)
        .next()
        .map(|body| {
            body.text()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default();

    if text.chars().count() <= EXCERPT_MAX_CHARS {
        text
    } else {
        text.chars().take(EXCERPT_MAX_CHARS).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn extract_excerpt_collapses_whitespace_and_tags() {
        let html = "<html><body><h1>Title</h1>\n<p>Some   content   here.</p></body></html>";
        let excerpt = extract_excerpt(html);
        assert_eq!(excerpt, "Title Some   content   here.");
    }

    #[test]
    fn extract_excerpt_truncates_long_bodies() {
        let html = format!("<html><body><p>{}</p></body></html>", "x".repeat(5000));
        let excerpt = extract_excerpt(&html);
        assert_eq!(excerpt.chars().count(), EXCERPT_MAX_CHARS);
    }

    #[tokio::test]
    async fn excerpt_posts_url_and_returns_body_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/content"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<html><body><p>Rendered page text.</p></body></html>",
            ))
            .mount(&server)
            .await;

        let renderer = WebRenderer::new(&server.uri(), None, 10);
        let excerpt = renderer.excerpt("https://example.com").await.unwrap();
        assert_eq!(excerpt, "Rendered page text.");
    }

    #[tokio::test]
    async fn non_success_status_is_render_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/content"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let renderer = WebRenderer::new(&server.uri(), None, 10);
        let result = renderer.excerpt("https://example.com").await;
        assert!(matches!(result, Err(EnrichError::RenderFailed { .. })));
    }
}
