//! The data model flowing through the pipeline (§3).
//!
//! `Post` is the unit that moves through every queue. Each field below is
//! annotated with the stage that owns populating it, matching the table in
//! §3 of the specification.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The origin of a post, fixed at fetch time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Microblog,
    PublicAccount,
    Video,
    Blog,
}

impl SourceType {
    /// Directory- and filename-safe label used in manifests and layout.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Microblog => "microblog",
            SourceType::PublicAccount => "public_account",
            SourceType::Video => "video",
            SourceType::Blog => "blog",
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A post's quality bucket, derived from `quality_score` (§3 invariants, §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    High,
    Pending,
    Excluded,
}

impl Bucket {
    /// `quality_score >= 4` is high, `2..=3` is pending, `<= 1` is excluded.
    ///
    /// §9 explicitly normalizes the ambiguous "4 is borderline" reading of
    /// the source to `>= 4 -> High`.
    pub fn from_quality_score(score: u8) -> Self {
        match score {
            4..=5 => Bucket::High,
            2..=3 => Bucket::Pending,
            _ => Bucket::Excluded,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::High => "high",
            Bucket::Pending => "pending",
            Bucket::Excluded => "excluded",
        }
    }
}

/// The unit of content flowing through all four pipeline queues.
///
/// Populated incrementally: Fetcher sets the first block of fields,
/// Enricher adds `extra_content`, Organizer fills in the classification
/// fields, and Writer computes `content_hash` as its last act before
/// persisting.
#[derive(Clone, Serialize, Deserialize)]
pub struct Post {
    // --- Fetcher ---
    pub title: String,
    pub date: NaiveDate,
    pub link: String,
    pub source_type: SourceType,
    pub source_name: String,
    pub content: String,
    pub extra_urls: Vec<String>,

    // --- Enricher ---
    #[serde(default)]
    pub extra_content: String,

    // --- Organizer ---
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub quality_score: u8,
    #[serde(default)]
    pub quality_reason: String,
    #[serde(default)]
    pub key_info: Vec<String>,
    #[serde(default)]
    pub detail: String,

    // --- Writer ---
    #[serde(default)]
    pub content_hash: String,
}

impl std::fmt::Debug for Post {
    /// Redacts the large free-text fields to a length count; these can be
    /// many kilobytes of scraped/LLM text and are noisy in logs.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Post")
            .field("title", &self.title)
            .field("date", &self.date)
            .field("link", &self.link)
            .field("source_type", &self.source_type)
            .field("source_name", &self.source_name)
            .field("content_len", &self.content.len())
            .field("extra_urls", &self.extra_urls)
            .field("extra_content_len", &self.extra_content.len())
            .field("category", &self.category)
            .field("domain", &self.domain)
            .field("quality_score", &self.quality_score)
            .field("content_hash", &self.content_hash)
            .finish()
    }
}

impl Post {
    /// Adds a URL to `extra_urls` unless it is already present (§3 invariant:
    /// "extra_urls never contains duplicates").
    pub fn add_extra_url(&mut self, url: String) {
        if !self.extra_urls.iter().any(|u| u == &url) {
            self.extra_urls.push(url);
        }
    }

    /// Computes the first 6 hex characters of the SHA-256 digest over
    /// `link`, per §4.7 step 1.
    pub fn compute_content_hash(&mut self) {
        let mut hasher = Sha256::new();
        hasher.update(self.link.as_bytes());
        let digest = hasher.finalize();
        self.content_hash = hex::encode(digest)[..6].to_string();
    }

    /// The bucket this post belongs to, based on its current quality score.
    pub fn bucket(&self) -> Bucket {
        Bucket::from_quality_score(self.quality_score)
    }

    /// `true` if any of `content`, `extra_content`, or `source_name`
    /// contains one of the entity's aliases (§4.7 step 4, substring match).
    pub fn matches_entity(&self, aliases: &[String]) -> bool {
        aliases.iter().any(|alias| {
            self.content.contains(alias.as_str())
                || self.extra_content.contains(alias.as_str())
                || self.source_name.contains(alias.as_str())
        })
    }
}

/// Extracts URLs from free text using a conservative `http(s)://` scan,
/// de-duplicating against an existing set of URLs already known for a post.
pub fn extract_urls(text: &str, already_known: &[String]) -> Vec<String> {
    static URL_RE: once_regex::OnceRegex = once_regex::OnceRegex::new(r#"https?://[^\s"'<>\)]+"#);
    let re = URL_RE.get();
    let mut seen: BTreeSet<String> = already_known.iter().cloned().collect();
    let mut out = Vec::new();
    for m in re.find_iter(text) {
        let url = m.as_str().trim_end_matches(['.', ',', ';']).to_string();
        if seen.insert(url.clone()) {
            out.push(url);
        }
    }
    out
}

/// A tiny lazily-initialized regex holder so `model.rs` doesn't need a
/// `once_cell`/`lazy_static` dependency for a single pattern.
mod once_regex {
    use std::sync::OnceLock;

    pub struct OnceRegex {
        pattern: &'static str,
        cell: OnceLock<regex::Regex>,
    }

    impl OnceRegex {
        pub const fn new(pattern: &'static str) -> Self {
            Self {
                pattern,
                cell: OnceLock::new(),
            }
        }

        pub fn get(&self) -> &regex::Regex {
            self.cell
                .get_or_init(|| regex::Regex::new(self.pattern).expect("valid url regex"))
        }
    }
}
