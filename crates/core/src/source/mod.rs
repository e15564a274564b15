//! The source catalog: the list of configured accounts/feeds the Fetcher
//! stage schedules across its two worker pools (§4.2, §9).

mod feed;

pub use feed::RssFeedFetcher;

use crate::config::SourceAccounts;
use crate::error::SourceError;
use crate::model::{Post, SourceType};

/// One configured source: a named account/feed of a given type.
#[derive(Debug, Clone)]
pub struct SourceEntry {
    pub source_type: SourceType,
    pub name: String,
    pub url: String,
}

/// Flattens the configuration's per-type account maps into a single
/// catalog, in a stable order (microblog, public account, video, blog;
/// alphabetical by name within each type).
pub fn catalog_from_config(accounts: &SourceAccounts) -> Vec<SourceEntry> {
    let mut catalog = Vec::new();
    for (source_type, map) in [
        (SourceType::Microblog, &accounts.microblog),
        (SourceType::PublicAccount, &accounts.public_account),
        (SourceType::Video, &accounts.video),
        (SourceType::Blog, &accounts.blog),
    ] {
        let mut names: Vec<&String> = map.keys().collect();
        names.sort();
        for name in names {
            catalog.push(SourceEntry {
                source_type,
                name: name.clone(),
                url: map[name].clone(),
            });
        }
    }
    catalog
}

/// A capability for turning a configured source entry into a batch of
/// unfiltered posts. Implementations do not apply the lookback window
/// themselves — that filtering is uniform across source types and owned
/// by the Fetcher stage.
#[async_trait::async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, entry: &SourceEntry) -> Result<Vec<Post>, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_flattens_in_stable_type_and_name_order() {
        let mut accounts = SourceAccounts::default();
        accounts
            .blog
            .insert("zzz-blog".to_string(), "https://zzz.example/feed".to_string());
        accounts
            .public_account
            .insert("acme".to_string(), "https://acme.example/feed".to_string());
        accounts
            .public_account
            .insert("beta".to_string(), "https://beta.example/feed".to_string());

        let catalog = catalog_from_config(&accounts);
        let names: Vec<&str> = catalog.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["acme", "beta", "zzz-blog"]);
    }

    #[test]
    fn empty_accounts_produce_empty_catalog() {
        let accounts = SourceAccounts::default();
        assert!(catalog_from_config(&accounts).is_empty());
    }
}
