//! The microblog direct scraper subsystem (§4.3) — the densest subsystem
//! in the core. Fetches a user's recent posts directly from the platform's
//! internal GraphQL endpoint, tolerating rate limits via credential
//! rotation and circuit breaking.

mod client;
mod parser;
mod queries;
mod scraper;
mod signing;
mod tweet;

pub use client::GraphQlClient;
pub use scraper::{scrape_user, sleep_uniform};
pub use tweet::{Media, MediaType, Tweet};
