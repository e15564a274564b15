/// Core library for the product-intelligence reconnaissance pipeline.
///
/// Contains the data model, configuration, the four pipeline stages
/// (fetch, enrich, organize, write), the microblog direct-scraper
/// subsystem, and the coordinator that wires them together.
pub mod config;
pub mod credential;
pub mod enrich;
pub mod error;
pub mod error_log;
pub mod fetcher;
pub mod llm;
pub mod microblog;
pub mod model;
pub mod organizer;
pub mod pipeline;
pub mod source;
pub mod writer;

pub use error::*;

/// Returns the version of the recon-core library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
