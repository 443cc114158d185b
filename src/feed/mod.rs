//! Feed retrieval and normalization.
//!
//! - [`parser`] - RSS 2.0 decoding into a [`NormalizedFeed`], with per-entry recovery
//! - [`fetcher`] - Bounded HTTP retrieval and the fetch, parse, persist pipeline
//!
//! # Example
//!
//! ```no_run
//! use feedagg::feed::{build_client, refresh_feed, FetchOptions, DEFAULT_USER_AGENT};
//! use feedagg::storage::Database;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let db = Database::open("feedagg.db").await?;
//! let client = build_client(DEFAULT_USER_AGENT)?;
//! let feed = db.get_feed_by_url("https://blog.example.com/index.xml").await?;
//! let outcome = refresh_feed(&db, &client, &feed, &FetchOptions::default()).await?;
//! println!("{} new posts", outcome.inserted);
//! # Ok(())
//! # }
//! ```

mod fetcher;
mod parser;

pub use fetcher::{
    build_client, fetch_document, refresh_feed, FetchError, FetchOptions, RefreshError,
    RefreshOutcome, DEFAULT_FETCH_TIMEOUT, DEFAULT_MAX_FEED_SIZE, DEFAULT_USER_AGENT,
};
pub use parser::{
    parse_feed, parse_pub_date, NormalizedEntry, NormalizedFeed, ParseError, ParseResult,
    PUB_DATE_FORMAT,
};
