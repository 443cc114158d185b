use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

use crate::feed::parser::{parse_feed, ParseError, ParseResult};
use crate::storage::{Database, DatabaseError, Feed, NewPost};
use crate::util::non_empty;

/// User-Agent sent with every feed request unless configured otherwise
pub const DEFAULT_USER_AGENT: &str = concat!("feedagg/", env!("CARGO_PKG_VERSION"));

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while retrieving a feed document.
///
/// None of these are retried here; a failing feed is retried on its next
/// scheduler rotation.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request plus body download exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Response body exceeded the configured size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// Limits applied to a single fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    pub timeout: Duration,
    pub max_size: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_FETCH_TIMEOUT,
            max_size: DEFAULT_MAX_FEED_SIZE,
        }
    }
}

/// Build the shared HTTP client, identified by `user_agent`.
pub fn build_client(user_agent: &str) -> Result<reqwest::Client, FetchError> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .build()
        .map_err(FetchError::Network)
}

/// Retrieve the raw document at `url` with a single GET.
///
/// # Errors
///
/// - [`FetchError::Network`] - Connection, DNS, or TLS errors
/// - [`FetchError::Timeout`] - Request and body took longer than `options.timeout`
/// - [`FetchError::HttpStatus`] - Non-2xx HTTP response
/// - [`FetchError::ResponseTooLarge`] - Body exceeded `options.max_size`
/// - [`FetchError::IncompleteResponse`] - Body shorter than its Content-Length
pub async fn fetch_document(
    client: &reqwest::Client,
    url: &str,
    options: &FetchOptions,
) -> Result<Vec<u8>, FetchError> {
    let retrieval = async {
        let response = client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        read_limited_bytes(response, options.max_size).await
    };

    tokio::time::timeout(options.timeout, retrieval)
        .await
        .map_err(|_| FetchError::Timeout)?
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}

// ============================================================================
// Refresh Pipeline
// ============================================================================

/// Failure of one feed's fetch, parse, and persist pipeline
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl RefreshError {
    /// True when the store itself is unreachable, as opposed to a problem with this feed.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, RefreshError::Database(e) if e.is_unavailable())
    }
}

/// Counts from a successful refresh
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshOutcome {
    /// Posts newly stored by this refresh
    pub inserted: usize,
    /// Entries dropped by the parser (bad date or missing link)
    pub skipped: usize,
}

/// Fetch `feed`, parse it, and store its entries as posts.
///
/// Does not touch `last_fetched_at`; the scheduler stamps the feed when it
/// claims it, before this runs.
pub async fn refresh_feed(
    db: &Database,
    client: &reqwest::Client,
    feed: &Feed,
    options: &FetchOptions,
) -> Result<RefreshOutcome, RefreshError> {
    let bytes = fetch_document(client, &feed.url, options).await?;
    tracing::debug!(feed = %feed.url, bytes = bytes.len(), "Feed document fetched");

    let ParseResult { feed: parsed, skipped } = parse_feed(&bytes)?;

    if skipped > 0 {
        tracing::warn!(feed = %feed.url, skipped = skipped, "Entries skipped while parsing");
    }

    let posts: Vec<NewPost> = parsed
        .entries
        .into_iter()
        .map(|entry| NewPost {
            url: entry.link,
            title: non_empty(entry.title),
            description: non_empty(entry.description),
            published_at: entry.published_at,
        })
        .collect();

    let inserted = db.persist_posts(feed.id, &posts).await?;

    Ok(RefreshOutcome { inserted, skipped })
}
