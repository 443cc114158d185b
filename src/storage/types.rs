use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::util::UrlValidationError;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// The store cannot be reached at all (file unopenable, pool exhausted, I/O failure).
    ///
    /// This is the only storage error that callers treat as process-fatal.
    #[error("Database unavailable: {0}")]
    Unavailable(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[source] sqlx::Error),
}

impl DatabaseError {
    /// Classify a sqlx error, separating "store unreachable" from ordinary query failures.
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DatabaseError::Unavailable(err.to_string())
            }
            err => {
                // SQLITE_CANTOPEN (14) and SQLITE_IOERR (10) surface as messages only
                let error_string = err.to_string().to_lowercase();
                if error_string.contains("unable to open database file")
                    || error_string.contains("disk i/o error")
                {
                    DatabaseError::Unavailable(err.to_string())
                } else {
                    DatabaseError::Other(err)
                }
            }
        }
    }

    /// True when the store cannot be reached and retrying the same work is pointless.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, DatabaseError::Unavailable(_))
    }
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        DatabaseError::from_sqlx(err)
    }
}

/// Errors reported by account and subscription graph operations.
///
/// Usage, not-found, and conflict errors never leave partial state behind.
#[derive(Debug, Error)]
pub enum GraphError {
    /// A required name argument was empty
    #[error("{0} name must not be empty")]
    EmptyName(&'static str),

    /// The feed URL failed validation
    #[error(transparent)]
    InvalidUrl(#[from] UrlValidationError),

    /// Registering an account name that is taken
    #[error("An account named '{0}' already exists")]
    DuplicateAccount(String),

    /// Looking up an account name that was never registered
    #[error("No account named '{0}'")]
    AccountNotFound(String),

    /// Registering a feed URL that is already registered
    #[error("A feed is already registered for {0}")]
    DuplicateFeed(String),

    /// Resolving a feed URL that was never registered
    #[error("No feed is registered for {0}")]
    FeedNotFound(String),

    /// Following a feed twice
    #[error("{account} is already following {feed}")]
    AlreadyFollowing { account: String, feed: String },

    /// An operation that needs an account ran without a session
    #[error("Not logged in: run `feedagg login <name>` or `feedagg register <name>` first")]
    NotLoggedIn,

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<sqlx::Error> for GraphError {
    fn from(err: sqlx::Error) -> Self {
        GraphError::Database(DatabaseError::from_sqlx(err))
    }
}

/// True if the error is a UNIQUE constraint violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

// ============================================================================
// Timestamps
// ============================================================================

/// Current time truncated to millisecond precision, the resolution timestamps are stored at.
pub(crate) fn current_time() -> DateTime<Utc> {
    from_millis(Utc::now().timestamp_millis())
}

pub(crate) fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

// ============================================================================
// Helper Types
// ============================================================================

/// A normalized feed entry ready to be stored as a post
#[derive(Debug, Clone)]
pub struct NewPost {
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct AccountRow {
    pub id: Uuid,
    pub name: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Account {
            id: row.id,
            name: row.name,
            created_at: from_millis(row.created_at),
            updated_at: from_millis(row.updated_at),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FeedRow {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub owner_account_id: Uuid,
    pub last_fetched_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<FeedRow> for Feed {
    fn from(row: FeedRow) -> Self {
        Feed {
            id: row.id,
            name: row.name,
            url: row.url,
            owner_account_id: row.owner_account_id,
            last_fetched_at: row.last_fetched_at.map(from_millis),
            created_at: from_millis(row.created_at),
            updated_at: from_millis(row.updated_at),
        }
    }
}

/// Feed joined with its creator's name (used by list_feeds)
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FeedWithCreatorRow {
    #[sqlx(flatten)]
    pub feed: FeedRow,
    pub creator_name: String,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PostRow {
    pub id: Uuid,
    pub feed_id: Uuid,
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub published_at: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<PostRow> for Post {
    fn from(row: PostRow) -> Self {
        Post {
            id: row.id,
            feed_id: row.feed_id,
            url: row.url,
            title: row.title,
            description: row.description,
            published_at: from_millis(row.published_at),
            created_at: from_millis(row.created_at),
            updated_at: from_millis(row.updated_at),
        }
    }
}

/// Post joined with the name of its feed (used by browse)
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PostWithFeedRow {
    #[sqlx(flatten)]
    pub post: PostRow,
    pub feed_name: String,
}

// ============================================================================
// Data Structures
// ============================================================================

/// A registered identity. Names are unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A subscribable source identified by a unique URL.
///
/// `last_fetched_at` is `None` until the scheduler claims the feed for the first time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feed {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub owner_account_id: Uuid,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Feed listing entry with the name of the account that registered it
#[derive(Debug, Clone)]
pub struct FeedWithCreator {
    pub feed: Feed,
    pub creator_name: String,
}

impl From<FeedWithCreatorRow> for FeedWithCreator {
    fn from(row: FeedWithCreatorRow) -> Self {
        FeedWithCreator {
            feed: row.feed.into(),
            creator_name: row.creator_name,
        }
    }
}

/// An account-to-feed subscription
#[derive(Debug, Clone)]
pub struct FeedFollow {
    pub id: Uuid,
    pub account_id: Uuid,
    pub feed_id: Uuid,
    pub account_name: String,
    pub feed_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A stored feed entry. URLs are unique across all feeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: Uuid,
    pub feed_id: Uuid,
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub published_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Browse result entry
#[derive(Debug, Clone)]
pub struct PostWithFeed {
    pub post: Post,
    pub feed_name: String,
}

impl From<PostWithFeedRow> for PostWithFeed {
    fn from(row: PostWithFeedRow) -> Self {
        PostWithFeed {
            post: row.post.into(),
            feed_name: row.feed_name,
        }
    }
}
