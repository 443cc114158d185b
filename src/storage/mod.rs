//! SQLite persistence for accounts, feeds, follows, and posts.
//!
//! All operations hang off [`Database`]. Uniqueness (account names, feed URLs,
//! post URLs, one follow per account/feed pair) is enforced by the schema, so
//! concurrent writers racing on the same key see a conflict instead of a duplicate.

mod accounts;
mod feeds;
mod follows;
mod posts;
mod schema;
mod types;

pub use posts::{resolve_browse_limit, DEFAULT_BROWSE_LIMIT, MAX_BROWSE_LIMIT};
pub use schema::Database;
pub(crate) use types::current_time;
pub use types::{
    Account, DatabaseError, Feed, FeedFollow, FeedWithCreator, GraphError, NewPost, Post,
    PostWithFeed,
};
