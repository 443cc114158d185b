use uuid::Uuid;

use super::schema::Database;
use super::types::{current_time, Account, DatabaseError, NewPost, Post, PostRow, PostWithFeed, PostWithFeedRow};
use crate::util::non_empty;

// ============================================================================
// Browse Limits
// ============================================================================

/// Number of posts `browse` returns when no usable limit is given
pub const DEFAULT_BROWSE_LIMIT: i64 = 2;

/// Hard cap on a single browse page
pub const MAX_BROWSE_LIMIT: i64 = 2000;

/// Turn a user-supplied limit into a usable one.
///
/// Missing, unparsable, zero, or negative input falls back to
/// [`DEFAULT_BROWSE_LIMIT`] (with a warning) instead of failing the browse.
/// Values above [`MAX_BROWSE_LIMIT`] are capped.
///
/// ```
/// use feedagg::storage::resolve_browse_limit;
///
/// assert_eq!(resolve_browse_limit(None), 2);
/// assert_eq!(resolve_browse_limit(Some("10")), 10);
/// assert_eq!(resolve_browse_limit(Some("ten")), 2);
/// assert_eq!(resolve_browse_limit(Some("-3")), 2);
/// ```
pub fn resolve_browse_limit(raw: Option<&str>) -> i64 {
    let Some(raw) = raw else {
        return DEFAULT_BROWSE_LIMIT;
    };
    match raw.trim().parse::<i64>() {
        Ok(limit) if limit > 0 => limit.min(MAX_BROWSE_LIMIT),
        Ok(limit) => {
            tracing::warn!(limit = limit, default = DEFAULT_BROWSE_LIMIT, "Non-positive browse limit, using default");
            DEFAULT_BROWSE_LIMIT
        }
        Err(e) => {
            tracing::warn!(input = %raw, error = %e, default = DEFAULT_BROWSE_LIMIT, "Unparsable browse limit, using default");
            DEFAULT_BROWSE_LIMIT
        }
    }
}

impl Database {
    // ========================================================================
    // Post Persistence
    // ========================================================================

    /// Store entries as posts of `feed_id`, returning the number newly inserted.
    ///
    /// Empty or whitespace-only titles and descriptions are stored as NULL.
    /// Insertion is idempotent on URL: an entry whose URL is already stored (by
    /// any feed) is a silent no-op. Each entry is written on its own, so a failing
    /// entry is logged and skipped without affecting its siblings. The only error
    /// that ends the batch early is [`DatabaseError::Unavailable`].
    pub async fn persist_posts(&self, feed_id: Uuid, posts: &[NewPost]) -> Result<usize, DatabaseError> {
        let mut inserted = 0;
        let mut already_present = 0;
        let mut failed = 0;

        for post in posts {
            let now = current_time();
            let result = sqlx::query(
                r#"
                INSERT INTO posts (id, feed_id, url, title, description, published_at, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(url) DO NOTHING
            "#,
            )
            .bind(Uuid::new_v4())
            .bind(feed_id)
            .bind(&post.url)
            .bind(post.title.clone().and_then(non_empty))
            .bind(post.description.clone().and_then(non_empty))
            .bind(post.published_at.timestamp_millis())
            .bind(now.timestamp_millis())
            .bind(now.timestamp_millis())
            .execute(&self.pool)
            .await;

            match result {
                Ok(done) if done.rows_affected() > 0 => {
                    inserted += 1;
                    tracing::debug!(feed_id = %feed_id, url = %post.url, "Post created");
                }
                Ok(_) => already_present += 1,
                Err(e) => match DatabaseError::from_sqlx(e) {
                    unavailable @ DatabaseError::Unavailable(_) => return Err(unavailable),
                    e => {
                        failed += 1;
                        tracing::warn!(feed_id = %feed_id, url = %post.url, error = %e, "Failed to store post, skipping");
                    }
                },
            }
        }

        tracing::debug!(
            feed_id = %feed_id,
            inserted = inserted,
            already_present = already_present,
            failed = failed,
            "Posts persisted"
        );
        Ok(inserted)
    }

    /// Total number of stored posts across all feeds.
    pub async fn count_posts(&self) -> Result<i64, DatabaseError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Posts of one feed, most recently published first.
    pub async fn posts_for_feed(&self, feed_id: Uuid) -> Result<Vec<Post>, DatabaseError> {
        let rows = sqlx::query_as::<_, PostRow>(
            r#"
            SELECT id, feed_id, url, title, description, published_at, created_at, updated_at
            FROM posts
            WHERE feed_id = ?
            ORDER BY published_at DESC, created_at DESC, url ASC
        "#,
        )
        .bind(feed_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Post::from).collect())
    }

    // ========================================================================
    // Timeline
    // ========================================================================

    /// The `limit` most recently published posts from feeds the account follows.
    ///
    /// Non-positive limits use [`DEFAULT_BROWSE_LIMIT`]; limits are capped at
    /// [`MAX_BROWSE_LIMIT`].
    pub async fn browse(&self, account: &Account, limit: i64) -> Result<Vec<PostWithFeed>, DatabaseError> {
        let limit = if limit > 0 {
            limit.min(MAX_BROWSE_LIMIT)
        } else {
            DEFAULT_BROWSE_LIMIT
        };
        tracing::debug!(account = %account.name, limit = limit, "browse");

        let rows = sqlx::query_as::<_, PostWithFeedRow>(
            r#"
            SELECT p.id, p.feed_id, p.url, p.title, p.description, p.published_at,
                   p.created_at, p.updated_at, f.name AS feed_name
            FROM posts p
            JOIN feed_follows ff ON ff.feed_id = p.feed_id
            JOIN feeds f ON f.id = p.feed_id
            WHERE ff.account_id = ?
            ORDER BY p.published_at DESC, p.created_at DESC, p.url ASC
            LIMIT ?
        "#,
        )
        .bind(account.id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(PostWithFeed::from).collect())
    }
}
