use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use uuid::Uuid;

use super::schema::Database;
use super::types::{current_time, is_unique_violation, Account, DatabaseError, FeedFollow, GraphError};

/// Insert a follow row on an existing connection or transaction.
///
/// Shared by `follow` and by `create_feed`, which must write the creator's follow
/// inside the same transaction as the feed itself.
pub(crate) async fn insert_follow(
    conn: &mut SqliteConnection,
    account_id: Uuid,
    feed_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Uuid, sqlx::Error> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO feed_follows (id, account_id, feed_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
    "#,
    )
    .bind(id)
    .bind(account_id)
    .bind(feed_id)
    .bind(now.timestamp_millis())
    .bind(now.timestamp_millis())
    .execute(conn)
    .await?;
    Ok(id)
}

impl Database {
    // ========================================================================
    // Subscription Graph
    // ========================================================================

    /// Follow the feed registered under `feed_url`.
    ///
    /// # Errors
    ///
    /// - [`GraphError::FeedNotFound`] if no feed has that URL
    /// - [`GraphError::AlreadyFollowing`] if the account already follows it
    pub async fn follow(&self, account: &Account, feed_url: &str) -> Result<FeedFollow, GraphError> {
        let feed = self.get_feed_by_url(feed_url).await?;
        let now = current_time();

        let mut conn = self.pool.acquire().await?;
        let id = match insert_follow(&mut conn, account.id, feed.id, now).await {
            Ok(id) => id,
            Err(e) if is_unique_violation(&e) => {
                return Err(GraphError::AlreadyFollowing {
                    account: account.name.clone(),
                    feed: feed.name,
                })
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(account = %account.name, feed = %feed.name, "Feed followed");
        Ok(FeedFollow {
            id,
            account_id: account.id,
            feed_id: feed.id,
            account_name: account.name.clone(),
            feed_name: feed.name,
            created_at: now,
            updated_at: now,
        })
    }

    /// Stop following the feed registered under `feed_url`.
    ///
    /// Idempotent: returns `Ok(false)` when the account was not following the feed.
    /// An unknown URL is still an error ([`GraphError::FeedNotFound`]).
    pub async fn unfollow(&self, account: &Account, feed_url: &str) -> Result<bool, GraphError> {
        let feed = self.get_feed_by_url(feed_url).await?;

        let result = sqlx::query("DELETE FROM feed_follows WHERE account_id = ? AND feed_id = ?")
            .bind(account.id)
            .bind(feed.id)
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected() > 0;
        if removed {
            tracing::info!(account = %account.name, feed = %feed.name, "Feed unfollowed");
        } else {
            tracing::debug!(account = %account.name, feed = %feed.name, "Unfollow: was not following");
        }
        Ok(removed)
    }

    /// Names of the feeds an account follows, oldest follow first.
    pub async fn list_following(&self, account: &Account) -> Result<Vec<String>, DatabaseError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT f.name
            FROM feed_follows ff
            JOIN feeds f ON f.id = ff.feed_id
            WHERE ff.account_id = ?
            ORDER BY ff.created_at, ff.rowid
        "#,
        )
        .bind(account.id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    /// Names of the accounts following the feed at `feed_url`, sorted by name.
    pub async fn list_followers(&self, feed_url: &str) -> Result<Vec<String>, GraphError> {
        let feed = self.get_feed_by_url(feed_url).await?;
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT a.name
            FROM feed_follows ff
            JOIN accounts a ON a.id = ff.account_id
            WHERE ff.feed_id = ?
            ORDER BY a.name
        "#,
        )
        .bind(feed.id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(name,)| name).collect())
    }
}
