use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::follows::insert_follow;
use super::schema::Database;
use super::types::{
    current_time, is_unique_violation, Account, DatabaseError, Feed, FeedRow, FeedWithCreator,
    FeedWithCreatorRow, GraphError,
};
use crate::util::validate_url;

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Register a feed and make its creator follow it.
    ///
    /// The feed row and the creator's follow row are written in one transaction,
    /// so a feed never exists without at least its creator as a follower.
    ///
    /// # Errors
    ///
    /// - [`GraphError::EmptyName`] / [`GraphError::InvalidUrl`] before anything is written
    /// - [`GraphError::DuplicateFeed`] if the URL is already registered
    pub async fn create_feed(
        &self,
        owner: &Account,
        name: &str,
        url: &str,
    ) -> Result<Feed, GraphError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(GraphError::EmptyName("Feed"));
        }
        let url = url.trim();
        validate_url(url)?;

        let now = current_time();
        let feed = Feed {
            id: Uuid::new_v4(),
            name: name.to_string(),
            url: url.to_string(),
            owner_account_id: owner.id,
            last_fetched_at: None,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO feeds (id, name, url, owner_account_id, last_fetched_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, NULL, ?, ?)
        "#,
        )
        .bind(feed.id)
        .bind(&feed.name)
        .bind(&feed.url)
        .bind(feed.owner_account_id)
        .bind(now.timestamp_millis())
        .bind(now.timestamp_millis())
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            // Dropping tx rolls back
            Err(e) if is_unique_violation(&e) => {
                return Err(GraphError::DuplicateFeed(url.to_string()))
            }
            Err(e) => return Err(e.into()),
        }

        insert_follow(&mut tx, owner.id, feed.id, now).await?;
        tx.commit().await?;

        tracing::info!(
            feed_id = %feed.id,
            url = %feed.url,
            owner = %owner.name,
            "Feed created and followed by its creator"
        );
        Ok(feed)
    }

    /// Resolve a feed by its URL.
    pub async fn get_feed_by_url(&self, url: &str) -> Result<Feed, GraphError> {
        let url = url.trim();
        let row = sqlx::query_as::<_, FeedRow>(
            r#"
            SELECT id, name, url, owner_account_id, last_fetched_at, created_at, updated_at
            FROM feeds
            WHERE url = ?
        "#,
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Feed::from)
            .ok_or_else(|| GraphError::FeedNotFound(url.to_string()))
    }

    /// All feeds system-wide with their creator's name, in creation order.
    pub async fn list_feeds(&self) -> Result<Vec<FeedWithCreator>, DatabaseError> {
        let rows = sqlx::query_as::<_, FeedWithCreatorRow>(
            r#"
            SELECT f.id, f.name, f.url, f.owner_account_id, f.last_fetched_at,
                   f.created_at, f.updated_at, a.name AS creator_name
            FROM feeds f
            JOIN accounts a ON a.id = f.owner_account_id
            ORDER BY f.created_at, f.rowid
        "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(FeedWithCreator::from).collect())
    }

    // ========================================================================
    // Scheduler Operations
    // ========================================================================

    /// Peek at the feed the scheduler would refresh next, without claiming it.
    ///
    /// Never-fetched feeds come first (in creation order), then fetched feeds by
    /// ascending `last_fetched_at`. Creation time and insertion order break ties.
    pub async fn next_feed_to_fetch(&self) -> Result<Option<Feed>, DatabaseError> {
        let row = sqlx::query_as::<_, FeedRow>(
            r#"
            SELECT id, name, url, owner_account_id, last_fetched_at, created_at, updated_at
            FROM feeds
            ORDER BY last_fetched_at IS NOT NULL, last_fetched_at ASC, created_at ASC, rowid ASC
            LIMIT 1
        "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Feed::from))
    }

    /// Select the next due feed and stamp it as fetched at `at`, in one statement.
    ///
    /// The stamp is committed before any network work happens: a feed whose fetch
    /// fails goes to the back of the rotation instead of being retried on the next
    /// tick. Returns `None` when there are no feeds, or when `at` is not later than
    /// the due feed's current stamp (`last_fetched_at` never moves backwards).
    pub async fn claim_next_feed(&self, at: DateTime<Utc>) -> Result<Option<Feed>, DatabaseError> {
        let at = at.timestamp_millis();
        let row = sqlx::query_as::<_, FeedRow>(
            r#"
            UPDATE feeds
            SET last_fetched_at = ?, updated_at = ?
            WHERE id = (
                SELECT id FROM feeds
                ORDER BY last_fetched_at IS NOT NULL, last_fetched_at ASC, created_at ASC, rowid ASC
                LIMIT 1
            )
            AND (last_fetched_at IS NULL OR last_fetched_at < ?)
            RETURNING id, name, url, owner_account_id, last_fetched_at, created_at, updated_at
        "#,
        )
        .bind(at)
        .bind(at)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Feed::from))
    }

    /// Stamp a feed as fetched at `at`. Forward-only: returns `false` and changes
    /// nothing if the stored stamp is already at or after `at`.
    pub async fn mark_feed_fetched(
        &self,
        feed_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let at = at.timestamp_millis();
        let result = sqlx::query(
            r#"
            UPDATE feeds SET last_fetched_at = ?, updated_at = ?
            WHERE id = ? AND (last_fetched_at IS NULL OR last_fetched_at < ?)
        "#,
        )
        .bind(at)
        .bind(at)
        .bind(feed_id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Account, Database, GraphError};
    use chrono::{Duration, Utc};
    use pretty_assertions::assert_eq;

    async fn test_db() -> (Database, Account) {
        let db = Database::open(":memory:").await.unwrap();
        let account = db.create_account("alice").await.unwrap();
        (db, account)
    }

    fn feed_url(i: usize) -> String {
        format!("https://feed{}.example.com/rss", i)
    }

    #[tokio::test]
    async fn test_create_feed() {
        let (db, alice) = test_db().await;
        let feed = db
            .create_feed(&alice, "Example", "https://example.com/rss")
            .await
            .unwrap();

        assert_eq!(feed.name, "Example");
        assert_eq!(feed.owner_account_id, alice.id);
        assert!(feed.last_fetched_at.is_none());

        let fetched = db.get_feed_by_url("https://example.com/rss").await.unwrap();
        assert_eq!(fetched, feed);
    }

    #[tokio::test]
    async fn test_create_feed_follows_creator() {
        let (db, alice) = test_db().await;
        db.create_feed(&alice, "Example", "https://example.com/rss")
            .await
            .unwrap();

        let following = db.list_following(&alice).await.unwrap();
        assert_eq!(following, vec!["Example".to_string()]);
    }

    #[tokio::test]
    async fn test_create_feed_duplicate_url_rejected() {
        let (db, alice) = test_db().await;
        let bob = db.create_account("bob").await.unwrap();
        db.create_feed(&alice, "First", "https://example.com/rss")
            .await
            .unwrap();

        let err = db
            .create_feed(&bob, "Second", "https://example.com/rss")
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::DuplicateFeed(url) if url == "https://example.com/rss"));

        // The rejected attempt left no follow behind
        assert!(db.list_following(&bob).await.unwrap().is_empty());
        assert_eq!(db.list_feeds().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_feed_invalid_url_rejected() {
        let (db, alice) = test_db().await;
        let err = db
            .create_feed(&alice, "Bad", "ftp://example.com/rss")
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::InvalidUrl(_)));

        let err = db.create_feed(&alice, " ", &feed_url(1)).await.unwrap_err();
        assert!(matches!(err, GraphError::EmptyName("Feed")));

        assert!(db.list_feeds().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_feed_by_unknown_url() {
        let (db, _) = test_db().await;
        let err = db.get_feed_by_url("https://nope.example.com").await.unwrap_err();
        assert!(matches!(err, GraphError::FeedNotFound(_)));
    }

    #[tokio::test]
    async fn test_list_feeds_includes_creator() {
        let (db, alice) = test_db().await;
        let bob = db.create_account("bob").await.unwrap();
        db.create_feed(&alice, "A", &feed_url(1)).await.unwrap();
        db.create_feed(&bob, "B", &feed_url(2)).await.unwrap();

        let feeds = db.list_feeds().await.unwrap();
        let listed: Vec<(&str, &str)> = feeds
            .iter()
            .map(|f| (f.feed.name.as_str(), f.creator_name.as_str()))
            .collect();
        assert_eq!(listed, vec![("A", "alice"), ("B", "bob")]);
    }

    #[tokio::test]
    async fn test_next_feed_empty() {
        let (db, _) = test_db().await;
        assert!(db.next_feed_to_fetch().await.unwrap().is_none());
        assert!(db.claim_next_feed(Utc::now()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_never_fetched_in_creation_order() {
        let (db, alice) = test_db().await;
        let first = db.create_feed(&alice, "First", &feed_url(1)).await.unwrap();
        db.create_feed(&alice, "Second", &feed_url(2)).await.unwrap();

        let next = db.next_feed_to_fetch().await.unwrap().unwrap();
        assert_eq!(next.id, first.id);
    }

    #[tokio::test]
    async fn test_never_fetched_before_fetched() {
        let (db, alice) = test_db().await;
        let old = db.create_feed(&alice, "Old", &feed_url(1)).await.unwrap();
        let fresh = db.create_feed(&alice, "Fresh", &feed_url(2)).await.unwrap();

        db.mark_feed_fetched(old.id, Utc::now() - Duration::days(365))
            .await
            .unwrap();

        let next = db.next_feed_to_fetch().await.unwrap().unwrap();
        assert_eq!(next.id, fresh.id);
    }

    #[tokio::test]
    async fn test_oldest_fetch_first() {
        let (db, alice) = test_db().await;
        let a = db.create_feed(&alice, "A", &feed_url(1)).await.unwrap();
        let b = db.create_feed(&alice, "B", &feed_url(2)).await.unwrap();
        let now = Utc::now();

        db.mark_feed_fetched(a.id, now - Duration::minutes(5))
            .await
            .unwrap();
        db.mark_feed_fetched(b.id, now - Duration::hours(2))
            .await
            .unwrap();

        let next = db.next_feed_to_fetch().await.unwrap().unwrap();
        assert_eq!(next.id, b.id);
    }

    #[tokio::test]
    async fn test_claim_rotates_through_feeds() {
        let (db, alice) = test_db().await;
        let a = db.create_feed(&alice, "A", &feed_url(1)).await.unwrap();
        let b = db.create_feed(&alice, "B", &feed_url(2)).await.unwrap();
        let start = Utc::now();

        let claimed: Vec<_> = {
            let mut ids = Vec::new();
            for i in 0..4 {
                let feed = db
                    .claim_next_feed(start + Duration::seconds(i))
                    .await
                    .unwrap()
                    .unwrap();
                ids.push(feed.id);
            }
            ids
        };

        assert_eq!(claimed, vec![a.id, b.id, a.id, b.id]);
    }

    #[tokio::test]
    async fn test_claim_stamps_feed() {
        let (db, alice) = test_db().await;
        db.create_feed(&alice, "A", &feed_url(1)).await.unwrap();
        let at = Utc::now();

        let claimed = db.claim_next_feed(at).await.unwrap().unwrap();
        assert_eq!(
            claimed.last_fetched_at.map(|t| t.timestamp_millis()),
            Some(at.timestamp_millis())
        );
    }

    #[tokio::test]
    async fn test_claim_never_moves_backwards() {
        let (db, alice) = test_db().await;
        let feed = db.create_feed(&alice, "A", &feed_url(1)).await.unwrap();
        let now = Utc::now();
        db.mark_feed_fetched(feed.id, now).await.unwrap();

        let claimed = db
            .claim_next_feed(now - Duration::minutes(1))
            .await
            .unwrap();
        assert!(claimed.is_none());

        let stored = db.get_feed_by_url(&feed.url).await.unwrap();
        assert_eq!(
            stored.last_fetched_at.map(|t| t.timestamp_millis()),
            Some(now.timestamp_millis())
        );
    }

    #[tokio::test]
    async fn test_mark_feed_fetched_forward_only() {
        let (db, alice) = test_db().await;
        let feed = db.create_feed(&alice, "A", &feed_url(1)).await.unwrap();
        let now = Utc::now();

        assert!(db.mark_feed_fetched(feed.id, now).await.unwrap());
        assert!(!db
            .mark_feed_fetched(feed.id, now - Duration::seconds(1))
            .await
            .unwrap());
        assert!(!db.mark_feed_fetched(feed.id, now).await.unwrap());
        assert!(db
            .mark_feed_fetched(feed.id, now + Duration::seconds(1))
            .await
            .unwrap());
    }
}
