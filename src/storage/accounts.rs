use uuid::Uuid;

use super::schema::Database;
use super::types::{
    current_time, is_unique_violation, Account, AccountRow, DatabaseError, GraphError,
};

impl Database {
    // ========================================================================
    // Account Operations
    // ========================================================================

    /// Register a new account.
    ///
    /// The name is trimmed before storage. Fails with `GraphError::DuplicateAccount`
    /// if the name is taken (enforced by the UNIQUE constraint, not a pre-check).
    pub async fn create_account(&self, name: &str) -> Result<Account, GraphError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(GraphError::EmptyName("Account"));
        }

        let now = current_time();
        let account = Account {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        };

        let result = sqlx::query(
            "INSERT INTO accounts (id, name, created_at, updated_at) VALUES (?, ?, ?, ?)",
        )
        .bind(account.id)
        .bind(&account.name)
        .bind(now.timestamp_millis())
        .bind(now.timestamp_millis())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                tracing::info!(account = %account.name, id = %account.id, "Account created");
                Ok(account)
            }
            Err(e) if is_unique_violation(&e) => Err(GraphError::DuplicateAccount(name.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Look up an account by its exact name.
    pub async fn get_account_by_name(&self, name: &str) -> Result<Account, GraphError> {
        let row = sqlx::query_as::<_, AccountRow>(
            "SELECT id, name, created_at, updated_at FROM accounts WHERE name = ?",
        )
        .bind(name.trim())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Account::from)
            .ok_or_else(|| GraphError::AccountNotFound(name.trim().to_string()))
    }

    /// All accounts, ordered by name.
    pub async fn list_accounts(&self) -> Result<Vec<Account>, DatabaseError> {
        let rows = sqlx::query_as::<_, AccountRow>(
            "SELECT id, name, created_at, updated_at FROM accounts ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Account::from).collect())
    }

    /// Delete every account. Feeds, follows, and posts go with them (ON DELETE CASCADE).
    ///
    /// Returns the number of accounts removed.
    pub async fn reset(&self) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM accounts")
            .execute(&self.pool)
            .await?;
        tracing::warn!(accounts = result.rows_affected(), "All accounts deleted");
        Ok(result.rows_affected())
    }
}
