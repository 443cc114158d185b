use crate::config::Config;
use crate::storage::{Account, Database, GraphError};

/// A logged-in account, resolved from the configured user name.
///
/// Commands that act on behalf of a user take a `Session` (or its [`Account`])
/// instead of reading the configuration themselves.
#[derive(Debug, Clone)]
pub struct Session {
    account: Account,
}

impl Session {
    /// # Errors
    ///
    /// - [`GraphError::NotLoggedIn`] if no user name is configured
    /// - [`GraphError::AccountNotFound`] if the configured name is not registered
    pub async fn resolve(db: &Database, config: &Config) -> Result<Self, GraphError> {
        let name = config
            .current_user_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .ok_or(GraphError::NotLoggedIn)?;

        let account = db.get_account_by_name(name).await?;
        tracing::debug!(account = %account.name, "Session resolved");
        Ok(Self { account })
    }

    pub fn account(&self) -> &Account {
        &self.account
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_logged_in() {
        let db = Database::open(":memory:").await.unwrap();
        let alice = db.create_account("alice").await.unwrap();
        let mut config = Config::default();
        config.set_current_user("alice");

        let session = Session::resolve(&db, &config).await.unwrap();
        assert_eq!(session.account(), &alice);
    }

    #[tokio::test]
    async fn test_resolve_without_user() {
        let db = Database::open(":memory:").await.unwrap();
        let err = Session::resolve(&db, &Config::default()).await.unwrap_err();
        assert!(matches!(err, GraphError::NotLoggedIn));
    }

    #[tokio::test]
    async fn test_resolve_unregistered_user() {
        let db = Database::open(":memory:").await.unwrap();
        let mut config = Config::default();
        config.set_current_user("ghost");

        let err = Session::resolve(&db, &config).await.unwrap_err();
        assert!(matches!(err, GraphError::AccountNotFound(name) if name == "ghost"));
    }

    #[tokio::test]
    async fn test_resolve_after_reset() {
        let db = Database::open(":memory:").await.unwrap();
        db.create_account("alice").await.unwrap();
        let mut config = Config::default();
        config.set_current_user("alice");
        db.reset().await.unwrap();

        let err = Session::resolve(&db, &config).await.unwrap_err();
        assert!(matches!(err, GraphError::AccountNotFound(_)));
    }
}
