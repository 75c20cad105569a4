//! User directory: profiles keyed by username and ledger address.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tracing::info;

use crate::errors::Result;

/// A directory profile as embedded in campaign views.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserProfile {
    pub username: String,
    pub email: String,
    pub address: String,
    pub avatar: String,
}

impl UserProfile {
    /// Placeholder for a ledger address with no directory entry.
    pub fn unresolved(address: &str) -> Self {
        Self {
            address: address.to_string(),
            ..Self::default()
        }
    }
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_by_username(&self, username: &str) -> Result<Option<UserProfile>>;
    async fn get_by_address(&self, address: &str) -> Result<Option<UserProfile>>;
}

/// Establish a SQLite connection pool and run pending migrations.
pub async fn init_pool(database_url: &str, max_connections: u32) -> Result<SqlitePool> {
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(&url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

#[derive(Clone)]
pub struct SqliteDirectory {
    pool: SqlitePool,
}

impl SqliteDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace a profile. The account service owns this table in
    /// production; this is used for seeding local databases.
    pub async fn upsert(&self, profile: &UserProfile) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (username, email, address, avatar)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (username) DO UPDATE
               SET email = excluded.email,
                   address = excluded.address,
                   avatar = excluded.avatar
            "#,
        )
        .bind(&profile.username)
        .bind(&profile.email)
        .bind(&profile.address)
        .bind(&profile.avatar)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for SqliteDirectory {
    async fn get_by_username(&self, username: &str) -> Result<Option<UserProfile>> {
        let row = sqlx::query_as::<_, UserProfile>(
            "SELECT username, email, address, avatar FROM users WHERE username = ?1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_by_address(&self, address: &str) -> Result<Option<UserProfile>> {
        let row = sqlx::query_as::<_, UserProfile>(
            "SELECT username, email, address, avatar FROM users WHERE address = ?1",
        )
        .bind(address)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn directory() -> SqliteDirectory {
        // A single connection keeps every query on the same in-memory database.
        let pool = init_pool("sqlite::memory:", 1).await.unwrap();
        SqliteDirectory::new(pool)
    }

    fn alice() -> UserProfile {
        UserProfile {
            username: "alice".into(),
            email: "alice@example.org".into(),
            address: "0xa11ce".into(),
            avatar: "img://alice".into(),
        }
    }

    #[tokio::test]
    async fn lookup_by_username_and_address() {
        let dir = directory().await;
        dir.upsert(&alice()).await.unwrap();

        assert_eq!(dir.get_by_username("alice").await.unwrap(), Some(alice()));
        assert_eq!(dir.get_by_address("0xa11ce").await.unwrap(), Some(alice()));
    }

    #[tokio::test]
    async fn absent_profiles_are_none() {
        let dir = directory().await;
        assert_eq!(dir.get_by_username("ghost").await.unwrap(), None);
        assert_eq!(dir.get_by_address("0xdead").await.unwrap(), None);
    }

    #[tokio::test]
    async fn upsert_replaces_fields() {
        let dir = directory().await;
        dir.upsert(&alice()).await.unwrap();
        let mut updated = alice();
        updated.avatar = "img://alice-2".into();
        dir.upsert(&updated).await.unwrap();
        assert_eq!(
            dir.get_by_username("alice").await.unwrap().unwrap().avatar,
            "img://alice-2"
        );
    }

    #[test]
    fn unresolved_keeps_only_address() {
        let p = UserProfile::unresolved("0xabc");
        assert_eq!(p.address, "0xabc");
        assert!(p.username.is_empty() && p.email.is_empty() && p.avatar.is_empty());
    }
}
