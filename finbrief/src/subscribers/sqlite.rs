use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;
use uuid::Uuid;

use super::{Subscriber, SubscriberStore};

/// Subscriber rows in a local SQLite database.
pub struct SqliteSubscriberStore {
    pool: SqlitePool,
}

impl SqliteSubscriberStore {
    /// Open (creating if needed) the database at `url` and ensure the schema exists.
    ///
    /// Example:
    ///   let store = SqliteSubscriberStore::connect("sqlite://data/finbrief.db").await?;
    pub async fn connect(url: &str) -> Result<Self> {
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");

        if !in_memory {
            let path = url
                .trim_start_matches("sqlite://")
                .trim_start_matches("sqlite:")
                .split('?')
                .next()
                .unwrap_or_default();
            if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await.with_context(|| {
                    format!("Failed to create DB parent directory: {}", parent.display())
                })?;
            }
        }

        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("invalid sqlite url: {}", url))?
            .create_if_missing(true);

        // An in-memory database lives as long as its single connection.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to connect to sqlite database: {}", url))?;

        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS subscribers (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                is_active BOOLEAN NOT NULL DEFAULT 1,
                unsubscribe_token TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                welcome_email_sent BOOLEAN NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to create subscribers table")?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl SubscriberStore for SqliteSubscriberStore {
    async fn list_active(&self) -> Result<Vec<Subscriber>> {
        let rows = sqlx::query_as::<_, Subscriber>(
            "SELECT * FROM subscribers WHERE is_active = 1 ORDER BY created_at, email",
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to query active subscribers")?;
        debug!(count = rows.len(), "loaded active subscribers");
        Ok(rows)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Subscriber>> {
        sqlx::query_as::<_, Subscriber>("SELECT * FROM subscribers WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .context("failed to look up subscriber by email")
    }

    async fn insert(&self, email: &str) -> Result<Subscriber> {
        let now = Utc::now();
        let subscriber = Subscriber {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            is_active: true,
            unsubscribe_token: Uuid::new_v4().simple().to_string(),
            created_at: now,
            updated_at: now,
            welcome_email_sent: false,
        };

        sqlx::query(
            r#"
            INSERT INTO subscribers
            (id, email, is_active, unsubscribe_token, created_at, updated_at, welcome_email_sent)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&subscriber.id)
        .bind(&subscriber.email)
        .bind(subscriber.is_active)
        .bind(&subscriber.unsubscribe_token)
        .bind(subscriber.created_at)
        .bind(subscriber.updated_at)
        .bind(subscriber.welcome_email_sent)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to insert subscriber {}", email))?;

        Ok(subscriber)
    }

    async fn set_active(&self, id: &str, active: bool) -> Result<()> {
        sqlx::query("UPDATE subscribers SET is_active = ?, updated_at = ? WHERE id = ?")
            .bind(active)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to update subscriber {}", id))?;
        Ok(())
    }

    async fn mark_welcome_sent(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE subscribers SET welcome_email_sent = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to flag welcome email for {}", id))?;
        Ok(())
    }

    async fn deactivate_by_token(&self, token: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE subscribers SET is_active = 0, updated_at = ? WHERE unsubscribe_token = ?",
        )
        .bind(Utc::now())
        .bind(token)
        .execute(&self.pool)
        .await
        .context("failed to deactivate subscriber")?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_store() -> SqliteSubscriberStore {
        SqliteSubscriberStore::connect("sqlite::memory:").await.expect("memory store")
    }

    #[tokio::test]
    async fn insert_and_list_active() {
        let store = memory_store().await;
        let a = store.insert("a@example.com").await.unwrap();
        let b = store.insert("b@example.com").await.unwrap();
        assert_ne!(a.unsubscribe_token, b.unsubscribe_token);

        store.set_active(&b.id, false).await.unwrap();

        let active = store.list_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].email, "a@example.com");
        assert!(!active[0].welcome_email_sent);
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let store = memory_store().await;
        store.insert("a@example.com").await.unwrap();
        assert!(store.insert("a@example.com").await.is_err());
    }

    #[tokio::test]
    async fn deactivate_by_unknown_token_reports_false() {
        let store = memory_store().await;
        let a = store.insert("a@example.com").await.unwrap();
        assert!(!store.deactivate_by_token("nope").await.unwrap());
        assert!(store.deactivate_by_token(&a.unsubscribe_token).await.unwrap());

        let found = store.find_by_email("a@example.com").await.unwrap().unwrap();
        assert!(!found.is_active);
    }

    #[tokio::test]
    async fn welcome_flag_is_persisted() {
        let store = memory_store().await;
        let a = store.insert("a@example.com").await.unwrap();
        store.mark_welcome_sent(&a.id).await.unwrap();
        let found = store.find_by_email("a@example.com").await.unwrap().unwrap();
        assert!(found.welcome_email_sent);
    }
}
