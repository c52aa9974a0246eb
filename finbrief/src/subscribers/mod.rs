use anyhow::Result;
use chrono::{DateTime, Utc};
use common::StoreConnection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::messenger::Messenger;

pub mod sqlite;
pub mod supabase;

pub use sqlite::SqliteSubscriberStore;
pub use supabase::SupabaseSubscriberStore;

/// One row of the `subscribers` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Subscriber {
    pub id: String,
    pub email: String,
    pub is_active: bool,
    pub unsubscribe_token: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub welcome_email_sent: bool,
}

/// Row access for subscriber addresses. Lookups are by equality on email, id or token.
#[async_trait::async_trait]
pub trait SubscriberStore: Send + Sync {
    /// Active subscribers, oldest first
    async fn list_active(&self) -> Result<Vec<Subscriber>>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Subscriber>>;

    /// Insert an active subscriber with a fresh unsubscribe token
    async fn insert(&self, email: &str) -> Result<Subscriber>;

    async fn set_active(&self, id: &str, active: bool) -> Result<()>;

    async fn mark_welcome_sent(&self, id: &str) -> Result<()>;

    /// Returns false when no row carries this token
    async fn deactivate_by_token(&self, token: &str) -> Result<bool>;
}

/// Open the configured backend.
pub async fn connect_store(connection: &StoreConnection, timeout_secs: u64) -> Result<Arc<dyn SubscriberStore>> {
    match connection {
        StoreConnection::Sqlite { url } => {
            let store = SqliteSubscriberStore::connect(url).await?;
            Ok(Arc::new(store))
        }
        StoreConnection::Supabase { url, service_key } => {
            let store = SupabaseSubscriberStore::new(url, service_key, Duration::from_secs(timeout_secs))?;
            Ok(Arc::new(store))
        }
    }
}

/// Result of a subscription request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Created,
    Reactivated,
    AlreadySubscribed,
    InvalidEmail,
}

/// Result of an unsubscribe request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsubscribeOutcome {
    Unsubscribed,
    NotFound,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Loose structural check: one `@`, non-empty local part, dotted domain, no whitespace.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let mut parts = email.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..")
}

/// Register an address, or reactivate it if it was unsubscribed.
///
/// New subscribers get a welcome email when a messenger is available. Once the row
/// is stored the subscription counts as created: a failed welcome email, or a failed
/// update of `welcome_email_sent`, is only logged.
pub async fn subscribe(
    store: &dyn SubscriberStore,
    messenger: Option<&Messenger>,
    raw_email: &str,
) -> Result<SubscribeOutcome> {
    let email = normalize_email(raw_email);
    if !is_valid_email(&email) {
        return Ok(SubscribeOutcome::InvalidEmail);
    }

    if let Some(existing) = store.find_by_email(&email).await? {
        if existing.is_active {
            return Ok(SubscribeOutcome::AlreadySubscribed);
        }
        store.set_active(&existing.id, true).await?;
        info!(id = %existing.id, "subscription reactivated");
        return Ok(SubscribeOutcome::Reactivated);
    }

    let subscriber = store.insert(&email).await?;
    info!(id = %subscriber.id, "new subscriber stored");

    if let Some(messenger) = messenger {
        match messenger.send_welcome(&subscriber).await {
            Ok(_) => {
                if let Err(e) = store.mark_welcome_sent(&subscriber.id).await {
                    warn!(id = %subscriber.id, "failed to flag welcome email as sent: {:#}", e);
                }
            }
            Err(e) => warn!(id = %subscriber.id, "welcome email failed: {:#}", e),
        }
    }

    Ok(SubscribeOutcome::Created)
}

pub async fn unsubscribe(store: &dyn SubscriberStore, token: &str) -> Result<UnsubscribeOutcome> {
    if token.trim().is_empty() {
        return Ok(UnsubscribeOutcome::NotFound);
    }
    if store.deactivate_by_token(token.trim()).await? {
        info!("subscriber deactivated by token");
        Ok(UnsubscribeOutcome::Unsubscribed)
    } else {
        Ok(UnsubscribeOutcome::NotFound)
    }
}
