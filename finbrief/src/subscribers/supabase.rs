use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use super::{Subscriber, SubscriberStore};

/// Subscriber rows behind a Supabase (PostgREST) endpoint, authenticated with the service-role key.
pub struct SupabaseSubscriberStore {
    table_url: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct NewRow<'a> {
    email: &'a str,
    is_active: bool,
    unsubscribe_token: String,
    welcome_email_sent: bool,
}

impl SupabaseSubscriberStore {
    pub fn new(base_url: &str, service_key: &str, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "apikey",
            HeaderValue::from_str(service_key).context("service key is not a valid header value")?,
        );
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", service_key))
                .context("service key is not a valid header value")?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .context("failed to build Supabase client")?;

        Ok(Self {
            table_url: format!("{}/rest/v1/subscribers", base_url.trim_end_matches('/')),
            client,
        })
    }

    async fn select(&self, query: &[(&str, String)]) -> Result<Vec<Subscriber>> {
        let resp = self
            .client
            .get(&self.table_url)
            .query(&[("select", "*".to_string())])
            .query(query)
            .send()
            .await
            .context("Supabase select failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Supabase select returned {}: {}", status, body);
        }

        resp.json::<Vec<Subscriber>>()
            .await
            .context("failed to decode subscriber rows")
    }

    async fn patch(&self, filter: (&str, String), body: serde_json::Value) -> Result<Vec<Subscriber>> {
        let resp = self
            .client
            .patch(&self.table_url)
            .query(&[filter])
            .header("Prefer", "return=representation")
            .json(&body)
            .send()
            .await
            .context("Supabase update failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Supabase update returned {}: {}", status, body);
        }

        resp.json::<Vec<Subscriber>>()
            .await
            .context("failed to decode updated rows")
    }
}

fn eq(value: &str) -> String {
    format!("eq.{}", value)
}

#[async_trait::async_trait]
impl SubscriberStore for SupabaseSubscriberStore {
    async fn list_active(&self) -> Result<Vec<Subscriber>> {
        let rows = self
            .select(&[("is_active", eq("true")), ("order", "created_at.asc".to_string())])
            .await?;
        debug!(count = rows.len(), "loaded active subscribers");
        Ok(rows)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Subscriber>> {
        let rows = self.select(&[("email", eq(email))]).await?;
        Ok(rows.into_iter().next())
    }

    async fn insert(&self, email: &str) -> Result<Subscriber> {
        let row = NewRow {
            email,
            is_active: true,
            unsubscribe_token: Uuid::new_v4().simple().to_string(),
            welcome_email_sent: false,
        };

        let resp = self
            .client
            .post(&self.table_url)
            .header("Prefer", "return=representation")
            .json(&row)
            .send()
            .await
            .context("Supabase insert failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Supabase insert returned {}: {}", status, body);
        }

        let rows: Vec<Subscriber> = resp.json().await.context("failed to decode inserted row")?;
        rows.into_iter()
            .next()
            .context("Supabase insert returned no row")
    }

    async fn set_active(&self, id: &str, active: bool) -> Result<()> {
        self.patch(
            ("id", eq(id)),
            json!({ "is_active": active, "updated_at": chrono::Utc::now() }),
        )
        .await?;
        Ok(())
    }

    async fn mark_welcome_sent(&self, id: &str) -> Result<()> {
        self.patch(("id", eq(id)), json!({ "welcome_email_sent": true }))
            .await?;
        Ok(())
    }

    async fn deactivate_by_token(&self, token: &str) -> Result<bool> {
        let rows = self
            .patch(
                ("unsubscribe_token", eq(token)),
                json!({ "is_active": false, "updated_at": chrono::Utc::now() }),
            )
            .await?;
        Ok(!rows.is_empty())
    }
}
