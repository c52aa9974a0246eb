use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One message handed to the transactional mail API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
}

/// Delivery backend. Returns the provider's message id.
#[async_trait::async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<String>;
}

/// Resend HTTP API client (`POST {api_url}/emails`).
pub struct ResendMailer {
    api_url: String,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct ResendResponse {
    id: String,
}

impl ResendMailer {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build mail client")?;
        Ok(Self {
            api_url: api_url.into(),
            api_key: api_key.into(),
            client,
        })
    }
}

#[async_trait::async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<String> {
        let url = format!("{}/emails", self.api_url.trim_end_matches('/'));

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(email)
            .send()
            .await
            .context("mail API request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("mail API error {}: {}", status, body);
        }

        let parsed: ResendResponse = resp.json().await.context("failed to parse mail API response")?;
        Ok(parsed.id)
    }
}
