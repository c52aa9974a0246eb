use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::affiliate::AffiliateLink;
use crate::mailer::{Mailer, OutgoingEmail};
use crate::model::AnalysisResult;
use crate::render;
use crate::subscribers::{Subscriber, SubscriberStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    Sent { message_id: String },
    Failed { reason: String },
}

/// What happened to the email for one subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub email: String,
    pub status: DeliveryStatus,
}

impl DeliveryOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self.status, DeliveryStatus::Sent { .. })
    }
}

/// Per-subscriber outcomes of one dispatch, in subscriber order.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    pub outcomes: Vec<DeliveryOutcome>,
}

/// Compact JSON view of a dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchSummary {
    pub success: bool,
    pub emails_sent: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DispatchReport {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn sent_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_sent()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.total() - self.sent_count()
    }

    /// At least one email went out, or there was nobody to send to.
    pub fn success(&self) -> bool {
        self.sent_count() > 0 || self.total() == 0
    }

    pub fn summary(&self) -> DispatchSummary {
        let failed = self.failed_count();
        DispatchSummary {
            success: self.success(),
            emails_sent: self.sent_count(),
            error: (failed > 0).then(|| format!("{} email(s) failed", failed)),
        }
    }
}

/// Renders briefings and welcome emails and hands them to the mailer.
pub struct Messenger {
    store: Arc<dyn SubscriberStore>,
    mailer: Arc<dyn Mailer>,
    from: String,
    base_url: String,
    max_concurrent_sends: usize,
}

impl Messenger {
    pub fn new(
        store: Arc<dyn SubscriberStore>,
        mailer: Arc<dyn Mailer>,
        from: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            mailer,
            from: from.into(),
            base_url: base_url.into(),
            max_concurrent_sends: 10,
        }
    }

    pub fn with_max_concurrent_sends(mut self, n: usize) -> Self {
        self.max_concurrent_sends = n.max(1);
        self
    }

    /// Send today's briefing to every active subscriber.
    pub async fn send(
        &self,
        analysis: &AnalysisResult,
        affiliate_links: Option<&[AffiliateLink]>,
    ) -> Result<DispatchReport> {
        self.send_on(analysis, affiliate_links, Utc::now().date_naive())
            .await
    }

    /// Same as [`Messenger::send`] with an explicit briefing date.
    pub async fn send_on(
        &self,
        analysis: &AnalysisResult,
        affiliate_links: Option<&[AffiliateLink]>,
        date: NaiveDate,
    ) -> Result<DispatchReport> {
        let subscribers = self
            .store
            .list_active()
            .await
            .context("failed to load active subscribers")?;

        if subscribers.is_empty() {
            info!("no active subscribers, nothing to send");
            return Ok(DispatchReport::default());
        }

        info!(count = subscribers.len(), "sending briefing emails");
        let subject = render::email_subject(date);

        let outcomes: Vec<DeliveryOutcome> = stream::iter(subscribers)
            .map(|subscriber| {
                let unsubscribe = render::unsubscribe_url(&self.base_url, &subscriber.unsubscribe_token);
                let email = OutgoingEmail {
                    from: self.from.clone(),
                    to: vec![subscriber.email.clone()],
                    subject: subject.clone(),
                    html: render::render_briefing_email(analysis, affiliate_links, &unsubscribe, date),
                };
                async move {
                    let status = match self.mailer.send(&email).await {
                        Ok(message_id) => DeliveryStatus::Sent { message_id },
                        Err(e) => {
                            warn!(email = %subscriber.email, "send failed: {:#}", e);
                            DeliveryStatus::Failed {
                                reason: format!("{:#}", e),
                            }
                        }
                    };
                    DeliveryOutcome {
                        email: subscriber.email,
                        status,
                    }
                }
            })
            .buffered(self.max_concurrent_sends)
            .collect()
            .await;

        let report = DispatchReport { outcomes };
        info!(
            sent = report.sent_count(),
            failed = report.failed_count(),
            "email dispatch finished"
        );
        Ok(report)
    }

    /// One-off welcome email for a new subscriber. Returns the message id.
    pub async fn send_welcome(&self, subscriber: &Subscriber) -> Result<String> {
        let unsubscribe = render::unsubscribe_url(&self.base_url, &subscriber.unsubscribe_token);
        let email = OutgoingEmail {
            from: self.from.clone(),
            to: vec![subscriber.email.clone()],
            subject: render::WELCOME_SUBJECT.to_string(),
            html: render::render_welcome_email(&unsubscribe),
        };
        self.mailer
            .send(&email)
            .await
            .with_context(|| format!("welcome email to {} failed", subscriber.email))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(email: &str, ok: bool) -> DeliveryOutcome {
        DeliveryOutcome {
            email: email.into(),
            status: if ok {
                DeliveryStatus::Sent { message_id: "m".into() }
            } else {
                DeliveryStatus::Failed { reason: "boom".into() }
            },
        }
    }

    #[test]
    fn empty_report_is_success() {
        let summary = DispatchReport::default().summary();
        assert_eq!(
            summary,
            DispatchSummary {
                success: true,
                emails_sent: 0,
                error: None
            }
        );
        assert_eq!(
            serde_json::to_value(&summary).unwrap(),
            serde_json::json!({"success": true, "emailsSent": 0})
        );
    }

    #[test]
    fn partial_failure_still_succeeds() {
        let report = DispatchReport {
            outcomes: vec![outcome("a@x.com", true), outcome("b@x.com", false)],
        };
        let summary = report.summary();
        assert!(summary.success);
        assert_eq!(summary.emails_sent, 1);
        assert_eq!(summary.error.as_deref(), Some("1 email(s) failed"));
    }

    #[test]
    fn all_failed_is_not_success() {
        let report = DispatchReport {
            outcomes: vec![outcome("a@x.com", false), outcome("b@x.com", false)],
        };
        assert!(!report.success());
        assert_eq!(report.summary().error.as_deref(), Some("2 email(s) failed"));
    }
}
