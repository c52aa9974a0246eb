use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use finbrief::affiliate::contextual_links;
use finbrief::mailer::ResendMailer;
use finbrief::messenger::{DeliveryStatus, Messenger};
use finbrief::model::AnalysisResult;
use finbrief::subscribers::{
    subscribe, SqliteSubscriberStore, SubscribeOutcome, Subscriber, SubscriberStore,
};
use mockito::Matcher;

async fn setup(server: &mockito::Server, emails: &[&str]) -> (Arc<SqliteSubscriberStore>, Messenger) {
    let store = Arc::new(SqliteSubscriberStore::connect("sqlite::memory:").await.unwrap());
    for email in emails {
        store.insert(email).await.unwrap();
    }
    let mailer = ResendMailer::new(server.url(), "re_test_key", Duration::from_secs(5)).unwrap();
    let messenger = Messenger::new(
        store.clone(),
        Arc::new(mailer),
        "FinBrief <brief@finbrief.test>",
        "https://finbrief.test",
    )
    .with_max_concurrent_sends(2);
    (store, messenger)
}

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, 29).unwrap()
}

#[tokio::test]
async fn zero_subscribers_sends_nothing() {
    let mut server = mockito::Server::new_async().await;
    let mock = server.mock("POST", "/emails").expect(0).create_async().await;

    let (_store, messenger) = setup(&server, &[]).await;
    let report = messenger
        .send_on(&AnalysisResult::placeholder(), None, date())
        .await
        .unwrap();

    assert_eq!(
        serde_json::to_value(report.summary()).unwrap(),
        serde_json::json!({"success": true, "emailsSent": 0})
    );
    mock.assert_async().await;
}

#[tokio::test]
async fn every_active_subscriber_gets_one_email() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/emails")
        .match_header("authorization", "Bearer re_test_key")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "from": "FinBrief <brief@finbrief.test>",
            "subject": "📊 FinBrief - 1월 29일 목요일 재테크 브리핑"
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id": "msg_123"}"#)
        .expect(3)
        .create_async()
        .await;

    let (store, messenger) = setup(&server, &["a@example.com", "b@example.com", "c@example.com"]).await;
    let inactive = store.insert("gone@example.com").await.unwrap();
    store.set_active(&inactive.id, false).await.unwrap();

    let analysis = AnalysisResult::placeholder();
    let links = contextual_links(analysis.keywords.as_slice());
    let report = messenger
        .send_on(&analysis, Some(links.as_slice()), date())
        .await
        .unwrap();

    assert_eq!(report.total(), 3);
    assert_eq!(report.sent_count(), 3);
    let emails: Vec<&str> = report.outcomes.iter().map(|o| o.email.as_str()).collect();
    assert_eq!(emails, vec!["a@example.com", "b@example.com", "c@example.com"]);
    assert_eq!(
        report.outcomes[0].status,
        DeliveryStatus::Sent {
            message_id: "msg_123".into()
        }
    );

    mock.assert_async().await;
}

#[tokio::test]
async fn one_failure_does_not_stop_the_others() {
    let mut server = mockito::Server::new_async().await;
    let ok = server
        .mock("POST", "/emails")
        .match_body(Matcher::Regex("good@example\\.com".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id": "msg_ok"}"#)
        .expect(1)
        .create_async()
        .await;
    let bad = server
        .mock("POST", "/emails")
        .match_body(Matcher::Regex("bad@example\\.com".into()))
        .with_status(422)
        .with_body(r#"{"message": "invalid recipient"}"#)
        .expect(1)
        .create_async()
        .await;

    let (_store, messenger) = setup(&server, &["bad@example.com", "good@example.com"]).await;
    let report = messenger
        .send_on(&AnalysisResult::placeholder(), None, date())
        .await
        .unwrap();

    assert_eq!(report.sent_count(), 1);
    assert_eq!(report.failed_count(), 1);
    let failed = report
        .outcomes
        .iter()
        .find(|o| o.email == "bad@example.com")
        .unwrap();
    assert!(matches!(&failed.status, DeliveryStatus::Failed { reason } if reason.contains("422")));

    let summary = report.summary();
    assert!(summary.success);
    assert_eq!(summary.emails_sent, 1);
    assert_eq!(summary.error.as_deref(), Some("1 email(s) failed"));

    ok.assert_async().await;
    bad.assert_async().await;
}

#[tokio::test]
async fn email_links_to_unsubscribe_token() {
    let mut server = mockito::Server::new_async().await;
    let (store, messenger) = setup(&server, &["a@example.com"]).await;
    let token = store
        .find_by_email("a@example.com")
        .await
        .unwrap()
        .unwrap()
        .unsubscribe_token;

    let mock = server
        .mock("POST", "/emails")
        .match_body(Matcher::Regex(format!(
            "https://finbrief\\.test/api/unsubscribe\\?token={}",
            token
        )))
        .with_status(200)
        .with_body(r#"{"id": "m"}"#)
        .expect(1)
        .create_async()
        .await;

    messenger
        .send_on(&AnalysisResult::placeholder(), None, date())
        .await
        .unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn new_subscriber_gets_welcome_email() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/emails")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "to": ["new@example.com"],
            "subject": "환영합니다! FinBrief 구독이 시작되었습니다"
        })))
        .with_status(200)
        .with_body(r#"{"id": "welcome_1"}"#)
        .expect(1)
        .create_async()
        .await;

    let (store, messenger) = setup(&server, &[]).await;
    let outcome = subscribe(store.as_ref(), Some(&messenger), "new@example.com")
        .await
        .unwrap();

    assert_eq!(outcome, SubscribeOutcome::Created);
    let row = store.find_by_email("new@example.com").await.unwrap().unwrap();
    assert!(row.welcome_email_sent);

    mock.assert_async().await;
}

#[tokio::test]
async fn failed_welcome_email_still_subscribes() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/emails")
        .with_status(500)
        .create_async()
        .await;

    let (store, messenger) = setup(&server, &[]).await;
    let outcome = subscribe(store.as_ref(), Some(&messenger), "new@example.com")
        .await
        .unwrap();

    assert_eq!(outcome, SubscribeOutcome::Created);
    let row = store.find_by_email("new@example.com").await.unwrap().unwrap();
    assert!(row.is_active);
    assert!(!row.welcome_email_sent);
}

/// Delegates to SQLite but cannot record the welcome flag.
struct FlagFailingStore {
    inner: SqliteSubscriberStore,
}

#[async_trait::async_trait]
impl SubscriberStore for FlagFailingStore {
    async fn list_active(&self) -> anyhow::Result<Vec<Subscriber>> {
        self.inner.list_active().await
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<Subscriber>> {
        self.inner.find_by_email(email).await
    }

    async fn insert(&self, email: &str) -> anyhow::Result<Subscriber> {
        self.inner.insert(email).await
    }

    async fn set_active(&self, id: &str, active: bool) -> anyhow::Result<()> {
        self.inner.set_active(id, active).await
    }

    async fn mark_welcome_sent(&self, _id: &str) -> anyhow::Result<()> {
        anyhow::bail!("transient db error")
    }

    async fn deactivate_by_token(&self, token: &str) -> anyhow::Result<bool> {
        self.inner.deactivate_by_token(token).await
    }
}

#[tokio::test]
async fn welcome_flag_failure_still_reports_created() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/emails")
        .with_status(200)
        .with_body(r#"{"id": "welcome_1"}"#)
        .expect(1)
        .create_async()
        .await;

    let store = Arc::new(FlagFailingStore {
        inner: SqliteSubscriberStore::connect("sqlite::memory:").await.unwrap(),
    });
    let mailer = ResendMailer::new(server.url(), "re_test_key", Duration::from_secs(5)).unwrap();
    let messenger = Messenger::new(store.clone(), Arc::new(mailer), "FinBrief <brief@finbrief.test>", "https://finbrief.test");

    let outcome = subscribe(store.as_ref(), Some(&messenger), "new@example.com")
        .await
        .unwrap();
    assert_eq!(outcome, SubscribeOutcome::Created);

    let row = store.find_by_email("new@example.com").await.unwrap().unwrap();
    assert!(row.is_active);
    assert!(!row.welcome_email_sent);

    mock.assert_async().await;
}
