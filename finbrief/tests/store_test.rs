use std::time::Duration;

use finbrief::subscribers::{
    subscribe, unsubscribe, SqliteSubscriberStore, SubscribeOutcome, SubscriberStore,
    SupabaseSubscriberStore, UnsubscribeOutcome,
};
use mockito::Matcher;

async fn memory_store() -> SqliteSubscriberStore {
    SqliteSubscriberStore::connect("sqlite::memory:").await.unwrap()
}

#[tokio::test]
async fn subscribe_lifecycle() {
    let store = memory_store().await;

    let outcome = subscribe(&store, None, "  Reader@Example.com ").await.unwrap();
    assert_eq!(outcome, SubscribeOutcome::Created);

    let row = store.find_by_email("reader@example.com").await.unwrap().unwrap();
    assert!(row.is_active);
    assert!(!row.welcome_email_sent);

    let again = subscribe(&store, None, "reader@example.com").await.unwrap();
    assert_eq!(again, SubscribeOutcome::AlreadySubscribed);

    let out = unsubscribe(&store, &row.unsubscribe_token).await.unwrap();
    assert_eq!(out, UnsubscribeOutcome::Unsubscribed);
    assert!(store.list_active().await.unwrap().is_empty());

    let back = subscribe(&store, None, "READER@example.com").await.unwrap();
    assert_eq!(back, SubscribeOutcome::Reactivated);

    let row_after = store.find_by_email("reader@example.com").await.unwrap().unwrap();
    assert!(row_after.is_active);
    assert_eq!(row_after.id, row.id);
    assert_eq!(row_after.unsubscribe_token, row.unsubscribe_token);
}

#[tokio::test]
async fn invalid_email_is_rejected_without_writing() {
    let store = memory_store().await;
    let outcome = subscribe(&store, None, "not-an-email").await.unwrap();
    assert_eq!(outcome, SubscribeOutcome::InvalidEmail);
    assert!(store.list_active().await.unwrap().is_empty());
}

#[tokio::test]
async fn unknown_or_empty_token_is_not_found() {
    let store = memory_store().await;
    subscribe(&store, None, "a@example.com").await.unwrap();

    assert_eq!(unsubscribe(&store, "missing").await.unwrap(), UnsubscribeOutcome::NotFound);
    assert_eq!(unsubscribe(&store, "  ").await.unwrap(), UnsubscribeOutcome::NotFound);
    assert_eq!(store.list_active().await.unwrap().len(), 1);
}

#[tokio::test]
async fn file_database_is_created_with_parent_dir() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("finbrief.db");
    let url = format!("sqlite://{}", path.display());

    let store = SqliteSubscriberStore::connect(&url).await.unwrap();
    store.insert("a@example.com").await.unwrap();
    drop(store);

    let reopened = SqliteSubscriberStore::connect(&url).await.unwrap();
    assert_eq!(reopened.list_active().await.unwrap().len(), 1);
    assert!(path.exists());
}

const SUPABASE_ROW: &str = r#"[{
    "id": "6f1c2f4e-0000-4000-8000-000000000001",
    "email": "a@example.com",
    "is_active": true,
    "unsubscribe_token": "tok-a",
    "created_at": "2026-01-29T00:00:00.123456+00:00",
    "updated_at": "2026-01-29T00:00:00.123456+00:00",
    "welcome_email_sent": false
}]"#;

fn supabase(server: &mockito::Server) -> SupabaseSubscriberStore {
    SupabaseSubscriberStore::new(&server.url(), "service-key", Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn supabase_list_active_uses_filters_and_auth() {
    let mut server = mockito::Server::new_async().await;

    let mock = server
        .mock("GET", "/rest/v1/subscribers")
        .match_header("apikey", "service-key")
        .match_header("authorization", "Bearer service-key")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("select".into(), "*".into()),
            Matcher::UrlEncoded("is_active".into(), "eq.true".into()),
            Matcher::UrlEncoded("order".into(), "created_at.asc".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(SUPABASE_ROW)
        .create_async()
        .await;

    let rows = supabase(&server).list_active().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].email, "a@example.com");
    assert_eq!(rows[0].unsubscribe_token, "tok-a");

    mock.assert_async().await;
}

#[tokio::test]
async fn supabase_insert_returns_representation() {
    let mut server = mockito::Server::new_async().await;

    let mock = server
        .mock("POST", "/rest/v1/subscribers")
        .match_header("prefer", "return=representation")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "email": "a@example.com",
            "is_active": true
        })))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(SUPABASE_ROW)
        .create_async()
        .await;

    let row = supabase(&server).insert("a@example.com").await.unwrap();
    assert_eq!(row.id, "6f1c2f4e-0000-4000-8000-000000000001");

    mock.assert_async().await;
}

#[tokio::test]
async fn supabase_unknown_token_reports_false() {
    let mut server = mockito::Server::new_async().await;

    let mock = server
        .mock("PATCH", "/rest/v1/subscribers")
        .match_query(Matcher::UrlEncoded("unsubscribe_token".into(), "eq.nope".into()))
        .match_body(Matcher::PartialJson(serde_json::json!({ "is_active": false })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("[]")
        .create_async()
        .await;

    assert!(!supabase(&server).deactivate_by_token("nope").await.unwrap());

    mock.assert_async().await;
}

#[tokio::test]
async fn supabase_error_status_is_an_error() {
    let mut server = mockito::Server::new_async().await;

    let _mock = server
        .mock("GET", "/rest/v1/subscribers")
        .match_query(Matcher::Any)
        .with_status(401)
        .with_body(r#"{"message": "Invalid API key"}"#)
        .create_async()
        .await;

    let err = supabase(&server).find_by_email("a@example.com").await.unwrap_err();
    assert!(err.to_string().contains("401"));
}
