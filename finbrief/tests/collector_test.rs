use common::{CollectorConfig, FeedSourceConfig};
use finbrief::collector::Collector;
use mockito::Matcher;
use std::collections::BTreeMap;

const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel><title>news</title>
<item><title>기준금리 동결 결정</title><link>https://example.com/rate</link><pubDate>Thu, 29 Jan 2026 01:00:00 GMT</pubDate></item>
<item><title>[PR] 신용카드 캐시백 이벤트</title><link>https://example.com/ad</link></item>
<item><title>반도체 수출 역대 최대</title><link>https://example.com/chips</link></item>
</channel></rss>"#;

fn source(label: &str, endpoint: String) -> FeedSourceConfig {
    FeedSourceConfig {
        label: label.to_string(),
        endpoint,
        query: "재테크 when:1d".to_string(),
        params: BTreeMap::from([("hl".to_string(), "ko".to_string())]),
    }
}

fn config(sources: Vec<FeedSourceConfig>) -> CollectorConfig {
    CollectorConfig {
        sources,
        timeout_seconds: 5,
        ..CollectorConfig::default()
    }
}

#[tokio::test]
async fn collects_and_filters_mock_feed() {
    let mut server = mockito::Server::new_async().await;

    let mock = server
        .mock("GET", "/rss/search")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("q".into(), "재테크 when:1d".into()),
            Matcher::UrlEncoded("hl".into(), "ko".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/rss+xml")
        .with_body(RSS)
        .create_async()
        .await;

    let collector = Collector::new(&config(vec![source(
        "Google News",
        format!("{}/rss/search", server.url()),
    )]))
    .unwrap();

    let items = collector.collect_all_news().await.unwrap();

    let titles: Vec<&str> = items.iter().map(|i| i.title.as_str()).collect();
    assert_eq!(titles, vec!["기준금리 동결 결정", "반도체 수출 역대 최대"]);
    assert!(items.iter().all(|i| i.source == "Google News"));
    assert!(items[0].pub_date.starts_with("2026-01-29T01:00:00"));

    mock.assert_async().await;
}

#[tokio::test]
async fn sources_are_concatenated_in_order() {
    let mut server = mockito::Server::new_async().await;

    let _a = server
        .mock("GET", "/a")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(RSS)
        .create_async()
        .await;
    let _b = server
        .mock("GET", "/b")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(
            r#"<rss version="2.0"><channel><title>b</title><item><title>코스피 상승</title><link>https://example.com/b</link></item></channel></rss>"#,
        )
        .create_async()
        .await;

    let collector = Collector::new(&config(vec![
        source("A", format!("{}/a", server.url())),
        source("B", format!("{}/b", server.url())),
    ]))
    .unwrap();

    let items = collector.collect_all_news().await.unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(items[2].title, "코스피 상승");
    assert_eq!(items[2].source, "B");
}

#[tokio::test]
async fn server_error_fails_collection() {
    let mut server = mockito::Server::new_async().await;

    let mock = server
        .mock("GET", "/rss/search")
        .match_query(Matcher::Any)
        .with_status(500)
        .create_async()
        .await;

    let collector = Collector::new(&config(vec![source(
        "Google News",
        format!("{}/rss/search", server.url()),
    )]))
    .unwrap();

    let err = collector.collect_all_news().await.unwrap_err();
    assert!(err.to_string().contains("500"));

    mock.assert_async().await;
}

#[tokio::test]
async fn malformed_feed_is_an_error() {
    let mut server = mockito::Server::new_async().await;

    let _mock = server
        .mock("GET", "/rss/search")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("this is not xml")
        .create_async()
        .await;

    let collector = Collector::new(&config(vec![source(
        "Google News",
        format!("{}/rss/search", server.url()),
    )]))
    .unwrap();

    assert!(collector.collect_all_news().await.is_err());
}
