use anyhow::{Context, Result};
use chrono::Utc;
use common::{CollectorConfig, FeedSourceConfig};
use feed_rs::model::{Entry, Feed};
use feed_rs::parser;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::model::NewsItem;

/// Pulls headlines from the configured search feeds.
///
/// Every call re-queries the live feeds; there is no cursor, no retry and no dedup.
pub struct Collector {
    client: Client,
    sources: Vec<FeedSourceConfig>,
    max_items: usize,
    block_keywords: Vec<String>,
}

impl Collector {
    pub fn new(config: &CollectorConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(concat!("FinBrief/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            client,
            sources: config.sources.clone(),
            max_items: config.max_items,
            block_keywords: config.block_keywords.clone(),
        })
    }

    /// Fetch one source and keep its first `max_items` entries.
    pub async fn fetch(&self, source: &FeedSourceConfig) -> Result<Vec<NewsItem>> {
        let url = feed_url(source)?;
        info!(source = %source.label, "fetching news feed");
        debug!(%url, "feed request");

        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .with_context(|| format!("network error while fetching {}", source.label))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("feed fetch for {} failed with status: {}", source.label, status);
        }

        let bytes = response.bytes().await.context("failed to read response body")?;
        let feed = parser::parse(bytes.as_ref())
            .with_context(|| format!("failed to parse feed from {}", source.label))?;

        let items = feed_to_items(feed, &source.label, self.max_items);
        info!(source = %source.label, count = items.len(), "collected news items");
        Ok(items)
    }

    /// Fetch every source concurrently, concatenate in source order and drop promotional items.
    /// Any failing source fails the whole collection.
    pub async fn collect_all_news(&self) -> Result<Vec<NewsItem>> {
        let batches = futures::future::try_join_all(self.sources.iter().map(|s| self.fetch(s))).await?;

        let all: Vec<NewsItem> = batches.into_iter().flatten().collect();
        let total = all.len();
        let filtered = filter_ads(all, self.block_keywords.as_slice());

        info!(total, kept = filtered.len(), "news collection finished");
        Ok(filtered)
    }
}

/// Build the search URL: `q` first, then the source's extra parameters.
pub fn feed_url(source: &FeedSourceConfig) -> Result<Url> {
    let mut url = Url::parse(&source.endpoint)
        .with_context(|| format!("invalid feed endpoint: {}", source.endpoint))?;
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("q", &source.query);
        for (k, v) in &source.params {
            pairs.append_pair(k, v);
        }
    }
    Ok(url)
}

/// Convert parsed feed entries into news items, keeping at most `max_items`.
pub fn feed_to_items(feed: Feed, source_label: &str, max_items: usize) -> Vec<NewsItem> {
    feed.entries
        .into_iter()
        .take(max_items)
        .map(|entry| entry_to_item(entry, source_label))
        .collect()
}

fn entry_to_item(entry: Entry, source_label: &str) -> NewsItem {
    let title = entry.title.map(|t| t.content).unwrap_or_default();
    let link = entry.links.first().map(|l| l.href.clone()).unwrap_or_default();
    let pub_date = entry.published.or(entry.updated).unwrap_or_else(Utc::now).to_rfc3339();

    let raw_snippet = entry
        .summary
        .map(|s| s.content)
        .or_else(|| entry.content.and_then(|c| c.body));

    NewsItem {
        title,
        link,
        pub_date,
        content_snippet: raw_snippet.map(|html| plain_text(&html)).filter(|s| !s.is_empty()),
        source: source_label.to_string(),
    }
}

/// Feed descriptions are usually HTML; keep only readable text on one line.
fn plain_text(html: &str) -> String {
    let text = match html2text::from_read(html.as_bytes(), 200) {
        Ok(text) => text,
        Err(e) => {
            debug!("failed to convert snippet HTML to text: {}", e);
            html.to_string()
        }
    };
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Remove items whose title contains any block-listed keyword. Relative order is preserved.
pub fn filter_ads<S: AsRef<str>>(items: Vec<NewsItem>, block_keywords: &[S]) -> Vec<NewsItem> {
    items
        .into_iter()
        .filter(|item| !block_keywords.iter().any(|k| item.title.contains(k.as_ref())))
        .collect()
}
