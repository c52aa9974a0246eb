use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::model::{AnalysisResult, NewsItem};

/// How many raw headlines are kept next to the analysis.
pub const RAW_NEWS_KEPT: usize = 10;

/// One day's persisted briefing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BriefingRecord {
    /// `YYYY-MM-DD`, also the file stem
    pub date: String,
    pub timestamp: DateTime<Utc>,
    pub news_count: usize,
    pub analysis: AnalysisResult,
    pub raw_news: Vec<NewsItem>,
    /// Kind of parse failure when `analysis` is the placeholder
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded: Option<String>,
}

impl BriefingRecord {
    pub fn new(
        timestamp: DateTime<Utc>,
        news: &[NewsItem],
        analysis: AnalysisResult,
        degraded: Option<String>,
    ) -> Self {
        Self {
            date: timestamp.format("%Y-%m-%d").to_string(),
            timestamp,
            news_count: news.len(),
            analysis,
            raw_news: news.iter().take(RAW_NEWS_KEPT).cloned().collect(),
            degraded,
        }
    }
}

/// Directory of `YYYY-MM-DD.json` briefing files.
#[derive(Debug, Clone)]
pub struct BriefingArchive {
    dir: PathBuf,
}

impl BriefingArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the record as pretty JSON, replacing any file for the same date.
    pub async fn save(&self, record: &BriefingRecord) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create archive dir {}", self.dir.display()))?;

        let path = self.dir.join(format!("{}.json", record.date));
        let body = serde_json::to_string_pretty(record).context("failed to serialize briefing")?;
        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;

        info!(path = %path.display(), "briefing archived");
        Ok(path)
    }

    /// The most recent briefing, by file name. `None` if the directory is missing or empty.
    pub async fn latest(&self) -> Result<Option<BriefingRecord>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", self.dir.display()))
            }
        };

        let mut newest: Option<PathBuf> = None;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if newest.as_ref().map_or(true, |n| path.file_name() > n.file_name()) {
                newest = Some(path);
            }
        }

        let Some(path) = newest else {
            debug!(dir = %self.dir.display(), "archive is empty");
            return Ok(None);
        };

        let body = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let record = serde_json::from_str(&body)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(Some(record))
    }
}
