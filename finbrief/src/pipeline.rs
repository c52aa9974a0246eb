use anyhow::{Context, Result};
use chrono::Utc;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::affiliate::contextual_links;
use crate::analyzer::{format_analysis, Analyzer};
use crate::archive::{BriefingArchive, BriefingRecord};
use crate::collector::Collector;
use crate::messenger::{DispatchReport, Messenger};
use crate::model::AnalysisResult;

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Collect, analyze and archive, but send nothing
    pub dry_run: bool,
}

/// What a single run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub news_count: usize,
    pub analysis: AnalysisResult,
    pub archive_path: PathBuf,
    /// The model answer was unusable and the placeholder went out instead
    pub degraded: bool,
    /// `None` on a dry run
    pub dispatch: Option<DispatchReport>,
}

/// Collect, analyze, archive and send. Every stage is built once and injected.
pub struct BriefingPipeline {
    collector: Collector,
    analyzer: Analyzer,
    messenger: Option<Messenger>,
    archive: BriefingArchive,
}

impl BriefingPipeline {
    pub fn new(
        collector: Collector,
        analyzer: Analyzer,
        messenger: Option<Messenger>,
        archive: BriefingArchive,
    ) -> Self {
        Self {
            collector,
            analyzer,
            messenger,
            archive,
        }
    }

    pub async fn run(&self, options: RunOptions) -> Result<RunReport> {
        let started = Utc::now();
        info!(dry_run = options.dry_run, "briefing run started");

        if !options.dry_run && self.messenger.is_none() {
            anyhow::bail!("no messenger configured; use a dry run or configure mail delivery");
        }

        let news = self
            .collector
            .collect_all_news()
            .await
            .context("news collection failed")?;
        info!(count = news.len(), "news collected");

        if news.is_empty() {
            anyhow::bail!("no news collected");
        }

        let report = self.analyzer.analyze(&news).await?;
        let degraded = report.is_degraded();
        if degraded {
            warn!("continuing with placeholder analysis");
        }
        info!("{}", format_analysis(&report.result));

        let record = BriefingRecord::new(
            started,
            &news,
            report.result.clone(),
            report.parse_failure.as_ref().map(|f| f.kind().to_string()),
        );
        let archive_path = self.archive.save(&record).await?;

        let dispatch = match (&self.messenger, options.dry_run) {
            (Some(messenger), false) => {
                let links = contextual_links(report.result.keywords.as_slice());
                let dispatch = messenger
                    .send_on(&report.result, Some(links.as_slice()), started.date_naive())
                    .await?;
                Some(dispatch)
            }
            _ => {
                info!("dry run, skipping email dispatch");
                None
            }
        };

        info!(
            elapsed_ms = (Utc::now() - started).num_milliseconds(),
            "briefing run finished"
        );

        Ok(RunReport {
            news_count: news.len(),
            analysis: report.result,
            archive_path,
            degraded,
            dispatch,
        })
    }
}
