use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tracing::{info, warn};

use crate::api::WikiWriteApi;
use crate::site::{PageRef, Site};

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub summary: String,
}

impl SyncOptions {
    pub fn for_source(source: &Site) -> Self {
        Self {
            summary: format!("wikisync: copy from {source}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PageOutcome {
    Synced,
    SkippedExists,
    FailedCommit,
    SkippedNotEditable,
}

impl PageOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::SkippedExists => "skipped_exists",
            Self::FailedCommit => "failed_commit",
            Self::SkippedNotEditable => "skipped_not_editable",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncPageResult {
    pub title: String,
    pub outcome: PageOutcome,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct SyncReport {
    pub total: usize,
    pub synced: usize,
    pub skipped_existing: usize,
    pub not_editable: usize,
    pub failed: usize,
    pub errors: Vec<String>,
    pub pages: Vec<SyncPageResult>,
    pub request_count: usize,
}

impl SyncReport {
    fn record(&mut self, title: &str, outcome: PageOutcome, detail: Option<String>) {
        match outcome {
            PageOutcome::Synced => self.synced += 1,
            PageOutcome::SkippedExists => self.skipped_existing += 1,
            PageOutcome::FailedCommit => self.failed += 1,
            PageOutcome::SkippedNotEditable => self.not_editable += 1,
        }
        self.pages.push(SyncPageResult {
            title: title.to_string(),
            outcome,
            detail,
        });
    }
}

/// Copies each page to `destination` unless a page with the same title is
/// already there. Pages are handled one at a time in the order given; a
/// refused edit is recorded and the batch continues.
pub fn sync_pages<A: WikiWriteApi>(
    api: &mut A,
    source: &Site,
    destination: &Site,
    pages: &[PageRef],
    options: &SyncOptions,
) -> Result<SyncReport> {
    let mut report = SyncReport {
        total: pages.len(),
        ..SyncReport::default()
    };

    api.set_write_throttle(destination, Duration::ZERO);

    for (index, page) in pages.iter().enumerate() {
        let title = page.title.as_str();
        info!("== {}/{} Sync {}", index + 1, report.total, title);
        let target = page.on(destination);

        if api.page_exists(&target.site, title)? {
            info!("page {title} exists");
            report.record(title, PageOutcome::SkippedExists, Some("page exists".to_string()));
            continue;
        }

        if api.page_site(&target.site, title)? != *destination {
            warn!("page {title} not editable on {destination}");
            report.record(
                title,
                PageOutcome::SkippedNotEditable,
                Some("page not editable on destination".to_string()),
            );
            continue;
        }

        let text = api.page_text(source, title)?;
        match api.commit_page(&target.site, title, &text, &options.summary) {
            Ok(true) => report.record(title, PageOutcome::Synced, None),
            Ok(false) => {
                warn!("error on saving page {title}");
                report.errors.push(format!("{title}: edit refused"));
                report.record(
                    title,
                    PageOutcome::FailedCommit,
                    Some("edit refused".to_string()),
                );
            }
            Err(error) => {
                warn!("error on saving page {title}: {error:#}");
                report.errors.push(format!("{title}: {error:#}"));
                report.record(title, PageOutcome::FailedCommit, Some(format!("{error:#}")));
            }
        }
    }

    report.request_count = api.request_count();
    Ok(report)
}
