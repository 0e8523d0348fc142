//! Periodic freshness sweep over the page cache.
//!
//! Every cached URL gets a HEAD request; when the live `ETag` or
//! `Last-Modified` differs from what was stored at fetch time, the page is
//! dropped from the index and the cache, and a single re-crawl is started
//! afterwards.

use crate::crawl::{CrawlReport, Crawler};
use crate::fetcher::{Fetcher, HeadInfo};
use search_core::config::{CrawlConfig, ValidatorConfig};
use search_core::{DocumentIndex, PageMetadata, PageStore, StoreError};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::task::JoinSet;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Verdict {
    Valid,
    Stale,
    /// HEAD failed; nothing is known about the live page.
    Inconclusive(String),
    /// Metadata vanished between the scan and the check.
    Skipped,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub checked: usize,
    pub valid: usize,
    pub inconclusive: usize,
    /// Stale pages the stores refused to drop; they stay cached and indexed.
    pub failed: usize,
    pub invalidated: Vec<String>,
    pub recrawl: Option<CrawlReport>,
}

/// A cached entry is still valid when both validators match, absent headers
/// comparing as empty.
pub fn is_still_valid(cached: &PageMetadata, live: &HeadInfo) -> bool {
    let norm = |v: &Option<String>| v.clone().unwrap_or_default();
    norm(&cached.etag) == norm(&live.etag) && norm(&cached.last_modified) == norm(&live.last_modified)
}

pub struct CacheValidator {
    fetcher: Fetcher,
    pages: Arc<dyn PageStore>,
    index: Arc<dyn DocumentIndex>,
    crawl_config: CrawlConfig,
    config: ValidatorConfig,
}

impl CacheValidator {
    pub fn new(
        fetcher: Fetcher,
        pages: Arc<dyn PageStore>,
        index: Arc<dyn DocumentIndex>,
        crawl_config: CrawlConfig,
        config: ValidatorConfig,
    ) -> Self {
        Self { fetcher, pages, index, crawl_config, config }
    }

    pub async fn run(&self) -> Result<SweepReport, StoreError> {
        let mut pending: VecDeque<String> = self.pages.scan_metadata_keys()?.into();
        tracing::info!(entries = pending.len(), "cache validation starting");

        let max_workers = self.config.max_workers.max(1);
        let mut inflight: JoinSet<(String, Verdict)> = JoinSet::new();
        let mut report = SweepReport::default();

        loop {
            while inflight.len() < max_workers {
                let Some(url) = pending.pop_front() else { break };
                let fetcher = self.fetcher.clone();
                let pages = self.pages.clone();
                inflight.spawn(async move {
                    let verdict = check(&fetcher, pages.as_ref(), &url).await;
                    (url, verdict)
                });
            }
            let Some(joined) = inflight.join_next().await else { break };
            let (url, verdict) = match joined {
                Ok(done) => done,
                Err(e) => {
                    tracing::error!(error = %e, "validation task panicked or was cancelled");
                    continue;
                }
            };
            report.checked += 1;
            match verdict {
                Verdict::Valid => report.valid += 1,
                Verdict::Skipped => {}
                Verdict::Inconclusive(reason) => {
                    report.inconclusive += 1;
                    tracing::warn!(%url, %reason, "could not validate cached page, keeping it");
                }
                Verdict::Stale => match self.invalidate(&url) {
                    Ok(()) => {
                        tracing::info!(%url, "cached page is stale, invalidated");
                        report.invalidated.push(url);
                    }
                    Err(e) => {
                        report.failed += 1;
                        tracing::error!(%url, error = %e, "could not invalidate stale page");
                    }
                },
            }
        }

        report.invalidated.sort();
        if let Some(seed) = report.invalidated.first() {
            tracing::info!(invalidated = report.invalidated.len(), %seed, "re-crawling after invalidation");
            let mut crawler =
                Crawler::new(self.fetcher.clone(), self.pages.clone(), self.index.clone(), self.crawl_config.clone());
            match crawler.run(seed).await {
                Ok(crawl) => report.recrawl = Some(crawl),
                Err(e) => tracing::error!(%seed, error = %e, "re-crawl could not start"),
            }
        }

        tracing::info!(
            checked = report.checked,
            valid = report.valid,
            inconclusive = report.inconclusive,
            failed = report.failed,
            invalidated = report.invalidated.len(),
            "cache validation done"
        );
        Ok(report)
    }

    /// Index first, then cache, so a search never ranks a page whose body is gone.
    /// When the cache refuses, the index entry is put back and both stores keep the page.
    fn invalidate(&self, url: &str) -> Result<(), StoreError> {
        let indexed = self.index.get(url)?;
        self.index.delete(url)?;
        let Err(e) = self.pages.invalidate(url) else { return Ok(()) };
        if let Some(content) = indexed {
            if let Err(restore) = self.index.upsert(url, &content) {
                tracing::error!(%url, error = %restore, "failed to restore index entry");
            }
        }
        Err(e)
    }
}

async fn check(fetcher: &Fetcher, pages: &dyn PageStore, url: &str) -> Verdict {
    let cached = match pages.get_metadata(url) {
        Ok(Some(meta)) => meta,
        Ok(None) => return Verdict::Skipped,
        Err(e) => return Verdict::Inconclusive(e.to_string()),
    };
    match fetcher.head(url).await {
        Ok(live) if is_still_valid(&cached, &live) => Verdict::Valid,
        Ok(_) => Verdict::Stale,
        Err(e) => Verdict::Inconclusive(e.to_string()),
    }
}
