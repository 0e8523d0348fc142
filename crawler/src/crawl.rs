//! Crawl orchestration: one loop owns the frontier and dispatches up to
//! `max_workers` fetch tasks; each task reports a [`Outcome`] that the loop
//! applies (enqueue links, retry, or drop).

use crate::fetcher::{FetchError, Fetcher};
use crate::frontier::{Frontier, QueuedUrl};
use crate::links::{extract_links, normalize_links, page_text};
use search_core::config::CrawlConfig;
use search_core::urls::{normalize_url, UrlError};
use search_core::{DocumentIndex, PageStore};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlState {
    Idle,
    Running,
    /// Frontier exhausted, tasks still outstanding.
    Draining,
    Done,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlReport {
    pub fetched: usize,
    pub cache_hits: usize,
    pub retries: usize,
    pub dropped: usize,
    pub frontier_remaining: usize,
}

#[derive(Debug)]
enum Outcome {
    Fetched { url: String, links: Vec<String> },
    CacheHit { url: String, links: Vec<String> },
    Retry { url: String, attempt: u32, reason: String },
    Dropped { url: String, reason: String },
}

/// What a worker needs; shared read-only across tasks.
struct Worker {
    fetcher: Fetcher,
    pages: Arc<dyn PageStore>,
    index: Arc<dyn DocumentIndex>,
    config: CrawlConfig,
}

impl Worker {
    async fn process(self: Arc<Self>, task: QueuedUrl) -> Outcome {
        let QueuedUrl { url, attempt } = task;
        let delay = self.config.backoff_for(attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        tracing::debug!(%url, "attempting to bring page from cache");
        match self.pages.get(&url) {
            Ok(Some(body)) => {
                let links = normalize_links(&url, &extract_links(&body));
                return Outcome::CacheHit { url, links };
            }
            Ok(None) => {}
            Err(e) => return Outcome::Dropped { reason: format!("page store: {e}"), url },
        }

        let page = match self.fetcher.fetch(&url).await {
            Ok(page) => page,
            Err(e @ FetchError::Transient { .. }) => return Outcome::Retry { url, attempt, reason: e.to_string() },
            Err(e) => return Outcome::Dropped { url, reason: e.to_string() },
        };

        if let Err(e) = self.index.upsert(&url, &page_text(&page.content)) {
            return Outcome::Dropped { reason: format!("indexing failed: {e}"), url };
        }
        let cached = self
            .pages
            .set(&url, &page.content, page.ttl_secs)
            .and_then(|_| self.pages.set_metadata(&page.metadata()));
        if let Err(e) = cached {
            // keep the stores coherent: no indexed document without a cached page
            if let Err(rollback) = self.index.delete(&url) {
                tracing::error!(%url, error = %rollback, "failed to roll back index entry");
            }
            if let Err(rollback) = self.pages.invalidate(&url) {
                tracing::error!(%url, error = %rollback, "failed to roll back cached page");
            }
            return Outcome::Dropped { reason: format!("caching failed: {e}"), url };
        }

        let links = normalize_links(&url, &extract_links(&page.content));
        Outcome::Fetched { url, links }
    }
}

pub struct Crawler {
    worker: Arc<Worker>,
    state: CrawlState,
}

impl Crawler {
    pub fn new(fetcher: Fetcher, pages: Arc<dyn PageStore>, index: Arc<dyn DocumentIndex>, config: CrawlConfig) -> Self {
        Self { worker: Arc::new(Worker { fetcher, pages, index, config }), state: CrawlState::Idle }
    }

    pub fn state(&self) -> CrawlState {
        self.state
    }

    /// Crawl outward from `seed` until the frontier is exhausted.
    pub async fn run(&mut self, seed: &str) -> Result<CrawlReport, UrlError> {
        let seed = normalize_url(seed)?;
        let max_workers = self.worker.config.max_workers.max(1);
        let started = Instant::now();
        tracing::info!(%seed, max_workers, "crawl starting");

        let mut frontier = Frontier::seeded(seed);
        let mut inflight: JoinSet<Outcome> = JoinSet::new();
        let mut report = CrawlReport::default();
        self.state = CrawlState::Running;

        loop {
            while inflight.len() < max_workers {
                let Some(task) = frontier.pop() else { break };
                inflight.spawn(self.worker.clone().process(task));
            }
            if inflight.is_empty() {
                break;
            }
            if frontier.is_empty() {
                self.state = CrawlState::Draining;
            }

            match inflight.join_next().await {
                Some(Ok(outcome)) => {
                    self.apply(outcome, &mut frontier, &mut report);
                    if !frontier.is_empty() {
                        self.state = CrawlState::Running;
                    }
                }
                Some(Err(e)) => {
                    report.dropped += 1;
                    tracing::error!(error = %e, "crawl task panicked or was cancelled");
                }
                None => break,
            }
        }

        report.frontier_remaining = frontier.len();
        self.state = CrawlState::Done;
        tracing::info!(
            fetched = report.fetched,
            cache_hits = report.cache_hits,
            retries = report.retries,
            dropped = report.dropped,
            visited = frontier.visited(),
            took_s = started.elapsed().as_secs_f64(),
            "crawler is done"
        );
        Ok(report)
    }

    fn apply(&self, outcome: Outcome, frontier: &mut Frontier, report: &mut CrawlReport) {
        match outcome {
            Outcome::Fetched { url, links } => {
                report.fetched += 1;
                tracing::info!(%url, links = links.len(), "fetched and cached page");
                self.enqueue_new(links, frontier);
            }
            Outcome::CacheHit { url, links } => {
                report.cache_hits += 1;
                tracing::info!(%url, "brought page from cache");
                self.enqueue_new(links, frontier);
            }
            Outcome::Retry { url, attempt, reason } => {
                let next = attempt + 1;
                if next > self.worker.config.max_retries {
                    report.dropped += 1;
                    tracing::warn!(%url, attempts = next, %reason, "giving up after repeated transient failures");
                } else {
                    report.retries += 1;
                    tracing::info!(%url, attempt = next, %reason, "fetch failed, putting url back into the frontier");
                    frontier.requeue(url, next);
                }
            }
            Outcome::Dropped { url, reason } => {
                report.dropped += 1;
                tracing::warn!(%url, %reason, "dropping url");
            }
        }
    }

    fn enqueue_new(&self, links: Vec<String>, frontier: &mut Frontier) {
        for link in links {
            if frontier.is_known(&link) {
                continue;
            }
            match self.worker.pages.exists(&link) {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!(%link, "new link detected, adding to the frontier");
                    frontier.enqueue(link);
                }
                Err(e) => tracing::warn!(%link, error = %e, "page store lookup failed, skipping link"),
            }
        }
    }
}
