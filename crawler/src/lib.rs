pub mod crawl;
pub mod fetcher;
pub mod frontier;
pub mod links;
pub mod validator;

pub use crawl::{CrawlReport, CrawlState, Crawler};
pub use fetcher::{FetchError, FetchedPage, Fetcher, HeadInfo};
pub use validator::{CacheValidator, SweepReport};

use search_core::config::{CrawlConfig, ValidatorConfig};
use search_core::schedule::{run_periodically, CycleOutcome};
use search_core::urls::UrlError;
use search_core::{DocumentIndex, PageStore};
use std::sync::Arc;
use std::time::Instant;

/// Initial crawl from `seed`, then a validation sweep every period. Only
/// returns when the seed cannot be crawled at all.
pub async fn crawl_then_validate(
    fetcher: Fetcher,
    pages: Arc<dyn PageStore>,
    index: Arc<dyn DocumentIndex>,
    seed: &str,
    crawl_config: CrawlConfig,
    validator_config: ValidatorConfig,
) -> Result<(), UrlError> {
    let started = Instant::now();
    let mut crawler = Crawler::new(fetcher.clone(), pages.clone(), index.clone(), crawl_config.clone());
    let report = crawler.run(seed).await?;
    let initial_crawl = started.elapsed();
    tracing::info!(?report, took_s = initial_crawl.as_secs_f64(), "initial crawl finished");

    let period = validator_config.period;
    let validator = CacheValidator::new(fetcher, pages, index, crawl_config, validator_config);
    let validator = &validator;
    run_periodically("cache-validator", period, initial_crawl, move || async move {
        match validator.run().await {
            Ok(_) => CycleOutcome::Completed,
            Err(e) => CycleOutcome::Retryable(e.to_string()),
        }
    })
    .await;
    Ok(())
}
