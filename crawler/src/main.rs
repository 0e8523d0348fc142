use anyhow::Result;
use clap::Parser;
use crawler::{crawl_then_validate, Crawler, Fetcher};
use search_core::config::{CrawlConfig, ValidatorConfig};
use search_core::persist::{IndexPaths, SledStore};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "crawler")]
#[command(about = "Crawl outward from a seed URL into the page cache and index, then keep the cache fresh")]
struct Cli {
    /// Seed URL; bare hosts get http://
    #[arg(long)]
    seed: String,
    /// Data directory; sled locks it, so stop the server before crawling into it
    #[arg(long, default_value = "./data")]
    data: String,
    /// Concurrency (number of workers)
    #[arg(long, default_value_t = 16)]
    workers: usize,
    /// Retries per URL after transient failures
    #[arg(long, default_value_t = 3)]
    max_retries: u32,
    /// Base retry backoff in milliseconds; doubles on every retry
    #[arg(long, default_value_t = 500)]
    backoff_ms: u64,
    /// Request timeout seconds
    #[arg(long, default_value_t = 12)]
    timeout_secs: u64,
    #[arg(long, default_value = "search-engine-rs-bot/0.1 (+https://example.com/bot)")]
    user_agent: String,
    /// Seconds between cache validation sweeps
    #[arg(long, default_value_t = 3600)]
    validate_every_secs: u64,
    /// Run the initial crawl and exit without validating
    #[arg(long, default_value_t = false)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Cli::parse();

    let crawl_config = CrawlConfig {
        max_workers: args.workers,
        max_retries: args.max_retries,
        retry_backoff: Duration::from_millis(args.backoff_ms),
        request_timeout: Duration::from_secs(args.timeout_secs),
        user_agent: args.user_agent.clone(),
        ..Default::default()
    };
    let validator_config =
        ValidatorConfig { period: Duration::from_secs(args.validate_every_secs), max_workers: args.workers };

    let store = Arc::new(SledStore::open(&IndexPaths::new(&args.data))?);
    let fetcher = Fetcher::new(&crawl_config)?;
    tracing::info!(seed = %args.seed, data = %args.data, workers = args.workers, "crawler starting");

    if args.once {
        let report = Crawler::new(fetcher, store.clone(), store.clone(), crawl_config).run(&args.seed).await?;
        store.flush()?;
        tracing::info!(?report, "crawl finished");
        return Ok(());
    }
    crawl_then_validate(fetcher, store.clone(), store, &args.seed, crawl_config, validator_config).await?;
    Ok(())
}
