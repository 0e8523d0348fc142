use anyhow::Result;
use axum::Router;
use clap::Parser;
use crawler::{crawl_then_validate, Fetcher};
use search_core::config::{CrawlConfig, RankingConfig, ValidatorConfig};
use search_core::persist::{IndexPaths, SledStore};
use search_core::profile::HttpProfileStore;
use search_core::recommend::StoredModelRecommender;
use server::{build_app, SearchService};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Data directory (sled database shared by crawler, trainer and server)
    #[arg(long, default_value = "./data")]
    data: String,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
    /// Seconds a ranked result list stays cached
    #[arg(long, default_value_t = 300)]
    result_ttl_secs: u64,
    /// Recommended pages merged into each result list
    #[arg(long, default_value_t = 5)]
    top_n: usize,
    /// Crawl from this seed in the background and keep validating the cache
    #[arg(long)]
    seed: Option<String>,
    /// Seconds between cache validation sweeps when crawling
    #[arg(long, default_value_t = 3600)]
    validate_every_secs: u64,
    /// Refit recommendation models in the background (needs PROFILE_STORE_URL)
    #[arg(long, default_value_t = false)]
    train: bool,
    /// Seconds between training cycles
    #[arg(long, default_value_t = 300)]
    train_every_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let store = Arc::new(SledStore::open(&IndexPaths::new(&args.data))?);
    let config =
        RankingConfig { result_ttl_secs: args.result_ttl_secs, recommendation_top_n: args.top_n, ..Default::default() };
    let mut search = SearchService::new(store.clone(), store.clone(), config)
        .with_recommender(Arc::new(StoredModelRecommender::new(store.clone())));

    let profiles = match std::env::var("PROFILE_STORE_URL") {
        Ok(base) => {
            tracing::info!(%base, "profile store enabled");
            Some(Arc::new(HttpProfileStore::new(&base, Duration::from_secs(5))?))
        }
        Err(_) => {
            tracing::info!("PROFILE_STORE_URL not set, searches are anonymous");
            None
        }
    };
    if let Some(profiles) = &profiles {
        search = search.with_profiles(profiles.clone());
    }

    if let Some(seed) = args.seed.clone() {
        let crawl_config = CrawlConfig::default();
        let validator_config =
            ValidatorConfig { period: Duration::from_secs(args.validate_every_secs), ..Default::default() };
        let fetcher = Fetcher::new(&crawl_config)?;
        let (pages, index) = (store.clone(), store.clone());
        tokio::spawn(async move {
            if let Err(e) = crawl_then_validate(fetcher, pages, index, &seed, crawl_config, validator_config).await {
                tracing::error!(%seed, error = %e, "background crawl could not start");
            }
        });
    }
    match (args.train, profiles) {
        (true, Some(profiles)) => {
            tokio::spawn(trainer::run_forever(profiles, store.clone(), Duration::from_secs(args.train_every_secs)));
        }
        (true, None) => tracing::warn!("--train ignored without PROFILE_STORE_URL"),
        _ => {}
    }

    let app: Router = build_app(search);
    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
