use anyhow::{Context, Result};
use clap::Parser;
use search_core::persist::{IndexPaths, SledStore};
use search_core::profile::HttpProfileStore;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "trainer")]
#[command(about = "Periodically fit per-profile recommendation models from search history")]
struct Args {
    /// Data directory; sled locks it, so use `server --train` while the server is up
    #[arg(long, default_value = "./data")]
    data: String,
    /// Profile Store base URL; falls back to PROFILE_STORE_URL
    #[arg(long)]
    profile_store: Option<String>,
    /// Seconds between training cycles
    #[arg(long, default_value_t = 300)]
    period_secs: u64,
    /// Profile Store request timeout seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let base = match args.profile_store {
        Some(base) => base,
        None => std::env::var("PROFILE_STORE_URL").context("--profile-store or PROFILE_STORE_URL is required")?,
    };
    let profiles = Arc::new(HttpProfileStore::new(&base, Duration::from_secs(args.timeout_secs))?);
    let models = Arc::new(SledStore::open(&IndexPaths::new(&args.data))?);
    tracing::info!(%base, data = %args.data, period_secs = args.period_secs, "trainer starting");

    trainer::run_forever(profiles, models, Duration::from_secs(args.period_secs)).await;
    Ok(())
}
