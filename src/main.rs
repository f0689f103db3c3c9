mod config;
mod error;
mod extract;
mod fetcher;
mod latency;
mod pipeline;
mod sink;
mod sources;
mod types;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::error::Result;
use crate::fetcher::Fetcher;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    info!(
        mode = %cfg.mode,
        sources = ?cfg.sources,
        output = ?cfg.output,
        "Starting scrape | mode: {} | base: {}",
        cfg.mode, cfg.base_url,
    );

    let fetcher = Fetcher::new(&cfg)?;

    let table = pipeline::build_table(&cfg, &fetcher).await?;
    info!(rows = table.rows.len(), "Table ready: {} rows", table.rows.len());

    sink::write(&cfg, &fetcher, &table).await?;

    fetcher.log_latency();
    Ok(())
}
