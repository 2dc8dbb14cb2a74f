use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod browser;
mod config;
mod crawler;
mod error;
mod events;
mod extract;
mod models;
mod oracle;
mod review_finder;
mod routes;
#[cfg(test)]
mod testing;
mod traits;
mod vendor;

use config::Config;
use review_finder::ReviewFinder;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    let finder = ReviewFinder::new(&config)?;

    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        None | Some("serve") => {
            info!("Starting review scraper API");
            routes::serve(config.bind_addr, Arc::new(finder)).await?;
        }
        Some("crawl") => {
            let url = args.next().context("usage: review-scraper crawl <url>")?;
            let payload = finder.find_reviews(&url).await?;
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        Some(other) => bail!("unknown command: {other} (expected `serve` or `crawl <url>`)"),
    }

    Ok(())
}
