//! Environment-driven configuration

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::warn;

use crate::crawler::CrawlSettings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OxylabsConfig {
    pub username: String,
    pub password: String,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub openai: OpenAiConfig,
    /// `None` when credentials are missing; vendor URLs are then crawled like any other
    pub oxylabs: Option<OxylabsConfig>,
    pub chrome_path: Option<PathBuf>,
    pub crawl: CrawlSettings,
}

impl Config {
    /// Read configuration from the process environment (after `.env` was loaded).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let oxylabs = match (get("OXYLABS_USERNAME"), get("OXYLABS_PASSWORD")) {
            (Some(username), Some(password)) => Some(OxylabsConfig {
                username,
                password,
                base_url: get("OXYLABS_BASE_URL")
                    .unwrap_or_else(|| "https://realtime.oxylabs.io".to_string()),
            }),
            _ => {
                warn!("OXYLABS_USERNAME/OXYLABS_PASSWORD not set - Amazon pages will be crawled directly");
                None
            }
        };

        let mut crawl = CrawlSettings::default();
        if let Some(max_failures) = parse(&get, "CRAWL_MAX_FAILURES")? {
            crawl.max_failures = max_failures;
        }
        if let Some(max_pages) = parse(&get, "CRAWL_MAX_PAGES")? {
            crawl.max_pages = max_pages;
        }
        if let Some(settle_ms) = parse(&get, "CRAWL_SETTLE_MS")? {
            crawl.initial_settle = Duration::from_millis(settle_ms);
            crawl.navigation_settle = Duration::from_millis(settle_ms);
        }

        Ok(Self {
            bind_addr: parse(&get, "BIND_ADDR")?
                .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 5000))),
            openai: OpenAiConfig {
                api_key: get("OPENAI_API_KEY"),
                model: get("OPENAI_MODEL").unwrap_or_else(|| "gpt-3.5-turbo".to_string()),
                base_url: get("OPENAI_BASE_URL")
                    .unwrap_or_else(|| "https://api.openai.com".to_string()),
            },
            oxylabs,
            chrome_path: get("CHROME_PATH").map(PathBuf::from),
            crawl,
        })
    }
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    get(key)
        .map(|value| {
            value
                .parse()
                .with_context(|| format!("invalid {key}: {value:?}"))
        })
        .transpose()
}
