use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};
use url::Url;

use crate::browser::ChromiumLauncher;
use crate::config::Config;
use crate::crawler::Crawler;
use crate::error::ApiError;
use crate::models::CrawlResult;
use crate::oracle::OpenAiOracle;
use crate::vendor::{OxylabsClient, ReviewQuery, extract_asin};

/// Which backend handles a product URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Bulk review API of the marketplace vendor
    Vendor,
    /// Generic browser crawl
    Crawl,
}

pub fn route_for(url: &Url) -> Route {
    match url.host_str() {
        Some(host) if host.to_ascii_lowercase().contains("amazon") => Route::Vendor,
        _ => Route::Crawl,
    }
}

/// Response body of a review lookup.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ReviewsPayload {
    Crawl(CrawlResult),
    Vendor(CrawlResult<Value>),
}

#[derive(Clone)]
pub struct ReviewFinder {
    crawler: Crawler,
    vendor: Option<OxylabsClient>,
    query: ReviewQuery,
}

impl ReviewFinder {
    pub fn new(config: &Config) -> Result<Self> {
        let crawler = Crawler::new(
            Arc::new(ChromiumLauncher::new(config.chrome_path.clone())),
            Arc::new(OpenAiOracle::new(&config.openai)?),
            config.crawl.clone(),
        );
        let vendor = config.oxylabs.as_ref().map(OxylabsClient::new).transpose()?;

        Ok(Self::with_parts(crawler, vendor))
    }

    pub fn with_parts(crawler: Crawler, vendor: Option<OxylabsClient>) -> Self {
        Self {
            crawler,
            vendor,
            query: ReviewQuery::default(),
        }
    }

    /// Collect the reviews of the product page at `page`.
    pub async fn find_reviews(&self, page: &str) -> Result<ReviewsPayload, ApiError> {
        let page = page.trim();
        if page.is_empty() {
            return Err(ApiError::BadRequest(
                "Missing 'page' parameter in the request".to_string(),
            ));
        }

        let url = Url::parse(page)
            .map_err(|e| ApiError::BadRequest(format!("Invalid 'page' URL {page:?}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ApiError::BadRequest(format!(
                "Unsupported URL scheme: {}",
                url.scheme()
            )));
        }

        match (route_for(&url), &self.vendor) {
            (Route::Vendor, Some(vendor)) => {
                let asin = extract_asin(url.as_str()).ok_or_else(|| {
                    ApiError::BadRequest("Unable to extract ASIN from URL".to_string())
                })?;
                Ok(ReviewsPayload::Vendor(
                    vendor.fetch_reviews(asin, &self.query).await,
                ))
            }
            (Route::Vendor, None) => {
                warn!("No vendor client configured, crawling {} directly", url);
                self.crawl(url).await
            }
            (Route::Crawl, _) => self.crawl(url).await,
        }
    }

    async fn crawl(&self, url: Url) -> Result<ReviewsPayload, ApiError> {
        info!("Crawling {}", url);
        let crawler = self.crawler.clone();
        let result = tokio::spawn(async move { crawler.crawl(url.as_str()).await })
            .await
            .map_err(|e| ApiError::Internal(format!("crawl task failed: {e}")))?;

        Ok(ReviewsPayload::Crawl(result))
    }
}
