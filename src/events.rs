//! Structured crawl diagnostics and the default tracing sink

use tracing::{debug, info, warn};

use crate::crawler::StopReason;
use crate::models::Field;
use crate::traits::CrawlObserver;

/// Something worth reporting that happened during a crawl.
///
/// `page` is the zero-based index of the page visit the event belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlEvent {
    PageParsed {
        page: usize,
        reviews: usize,
        dropped: usize,
        /// Field selectors that matched nothing, across all containers
        missing: usize,
        total: usize,
    },
    UnparseablePage {
        page: usize,
        selector: String,
        reason: String,
    },
    SelectorRejected {
        page: usize,
        selector: String,
        error: String,
    },
    FieldMissing {
        page: usize,
        index: usize,
        field: Field,
        selector: String,
    },
    ReadMoreFailed {
        page: usize,
        index: usize,
        error: String,
    },
    /// A container was re-located by position because its identifying
    /// attribute disappeared after a reveal
    ScopeFallback {
        page: usize,
        index: usize,
        attribute: String,
    },
    DiscoveryFailed {
        page: usize,
    },
    Navigated {
        page: usize,
        target: String,
    },
    NavigationFailed {
        page: usize,
        target: String,
        error: String,
        consecutive: u32,
    },
    Stopped {
        page: usize,
        reason: StopReason,
    },
}

/// Forwards every event to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl CrawlObserver for TracingObserver {
    fn record(&self, event: CrawlEvent) {
        match event {
            CrawlEvent::PageParsed {
                page,
                reviews,
                dropped,
                missing,
                total,
            } => info!(page, reviews, dropped, missing, total, "Parsed review page"),
            CrawlEvent::UnparseablePage {
                page,
                selector,
                reason,
            } => warn!(page, %selector, %reason, "Skipping unparseable page"),
            CrawlEvent::SelectorRejected {
                page,
                selector,
                error,
            } => warn!(page, %selector, %error, "Selector rejected"),
            CrawlEvent::FieldMissing {
                page,
                index,
                field,
                selector,
            } => debug!(page, index, field = field.as_str(), %selector, "Field missing"),
            CrawlEvent::ReadMoreFailed { page, index, error } => {
                warn!(page, index, %error, "Failed to expand review");
            }
            CrawlEvent::ScopeFallback {
                page,
                index,
                attribute,
            } => warn!(page, index, %attribute, "Review re-located by position"),
            CrawlEvent::DiscoveryFailed { page } => {
                warn!(page, "Selector discovery failed, stopping pagination");
            }
            CrawlEvent::Navigated { page, target } => info!(page, %target, "Moved to next page"),
            CrawlEvent::NavigationFailed {
                page,
                target,
                error,
                consecutive,
            } => warn!(page, %target, %error, consecutive, "Navigation failed"),
            CrawlEvent::Stopped { page, reason } => info!(page, ?reason, "Crawl stopped"),
        }
    }
}
