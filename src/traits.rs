//! Traits and interfaces between the extraction engine and its collaborators

use anyhow::Result;
use async_trait::async_trait;

use crate::events::CrawlEvent;
use crate::models::{ElementRef, SelectorMap};

/// A stateful, script-executing browsing session.
///
/// A session has exactly one owner for its whole lifetime, so every method
/// takes `&mut self`.
#[async_trait]
pub trait NavigableSession: Send {
    /// Markup of the page as currently rendered
    async fn current_markup(&mut self) -> Result<String>;

    /// URL of the current page, if the session has one
    async fn current_url(&mut self) -> Result<Option<String>>;

    /// Load `url` and wait for the navigation to finish
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// Trigger the element's activation (a click) in place
    async fn activate(&mut self, element: &ElementRef) -> Result<()>;

    async fn scroll_into_view(&mut self, element: &ElementRef) -> Result<()>;

    /// Release the session. Calling it more than once is a no-op.
    async fn close(&mut self);
}

/// Opens a fresh, exclusively owned browsing session per crawl.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self) -> Result<Box<dyn NavigableSession>>;
}

/// Discovers the selectors for a page from its raw markup.
///
/// Implementations report their own failures and return `None` instead of
/// erroring; the crawler treats `None` as the end of pagination.
#[async_trait]
pub trait SelectorOracle: Send + Sync {
    async fn discover(&self, markup: &str) -> Option<SelectorMap>;
}

/// Sink for structured diagnostics emitted while crawling.
pub trait CrawlObserver: Send + Sync {
    fn record(&self, event: CrawlEvent);
}
