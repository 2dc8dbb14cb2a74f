//! Selector-driven review extraction
//!
//! Everything in here works on static markup parsed with `scraper`. The only
//! piece that touches the live session is the read-more expansion in
//! [`page::parse_page_interactive`], which re-reads the markup after each reveal.

pub mod next;
pub mod page;
pub mod selector;

pub use next::{NextControl, NextLookup, resolve_next};
pub use page::parse_page_interactive;
pub use selector::sanitize;

use crate::events::CrawlEvent;
use crate::traits::CrawlObserver;

/// Where diagnostics for the page being processed go.
#[derive(Clone, Copy)]
pub struct PageContext<'a> {
    pub page: usize,
    observer: &'a dyn CrawlObserver,
}

impl<'a> PageContext<'a> {
    pub fn new(page: usize, observer: &'a dyn CrawlObserver) -> Self {
        Self { page, observer }
    }

    pub fn emit(&self, event: CrawlEvent) {
        self.observer.record(event);
    }
}
