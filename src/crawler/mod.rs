//! Pagination driver: walks a multi-page review listing in one browsing session

use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::sleep;
use tracing::{debug, error, info};
use url::Url;

use crate::events::{CrawlEvent, TracingObserver};
use crate::extract::{
    NextControl, NextLookup, PageContext, parse_page_interactive, resolve_next, sanitize,
};
use crate::models::{CrawlResult, ReviewRecord};
use crate::traits::{CrawlObserver, NavigableSession, SelectorOracle, SessionFactory};

/// Timing and limits of a crawl.
#[derive(Debug, Clone)]
pub struct CrawlSettings {
    /// Wait after loading the start URL
    pub initial_settle: Duration,
    /// Wait after following or clicking the next control
    pub navigation_settle: Duration,
    /// Wait between scrolling a read-more control into view and clicking it
    pub read_more_debounce: Duration,
    /// Wait after clicking a read-more control
    pub read_more_settle: Duration,
    /// Consecutive navigation failures that abort the crawl
    pub max_failures: u32,
    /// Pages harvested before the crawl stops regardless of pagination
    pub max_pages: usize,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            initial_settle: Duration::from_secs(3),
            navigation_settle: Duration::from_secs(3),
            read_more_debounce: Duration::from_millis(500),
            read_more_settle: Duration::from_secs(1),
            max_failures: 3,
            max_pages: 50,
        }
    }
}

#[cfg(test)]
impl CrawlSettings {
    pub(crate) fn immediate() -> Self {
        Self {
            initial_settle: Duration::ZERO,
            navigation_settle: Duration::ZERO,
            read_more_debounce: Duration::ZERO,
            read_more_settle: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// Why the crawl loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The oracle had no selectors for the current page
    DiscoveryFailed,
    NoNextSelector,
    NoNextControl,
    /// The next-button selector does not parse
    InvalidNextSelector,
    /// The next control points back at the current page
    SameUrl,
    /// Clicking the next control left the page as it was
    Unchanged,
    PageLimit,
    /// Too many navigation failures in a row
    Aborted(String),
}

/// Everything a finished crawl knows about itself.
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlOutcome {
    pub result: CrawlResult,
    /// `None` when the crawl failed before or outside the page loop
    pub stop: Option<StopReason>,
    pub pages: usize,
}

/// What tells one rendered page apart from another.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PageIdentity {
    Url(String),
    /// Hash of the markup, for sessions that cannot report a URL
    Markup(u64),
}

impl PageIdentity {
    fn of(url: Option<&str>, markup: &str) -> Self {
        match url {
            Some(url) => PageIdentity::Url(url.to_string()),
            None => {
                let mut hasher = DefaultHasher::new();
                markup.hash(&mut hasher);
                PageIdentity::Markup(hasher.finish())
            }
        }
    }
}

/// State of one crawl invocation.
#[derive(Debug, Default)]
struct CrawlState {
    reviews: Vec<ReviewRecord>,
    /// Zero-based index of the current page visit
    page: usize,
    /// Page whose reviews were collected during the current visit
    harvested_from: Option<PageIdentity>,
    pages_harvested: usize,
    consecutive_failures: u32,
}

enum Advance {
    Moved(String),
    SameUrl,
    /// The control was clicked but the page stayed as it was
    Unchanged,
}

/// Crawls review listings, one exclusive browsing session per call.
#[derive(Clone)]
pub struct Crawler {
    sessions: Arc<dyn SessionFactory>,
    oracle: Arc<dyn SelectorOracle>,
    observer: Arc<dyn CrawlObserver>,
    settings: CrawlSettings,
}

impl Crawler {
    pub fn new(
        sessions: Arc<dyn SessionFactory>,
        oracle: Arc<dyn SelectorOracle>,
        settings: CrawlSettings,
    ) -> Self {
        Self {
            sessions,
            oracle,
            observer: Arc::new(TracingObserver),
            settings,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn CrawlObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Crawl the review listing starting at `url`.
    ///
    /// Never fails: errors end up in [`CrawlResult::error`] next to the
    /// reviews gathered until then.
    pub async fn crawl(&self, url: &str) -> CrawlResult {
        self.run(url).await.result
    }

    pub async fn run(&self, url: &str) -> CrawlOutcome {
        info!("Crawling reviews from {}", url);

        let mut state = CrawlState::default();
        let mut session = match self.sessions.open().await {
            Ok(session) => session,
            Err(e) => {
                error!("Failed to open browsing session: {:#}", e);
                return CrawlOutcome {
                    result: CrawlResult::failed(Vec::new(), format!("{e:#}")),
                    stop: None,
                    pages: 0,
                };
            }
        };

        let finished = self.drive(session.as_mut(), url, &mut state).await;
        session.close().await;

        let pages = state.pages_harvested;
        let reviews = state.reviews;
        let outcome = match finished {
            Ok(StopReason::Aborted(reason)) => CrawlOutcome {
                result: CrawlResult::failed(reviews, reason.clone()),
                stop: Some(StopReason::Aborted(reason)),
                pages,
            },
            Ok(stop) => CrawlOutcome {
                result: CrawlResult::completed(reviews),
                stop: Some(stop),
                pages,
            },
            Err(e) => {
                error!("Error extracting reviews: {:#}", e);
                CrawlOutcome {
                    result: CrawlResult::failed(reviews, format!("{e:#}")),
                    stop: None,
                    pages,
                }
            }
        };

        info!(
            stop = ?outcome.stop,
            "Crawl of {} finished with {} reviews over {} pages",
            url, outcome.result.reviews_count, outcome.pages
        );
        outcome
    }

    async fn drive(
        &self,
        session: &mut dyn NavigableSession,
        start_url: &str,
        state: &mut CrawlState,
    ) -> Result<StopReason> {
        session
            .navigate(start_url)
            .await
            .with_context(|| format!("failed to load {start_url}"))?;
        sleep(self.settings.initial_settle).await;

        loop {
            let markup = session
                .current_markup()
                .await
                .context("failed to read page markup")?;
            let current_url = session.current_url().await.ok().flatten();
            let identity = PageIdentity::of(current_url.as_deref(), &markup);

            if state
                .harvested_from
                .as_ref()
                .is_some_and(|from| *from != identity)
            {
                // The last navigation reported an error but the page changed anyway.
                state.page += 1;
                state.consecutive_failures = 0;
                debug!(page = state.page, "Landed on a new page despite the navigation error");
            }
            let ctx = PageContext::new(state.page, self.observer.as_ref());

            let Some(selectors) = self.oracle.discover(&markup).await else {
                ctx.emit(CrawlEvent::DiscoveryFailed { page: state.page });
                return Ok(self.stop(state, StopReason::DiscoveryFailed));
            };
            debug!(page = state.page, ?selectors, "Discovered selectors");

            let parsed =
                parse_page_interactive(session, &markup, &selectors, ctx, &self.settings).await;
            if state.harvested_from.as_ref() == Some(&identity) {
                debug!(page = state.page, "Page already harvested, not adding its reviews again");
            } else {
                ctx.emit(CrawlEvent::PageParsed {
                    page: state.page,
                    reviews: parsed.reviews.len(),
                    dropped: parsed.dropped,
                    missing: parsed.missing.len(),
                    total: state.reviews.len() + parsed.reviews.len(),
                });
                state.reviews.extend(parsed.reviews);
                state.harvested_from = Some(identity);
                state.pages_harvested += 1;
            }

            if state.pages_harvested >= self.settings.max_pages {
                return Ok(self.stop(state, StopReason::PageLimit));
            }

            let next_selector = sanitize(selectors.next_button.as_deref());
            if next_selector.is_empty() {
                return Ok(self.stop(state, StopReason::NoNextSelector));
            }

            let control = match resolve_next(&markup, &next_selector, ctx) {
                NextLookup::Found(control) => control,
                NextLookup::Exhausted => return Ok(self.stop(state, StopReason::NoNextControl)),
                NextLookup::Rejected => {
                    return Ok(self.stop(state, StopReason::InvalidNextSelector));
                }
            };

            let page_url = current_url.unwrap_or_else(|| start_url.to_string());

            match self.advance(session, &control, &page_url).await {
                Ok(Advance::Moved(target)) => {
                    ctx.emit(CrawlEvent::Navigated {
                        page: state.page,
                        target,
                    });
                    state.page += 1;
                    state.harvested_from = None;
                    state.consecutive_failures = 0;
                }
                Ok(Advance::SameUrl) => return Ok(self.stop(state, StopReason::SameUrl)),
                Ok(Advance::Unchanged) => return Ok(self.stop(state, StopReason::Unchanged)),
                Err(e) => {
                    state.consecutive_failures += 1;
                    ctx.emit(CrawlEvent::NavigationFailed {
                        page: state.page,
                        target: control
                            .target(&page_url)
                            .map_or_else(|| control.element.to_string(), String::from),
                        error: format!("{e:#}"),
                        consecutive: state.consecutive_failures,
                    });

                    if state.consecutive_failures >= self.settings.max_failures {
                        let reason = format!(
                            "aborted after {} consecutive navigation failures: {e:#}",
                            state.consecutive_failures
                        );
                        return Ok(self.stop(state, StopReason::Aborted(reason)));
                    }
                }
            }
        }
    }

    /// Follow the control's link, or click it when there is nothing to follow.
    async fn advance(
        &self,
        session: &mut dyn NavigableSession,
        control: &NextControl,
        page_url: &str,
    ) -> Result<Advance> {
        if let Some(target) = control.target(page_url) {
            if Url::parse(page_url).ok().as_ref() == Some(&target) {
                return Ok(Advance::SameUrl);
            }

            info!("Navigating to next page: {} ({:?})", target, control.text);
            session
                .navigate(target.as_str())
                .await
                .with_context(|| format!("failed to load {target}"))?;
            sleep(self.settings.navigation_settle).await;
            return Ok(Advance::Moved(target.to_string()));
        }

        let before = session
            .current_markup()
            .await
            .context("failed to read page markup")?;

        info!("Clicking next control {} ({:?})", control.element, control.text);
        session
            .activate(&control.element)
            .await
            .with_context(|| format!("failed to click {}", control.element))?;
        sleep(self.settings.navigation_settle).await;

        let after = session
            .current_markup()
            .await
            .context("failed to read page markup after click")?;
        if after == before {
            return Ok(Advance::Unchanged);
        }

        Ok(Advance::Moved(control.element.to_string()))
    }

    fn stop(&self, state: &CrawlState, reason: StopReason) -> StopReason {
        self.observer.record(CrawlEvent::Stopped {
            page: state.page,
            reason: reason.clone(),
        });
        reason
    }
}
