//! In-memory collaborators for driving the engine without a browser

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;

use crate::events::CrawlEvent;
use crate::models::{ElementRef, SelectorMap};
use crate::traits::{CrawlObserver, NavigableSession, SelectorOracle, SessionFactory};

/// Selectors matching the review markup used throughout the tests.
pub(crate) fn selectors() -> SelectorMap {
    SelectorMap {
        review_container: Some("div.review".into()),
        title: Some("h3.title".into()),
        body: Some("p.body".into()),
        rating: Some("span.stars".into()),
        reviewer_name: Some("span.author".into()),
        next_button: None,
        read_more_button: None,
    }
}

/// Keeps every event for later assertions.
#[derive(Debug, Default)]
pub(crate) struct RecordingObserver {
    events: Mutex<Vec<CrawlEvent>>,
}

impl RecordingObserver {
    pub(crate) fn events(&self) -> Vec<CrawlEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl CrawlObserver for RecordingObserver {
    fn record(&self, event: CrawlEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[derive(Debug, Clone)]
enum Click {
    Reveal(String),
    Goto(String),
    Fail,
}

/// What a test can still inspect once the session was handed to the crawler.
#[derive(Debug, Clone, Default)]
pub(crate) struct SessionProbe {
    log: Arc<Mutex<Vec<String>>>,
    closes: Arc<AtomicUsize>,
}

impl SessionProbe {
    pub(crate) fn actions(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub(crate) fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// A scripted site: pages by URL plus what clicking given elements does.
#[derive(Debug, Default)]
pub(crate) struct FakeSession {
    pages: HashMap<String, String>,
    clicks: HashMap<ElementRef, Click>,
    nav_failures: HashMap<String, usize>,
    nav_timeouts: HashMap<String, usize>,
    unreadable: HashSet<String>,
    current_url: Option<String>,
    markup: String,
    probe: SessionProbe,
}

impl FakeSession {
    pub(crate) fn with_page(mut self, url: &str, markup: &str) -> Self {
        self.pages.insert(url.to_string(), markup.to_string());
        self
    }

    pub(crate) fn on_click_reveal(mut self, element: &ElementRef, markup: &str) -> Self {
        self.clicks
            .insert(element.clone(), Click::Reveal(markup.to_string()));
        self
    }

    pub(crate) fn on_click_goto(mut self, element: &ElementRef, url: &str) -> Self {
        self.clicks.insert(element.clone(), Click::Goto(url.to_string()));
        self
    }

    pub(crate) fn on_click_fail(mut self, element: &ElementRef) -> Self {
        self.clicks.insert(element.clone(), Click::Fail);
        self
    }

    /// Make the next `times` navigations to `url` fail.
    pub(crate) fn failing_navigation(mut self, url: &str, times: usize) -> Self {
        self.nav_failures.insert(url.to_string(), times);
        self
    }

    /// Make the next `times` navigations to `url` load the page but still
    /// report an error, like a `goto` timing out after the page arrived.
    pub(crate) fn timing_out_navigation(mut self, url: &str, times: usize) -> Self {
        self.nav_timeouts.insert(url.to_string(), times);
        self
    }

    /// Make reading the markup fail while the session is on `url`.
    pub(crate) fn unreadable_page(mut self, url: &str) -> Self {
        self.unreadable.insert(url.to_string());
        self
    }

    /// Put the session on `url` without recording an action.
    pub(crate) fn load(&mut self, url: &str) {
        self.markup = self.pages[url].clone();
        self.current_url = Some(url.to_string());
    }

    pub(crate) fn probe(&self) -> SessionProbe {
        self.probe.clone()
    }

    pub(crate) fn actions(&self) -> Vec<String> {
        self.probe.actions()
    }

    fn log(&self, action: String) {
        self.probe.log.lock().unwrap().push(action);
    }

    fn goto(&mut self, url: &str) -> Result<()> {
        if let Some(remaining) = self.nav_failures.get_mut(url)
            && *remaining > 0
        {
            *remaining -= 1;
            bail!("net::ERR_CONNECTION_RESET loading {url}");
        }

        let markup = self
            .pages
            .get(url)
            .ok_or_else(|| anyhow!("no page at {url}"))?;
        self.markup = markup.clone();
        self.current_url = Some(url.to_string());

        if let Some(remaining) = self.nav_timeouts.get_mut(url)
            && *remaining > 0
        {
            *remaining -= 1;
            bail!("navigation to {url} timed out");
        }
        Ok(())
    }
}

#[async_trait]
impl NavigableSession for FakeSession {
    async fn current_markup(&mut self) -> Result<String> {
        if let Some(url) = &self.current_url
            && self.unreadable.contains(url)
        {
            bail!("target crashed while reading {url}");
        }
        Ok(self.markup.clone())
    }

    async fn current_url(&mut self) -> Result<Option<String>> {
        Ok(self.current_url.clone())
    }

    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.log(format!("goto {url}"));
        self.goto(url)
    }

    async fn activate(&mut self, element: &ElementRef) -> Result<()> {
        self.log(format!("click {element}"));
        match self.clicks.get(element).cloned() {
            Some(Click::Reveal(markup)) => {
                self.markup = markup;
                Ok(())
            }
            Some(Click::Goto(url)) => self.goto(&url),
            Some(Click::Fail) => bail!("element {element} is detached"),
            None => bail!("element {element} is not interactive"),
        }
    }

    async fn scroll_into_view(&mut self, element: &ElementRef) -> Result<()> {
        self.log(format!("scroll {element}"));
        Ok(())
    }

    async fn close(&mut self) {
        self.probe.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Hands out a single prepared session.
pub(crate) struct FakeSessions {
    session: Mutex<Option<FakeSession>>,
}

impl FakeSessions {
    pub(crate) fn new(session: FakeSession) -> Self {
        Self {
            session: Mutex::new(Some(session)),
        }
    }

    pub(crate) fn unavailable() -> Self {
        Self {
            session: Mutex::new(None),
        }
    }
}

#[async_trait]
impl SessionFactory for FakeSessions {
    async fn open(&self) -> Result<Box<dyn NavigableSession>> {
        let session = self
            .session
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| anyhow!("failed to launch browser"))?;
        Ok(Box::new(session))
    }
}

/// Oracle answering from a closure over the page markup.
pub(crate) struct FnOracle<F>(pub(crate) F);

#[async_trait]
impl<F> SelectorOracle for FnOracle<F>
where
    F: Fn(&str) -> Option<SelectorMap> + Send + Sync,
{
    async fn discover(&self, markup: &str) -> Option<SelectorMap> {
        (self.0)(markup)
    }
}
