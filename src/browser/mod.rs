//! Headless Chromium implementation of the browsing session

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::models::ElementRef;
use crate::traits::{NavigableSession, SessionFactory};

/// Launches one headless Chromium per crawl.
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    executable: Option<PathBuf>,
    navigation_timeout: Duration,
}

impl ChromiumLauncher {
    pub fn new(executable: Option<PathBuf>) -> Self {
        Self {
            executable,
            navigation_timeout: Duration::from_secs(30),
        }
    }
}

#[async_trait]
impl SessionFactory for ChromiumLauncher {
    async fn open(&self) -> Result<Box<dyn NavigableSession>> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--disable-extensions");
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder
            .build()
            .map_err(|e| anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        // The handler drives the CDP connection and must be polled for the
        // browser's whole lifetime.
        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Chromium handler event error: {}", e);
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("failed to open browser page")?;

        info!("Opened headless Chromium session");
        Ok(Box::new(ChromiumSession {
            browser: Some(browser),
            page,
            events,
            navigation_timeout: self.navigation_timeout,
        }))
    }
}

/// One browser with a single tab, owned by one crawl.
pub struct ChromiumSession {
    browser: Option<Browser>,
    page: Page,
    events: JoinHandle<()>,
    navigation_timeout: Duration,
}

impl ChromiumSession {
    /// Run `action` (e.g. `click()`) on the element `element` points at.
    async fn on_element(&self, element: &ElementRef, action: &str) -> Result<()> {
        let script = element_script(element, action)?;
        let found: bool = self
            .page
            .evaluate(script)
            .await
            .with_context(|| format!("script failed on {element}"))?
            .into_value()
            .map_err(|e| anyhow!("unexpected script result: {e:?}"))?;

        if !found {
            bail!("element {element} not found in page");
        }
        Ok(())
    }
}

/// Script resolving `element` step by step, then calling `action` on it.
/// Evaluates to whether the element was found.
fn element_script(element: &ElementRef, action: &str) -> Result<String> {
    let steps = serde_json::to_string(&element.steps)?;
    Ok(format!(
        "(() => {{ \
            let node = document; \
            for (const step of {steps}) {{ \
                node = node ? node.querySelectorAll(step.selector)[step.index] : null; \
            }} \
            if (!node) {{ return false; }} \
            node.{action}; \
            return true; \
        }})()"
    ))
}

#[async_trait]
impl NavigableSession for ChromiumSession {
    async fn current_markup(&mut self) -> Result<String> {
        self.page.content().await.context("failed to read page content")
    }

    async fn current_url(&mut self) -> Result<Option<String>> {
        self.page.url().await.context("failed to read page URL")
    }

    async fn navigate(&mut self, url: &str) -> Result<()> {
        match tokio::time::timeout(self.navigation_timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => bail!("navigation failed: {e}"),
            Err(_) => bail!(
                "navigation timed out after {}ms",
                self.navigation_timeout.as_millis()
            ),
        }
    }

    async fn activate(&mut self, element: &ElementRef) -> Result<()> {
        self.on_element(element, "click()").await
    }

    async fn scroll_into_view(&mut self, element: &ElementRef) -> Result<()> {
        self.on_element(element, "scrollIntoView()").await
    }

    async fn close(&mut self) {
        let Some(mut browser) = self.browser.take() else {
            return;
        };

        if let Err(e) = browser.close().await {
            warn!("Failed to close browser: {}", e);
        }
        if let Err(e) = browser.wait().await {
            warn!("Failed to wait for browser exit: {}", e);
        }
        self.events.abort();
        info!("Closed Chromium session");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_script_embeds_steps_as_json() {
        let element = ElementRef::root("div[data-id=\"1\"]", 2).child("a.more", 0);
        let script = element_script(&element, "click()").unwrap();

        assert!(script.contains(r#"[{"selector":"div[data-id=\"1\"]","index":2},{"selector":"a.more","index":0}]"#));
        assert!(script.contains("node.click();"));
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn chromium_session_reads_and_clicks() {
        let launcher = ChromiumLauncher::new(None);
        let mut session = launcher.open().await.expect("failed to launch");

        session
            .navigate("data:text/html,<p id='t'>before</p><button onclick=\"document.getElementById('t').textContent='after'\">go</button>")
            .await
            .expect("navigation failed");
        session
            .activate(&ElementRef::root("button", 0))
            .await
            .expect("click failed");

        let markup = session.current_markup().await.expect("content failed");
        assert!(markup.contains("after"));

        session.close().await;
        session.close().await;
    }
}
