//! Chromium-backed page content provider using chromiumoxide.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chartwatch::{ElementHandle, PageContentProvider, TrackerError, TrackerResult};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. CHARTWATCH_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("CHARTWATCH_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. System PATH
    for binary in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(binary) {
            return Some(path);
        }
    }

    // 3. Common macOS locations
    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Launch settings for the browser session.
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub headless: bool,
    pub nav_timeout: Duration,
}

/// One Chromium tab holding the chart page.
///
/// Elements found on the page are kept in an arena and handed out as
/// [`ElementHandle`] indices; a document-level `find_all` starts a new arena.
pub struct ChromiumPage {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    elements: Vec<Element>,
    nav_timeout: Duration,
}

impl ChromiumPage {
    /// Launch Chromium and open a blank tab.
    pub async fn launch(options: &BrowserOptions) -> Result<Self> {
        let chrome_path = find_chromium()
            .context("Chromium not found. Install Chrome or set CHARTWATCH_CHROMIUM_PATH.")?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .window_size(1280, 2000);
        builder = if options.headless {
            builder.arg("--headless=new")
        } else {
            // Some storefront images only load when the window is visible.
            builder.with_head()
        };
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("browser handler event error: {e}");
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;

        tracing::info!(
            "Chromium launched ({})",
            if options.headless { "headless" } else { "headed" }
        );

        Ok(Self {
            browser,
            page,
            handler,
            elements: Vec::new(),
            nav_timeout: options.nav_timeout,
        })
    }

    fn element(&self, handle: ElementHandle) -> TrackerResult<&Element> {
        self.elements
            .get(handle.index())
            .ok_or_else(|| TrackerError::PageLoad(format!("stale element handle {handle:?}")))
    }

    fn track(&mut self, element: Element) -> ElementHandle {
        self.elements.push(element);
        ElementHandle::new(self.elements.len() - 1)
    }
}

fn page_error(action: &str, e: impl std::fmt::Display) -> TrackerError {
    TrackerError::PageLoad(format!("{action}: {e}"))
}

#[async_trait]
impl PageContentProvider for ChromiumPage {
    async fn navigate(&mut self, url: &str) -> TrackerResult<()> {
        let timeout_ms = self.nav_timeout.as_millis();
        match tokio::time::timeout(self.nav_timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(page_error("navigation failed", e)),
            Err(_) => {
                return Err(TrackerError::PageLoad(format!(
                    "navigation timed out after {timeout_ms}ms"
                )))
            }
        }

        self.page
            .wait_for_navigation()
            .await
            .map_err(|e| page_error("page did not finish loading", e))?;
        self.elements.clear();
        tracing::debug!("navigated to {url}");
        Ok(())
    }

    async fn evaluate(&mut self, script: &str) -> TrackerResult<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| page_error("JS execution failed", e))?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn find_all(&mut self, selector: &str) -> TrackerResult<Vec<ElementHandle>> {
        let found = self
            .page
            .find_elements(selector)
            .await
            .map_err(|e| page_error(&format!("querying {selector:?} failed"), e))?;
        self.elements.clear();
        Ok(found.into_iter().map(|el| self.track(el)).collect())
    }

    async fn find_within(
        &mut self,
        parent: ElementHandle,
        selector: &str,
    ) -> TrackerResult<Option<ElementHandle>> {
        let found = self
            .element(parent)?
            .find_elements(selector)
            .await
            .map_err(|e| page_error(&format!("querying {selector:?} failed"), e))?;
        Ok(found.into_iter().next().map(|el| self.track(el)))
    }

    async fn attribute(
        &mut self,
        element: ElementHandle,
        name: &str,
    ) -> TrackerResult<Option<String>> {
        self.element(element)?
            .attribute(name)
            .await
            .map_err(|e| page_error(&format!("reading `{name}` failed"), e))
    }

    async fn inner_html(&mut self, element: ElementHandle) -> TrackerResult<String> {
        let html = self
            .element(element)?
            .inner_html()
            .await
            .map_err(|e| page_error("reading innerHTML failed", e))?;
        Ok(html.unwrap_or_default())
    }

    async fn text(&mut self, element: ElementHandle) -> TrackerResult<String> {
        let text = self
            .element(element)?
            .inner_text()
            .await
            .map_err(|e| page_error("reading innerText failed", e))?;
        Ok(text.unwrap_or_default())
    }

    async fn close(&mut self) -> TrackerResult<()> {
        self.elements.clear();
        if let Err(e) = self.page.clone().close().await {
            tracing::debug!("closing page failed: {e}");
        }
        self.browser
            .close()
            .await
            .map_err(|e| page_error("closing browser failed", e))?;
        if let Err(e) = self.browser.wait().await {
            tracing::debug!("waiting for browser exit failed: {e}");
        }
        self.handler.abort();
        tracing::info!("Chromium closed");
        Ok(())
    }
}
