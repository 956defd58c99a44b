//! Chrome DevTools Protocol driver.
//!
//! Launches a real Chrome/Chromium with a persistent profile so cookies and
//! "trust this device" MFA state survive between runs, and implements
//! [`Driver`] on top of a single tab.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::{
    EventFrameNavigated, EventNavigatedWithinDocument,
};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::{Driver, Element};
use crate::config::BrowserSettings;

const POLL: Duration = Duration::from_millis(100);

const IS_VISIBLE_JS: &str = "function() { \
    const r = this.getBoundingClientRect(); \
    const s = window.getComputedStyle(this); \
    return s.visibility !== 'hidden' && s.display !== 'none' && (r.width > 0 || r.height > 0); \
}";

const CLEAR_VALUE_JS: &str = "function() { \
    this.value = ''; \
    this.dispatchEvent(new Event('input', { bubbles: true })); \
}";

/// A launched browser and its single working tab.
///
/// Owns the Chrome process and the CDP event loop. [`BrowserSession::close`]
/// shuts Chrome down cleanly; dropping the session without closing still
/// stops the event loop and lets chromiumoxide kill the process.
pub struct BrowserSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
    page: Page,
}

impl BrowserSession {
    /// Launch Chrome using `profile_dir` as its user data directory.
    pub async fn launch(settings: &BrowserSettings, profile_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(profile_dir).with_context(|| {
            format!("Failed to create browser profile dir: {}", profile_dir.display())
        })?;

        let chrome_path = match &settings.chrome_path {
            Some(path) => path.clone(),
            None => find_chrome().context(
                "Chrome/Chromium not found. Install Chrome or set browser.chrome_path.",
            )?,
        };

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .user_data_dir(profile_dir)
            .window_size(settings.window_width, settings.window_height)
            .viewport(None)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--no-first-run")
            .arg("--no-default-browser-check");
        if !settings.headless {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to configure browser: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("Failed to launch browser")?;
        let handler_task = tokio::spawn(async move { while (handler.next().await).is_some() {} });

        let page = browser
            .new_page("about:blank")
            .await
            .context("Failed to open browser tab")?;

        tracing::info!(profile = %profile_dir.display(), headless = settings.headless, "Browser launched");

        Ok(Self {
            browser,
            handler_task,
            page,
        })
    }

    /// A driver for the session's tab.
    pub fn driver(&self) -> ChromeDriver {
        ChromeDriver {
            page: self.page.clone(),
        }
    }

    /// Close Chrome and wait for the process to exit.
    pub async fn close(mut self) -> Result<()> {
        self.browser
            .close()
            .await
            .context("Failed to close browser")?;
        self.browser
            .wait()
            .await
            .context("Failed waiting for browser exit")?;
        tracing::debug!("Browser closed");
        Ok(())
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}

/// [`Driver`] over one chromiumoxide tab.
#[derive(Clone)]
pub struct ChromeDriver {
    page: Page,
}

impl ChromeDriver {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    async fn body_contains(&self, text: &str) -> Result<bool> {
        let needle = serde_json::to_string(text)?;
        let js = format!("document.body ? document.body.innerText.includes({needle}) : false");
        let found = self
            .page
            .evaluate(js)
            .await
            .context("Failed to probe page text")?
            .into_value::<bool>()
            .unwrap_or(false);
        Ok(found)
    }
}

#[async_trait]
impl Driver for ChromeDriver {
    type Element = ChromeElement;

    async fn goto(&self, url: &str, timeout: Duration) -> Result<()> {
        tokio::time::timeout(timeout, self.page.goto(url))
            .await
            .map_err(|_| anyhow::anyhow!("Timed out after {timeout:?} loading {url}"))?
            .with_context(|| format!("Failed to navigate to {url}"))?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self
            .page
            .url()
            .await
            .context("Failed to read page URL")?
            .unwrap_or_default())
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<ChromeElement>> {
        let elements = self
            .page
            .find_elements(selector)
            .await
            .with_context(|| format!("Failed to query {selector:?}"))?;
        Ok(elements.into_iter().map(ChromeElement::new).collect())
    }

    async fn wait_for_visible(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<Option<ChromeElement>> {
        let deadline = Instant::now() + timeout;
        loop {
            // A failed query mid-navigation is the same as "not there yet".
            if let Ok(elements) = self.query_all(selector).await {
                for element in elements {
                    if element.is_visible().await.unwrap_or(false) {
                        return Ok(Some(element));
                    }
                }
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(POLL).await;
        }
    }

    async fn wait_for_text(&self, text: &str, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.body_contains(text).await.unwrap_or(false) {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(POLL).await;
        }
    }

    async fn wait_for_url(&self, fragment: &str, timeout: Duration) -> Result<bool> {
        let frame_navigations = self
            .page
            .event_listener::<EventFrameNavigated>()
            .await
            .context("Failed to subscribe to navigation events")?
            .map(|_| ());
        let same_document = self
            .page
            .event_listener::<EventNavigatedWithinDocument>()
            .await
            .context("Failed to subscribe to navigation events")?
            .map(|_| ());
        let mut navigations = Box::pin(futures::stream::select(frame_navigations, same_document));

        let deadline = Instant::now() + timeout;
        loop {
            if self.current_url().await?.contains(fragment) {
                return Ok(true);
            }
            match tokio::time::timeout_at(deadline, navigations.next()).await {
                Ok(Some(())) => continue,
                Ok(None) | Err(_) => return Ok(self.current_url().await?.contains(fragment)),
            }
        }
    }
}

/// [`Element`] over a chromiumoxide element handle.
pub struct ChromeElement {
    inner: chromiumoxide::Element,
}

impl ChromeElement {
    fn new(inner: chromiumoxide::Element) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Element for ChromeElement {
    async fn text(&self) -> Result<String> {
        Ok(self
            .inner
            .inner_text()
            .await
            .context("Failed to read element text")?
            .unwrap_or_default())
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>> {
        self.inner
            .attribute(name)
            .await
            .with_context(|| format!("Failed to read attribute {name:?}"))
    }

    async fn value(&self) -> Result<String> {
        let value = self
            .inner
            .property("value")
            .await
            .context("Failed to read input value")?;
        Ok(value
            .as_ref()
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string())
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<Self>> {
        let elements = self
            .inner
            .find_elements(selector)
            .await
            .with_context(|| format!("Failed to query {selector:?}"))?;
        Ok(elements.into_iter().map(ChromeElement::new).collect())
    }

    async fn is_visible(&self) -> Result<bool> {
        let returns = self
            .inner
            .call_js_fn(IS_VISIBLE_JS, false)
            .await
            .context("Failed to check element visibility")?;
        Ok(returns
            .result
            .value
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }

    async fn click(&self) -> Result<()> {
        self.inner.click().await.context("Failed to click element")?;
        Ok(())
    }

    async fn fill(&self, value: &str) -> Result<()> {
        self.inner.click().await.context("Failed to focus input")?;
        self.inner
            .call_js_fn(CLEAR_VALUE_JS, false)
            .await
            .context("Failed to clear input")?;
        self.inner
            .type_str(value)
            .await
            .context("Failed to type into input")?;
        Ok(())
    }

    async fn press(&self, key: &str) -> Result<()> {
        self.inner
            .press_key(key)
            .await
            .with_context(|| format!("Failed to press {key}"))?;
        Ok(())
    }
}

/// Find Chrome/Chromium executable.
fn find_chrome() -> Option<PathBuf> {
    for binary in ["google-chrome", "chromium"] {
        if let Ok(output) = std::process::Command::new("which").arg(binary).output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    return Some(PathBuf::from(path));
                }
            }
        }
    }

    let candidates = [
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        "/run/current-system/sw/bin/google-chrome",
        "/run/current-system/sw/bin/chromium",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
    ];

    candidates
        .into_iter()
        .map(PathBuf::from)
        .find(|candidate| candidate.exists())
}
