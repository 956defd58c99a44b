//! Browser automation seam.
//!
//! The scraper only needs a small set of primitives: navigate, read the URL,
//! query elements by CSS selector, bounded waits, read text/attributes, and
//! click/fill/press. Anything implementing [`Driver`] can run the pipeline;
//! the Chrome DevTools implementation lives in [`chrome`], tests use a
//! scripted driver.
//!
//! Every wait takes an explicit timeout and reports "not found" as a value
//! rather than an error, so callers can treat an elapsed wait as "not this
//! state" and move on.

#[cfg(feature = "chrome")]
pub mod chrome;

#[cfg(feature = "chrome")]
pub use chrome::{BrowserSession, ChromeDriver, ChromeElement};

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

/// A handle to one element of the current page.
#[async_trait]
pub trait Element: Send + Sync + Sized {
    /// Rendered text (`innerText`), untrimmed. Empty when the element has none.
    async fn text(&self) -> Result<String>;

    /// Value of an HTML attribute.
    async fn attribute(&self, name: &str) -> Result<Option<String>>;

    /// Current value of an input element.
    async fn value(&self) -> Result<String>;

    /// Descendants matching a CSS selector, in document order.
    async fn query_all(&self, selector: &str) -> Result<Vec<Self>>;

    /// Whether the element currently takes up space on screen.
    async fn is_visible(&self) -> Result<bool>;

    async fn click(&self) -> Result<()>;

    /// Replace the element's value with `value`, as if typed.
    async fn fill(&self, value: &str) -> Result<()>;

    /// Press a named key ("Enter") while the element has focus.
    async fn press(&self, key: &str) -> Result<()>;
}

/// One browser tab, driven sequentially.
#[async_trait]
pub trait Driver: Send + Sync {
    type Element: Element;

    /// Load `url` and wait for the document, failing after `timeout`.
    async fn goto(&self, url: &str, timeout: Duration) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    /// All elements matching a CSS selector, in document order.
    async fn query_all(&self, selector: &str) -> Result<Vec<Self::Element>>;

    /// First element matching `selector` once it is visible; `None` if none
    /// became visible within `timeout`.
    async fn wait_for_visible(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<Option<Self::Element>>;

    /// Whether `text` appears in the page body within `timeout`.
    async fn wait_for_text(&self, text: &str, timeout: Duration) -> Result<bool>;

    /// Block until the URL contains `fragment` (following navigations as they
    /// happen), returning `false` once `timeout` elapses.
    async fn wait_for_url(&self, fragment: &str, timeout: Duration) -> Result<bool>;
}

/// First element matching `selector` whose trimmed text satisfies `pred`.
pub async fn find_by_text<D, F>(driver: &D, selector: &str, pred: F) -> Result<Option<D::Element>>
where
    D: Driver,
    F: Fn(&str) -> bool + Send,
{
    for element in driver.query_all(selector).await? {
        if pred(element.text().await?.trim()) {
            return Ok(Some(element));
        }
    }
    Ok(None)
}

/// Trimmed text of every element in `elements`.
pub async fn texts<E: Element>(elements: &[E]) -> Result<Vec<String>> {
    let mut out = Vec::with_capacity(elements.len());
    for element in elements {
        out.push(element.text().await?.trim().to_string());
    }
    Ok(out)
}

/// Sleep for `delay` unless it is zero.
pub async fn settle(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
