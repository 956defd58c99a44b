//! Which portal page is the browser on?
//!
//! URL checks are pure. The few DOM probes each carry their own short
//! timeout, so a full classification is bounded by the sum of the probe
//! budgets and never hangs.

use anyhow::Result;

use crate::browser::{Driver, Element};
use crate::config::{PortalConfig, TimeoutConfig};

use super::selectors;

/// Recognized page states. `Unknown` is an answer, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    AuthenticatedHome,
    MfaChallenge,
    CredentialChallenge,
    PreLoginLanding,
    Unknown,
}

#[derive(Debug, Clone, Copy)]
pub struct PageClassifier<'a> {
    portal: &'a PortalConfig,
    timeouts: &'a TimeoutConfig,
}

impl<'a> PageClassifier<'a> {
    pub fn new(portal: &'a PortalConfig, timeouts: &'a TimeoutConfig) -> Self {
        Self { portal, timeouts }
    }

    pub fn is_authenticated_url(&self, url: &str) -> bool {
        url.contains(&self.portal.dashboard_path)
    }

    pub fn is_login_url(&self, url: &str) -> bool {
        let url = url.to_lowercase();
        self.portal
            .login_url_markers
            .iter()
            .any(|marker| url.contains(&marker.to_lowercase()))
    }

    pub fn is_mfa_url(&self, url: &str) -> bool {
        let url = url.to_lowercase();
        self.portal
            .mfa_url_markers
            .iter()
            .any(|marker| url.contains(&marker.to_lowercase()))
    }

    /// On the portal's own host, not the dashboard, and not bounced to the
    /// identity provider (whose URLs carry the portal host in a redirect
    /// parameter).
    pub fn is_pre_login_url(&self, url: &str) -> bool {
        url.to_lowercase().contains(&self.portal.host())
            && !self.is_authenticated_url(url)
            && !self.is_login_url(url)
    }

    pub async fn is_authenticated_home<D: Driver>(&self, driver: &D) -> Result<bool> {
        Ok(self.is_authenticated_url(&driver.current_url().await?))
    }

    pub async fn is_pre_login_landing<D: Driver>(&self, driver: &D) -> Result<bool> {
        Ok(self.is_pre_login_url(&driver.current_url().await?))
    }

    /// Identity-provider URL, or failing that, any login input on the page.
    pub async fn is_credential_challenge<D: Driver>(&self, driver: &D) -> Result<bool> {
        if self.is_login_url(&driver.current_url().await?) {
            return Ok(true);
        }
        Ok(!driver.query_all(selectors::USERNAME_INPUT).await?.is_empty()
            || !driver.query_all(selectors::PASSWORD_INPUT).await?.is_empty())
    }

    /// MFA URL marker, or one of the MFA texts showing up within its probe budget.
    pub async fn is_mfa_challenge<D: Driver>(&self, driver: &D) -> Result<bool> {
        if self.is_mfa_url(&driver.current_url().await?) {
            return Ok(true);
        }
        for (i, text) in self.portal.mfa_texts.iter().enumerate() {
            let budget = if i == 0 {
                self.timeouts.mfa_probe
            } else {
                self.timeouts.mfa_probe_followup
            };
            // A failed probe means "not this state".
            if driver.wait_for_text(text, budget).await.unwrap_or(false) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Run every predicate in priority order.
    pub async fn classify<D: Driver>(&self, driver: &D) -> Result<PageState> {
        if self.is_authenticated_home(driver).await? {
            return Ok(PageState::AuthenticatedHome);
        }
        if self.is_mfa_challenge(driver).await? {
            return Ok(PageState::MfaChallenge);
        }
        if self.is_credential_challenge(driver).await? {
            return Ok(PageState::CredentialChallenge);
        }
        if self.is_pre_login_landing(driver).await? {
            return Ok(PageState::PreLoginLanding);
        }
        Ok(PageState::Unknown)
    }
}

/// First element matching `selector` that is visible right now.
pub(crate) async fn first_visible<D: Driver>(
    driver: &D,
    selector: &str,
) -> Result<Option<D::Element>> {
    for element in driver.query_all(selector).await? {
        if element.is_visible().await.unwrap_or(false) {
            return Ok(Some(element));
        }
    }
    Ok(None)
}
