//! Drives the browser from "not logged in" to the authenticated dashboard.
//!
//! The portal fronts a hosted identity provider that may show a username
//! step, a password step, both on one page, or an SMS MFA challenge, and a
//! persisted browser profile may skip any of them. The flow classifies the
//! page after every action instead of assuming a fixed sequence.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::browser::{find_by_text, settle, Driver, Element};
use crate::config::{PortalConfig, TimeoutConfig};
use crate::credentials::PortalCredentials;
use crate::duration::format_duration;

use super::classifier::{first_visible, PageClassifier};
use super::selectors;

/// Where the login attempt currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Landing,
    CredentialChallenge,
    MfaChallenge,
    Authenticated,
    Failed,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No recognizable page was reached. Carries the last URL for diagnosis.
    #[error("Login did not reach a known state. Current URL: {url}")]
    LoginFailed { url: String },

    /// An MFA challenge was shown and not completed in time.
    #[error("MFA challenge not completed within {}", format_duration(*.waited))]
    MfaRequired { waited: Duration },

    #[error("The login form asked for a {0} but none is configured")]
    MissingCredential(&'static str),

    #[error(transparent)]
    Driver(#[from] anyhow::Error),
}

const CONTINUE_LABELS: &[&str] = &["Continue"];
const SIGN_IN_LABELS: &[&str] = &["Sign In", "Log In"];

/// One login attempt against one browser tab.
pub struct AuthenticationFlow<'a, D: Driver> {
    driver: &'a D,
    portal: &'a PortalConfig,
    timeouts: &'a TimeoutConfig,
    credentials: &'a PortalCredentials,
    classifier: PageClassifier<'a>,
    history: Vec<AuthState>,
}

impl<'a, D: Driver> AuthenticationFlow<'a, D> {
    pub fn new(
        driver: &'a D,
        portal: &'a PortalConfig,
        timeouts: &'a TimeoutConfig,
        credentials: &'a PortalCredentials,
    ) -> Self {
        Self {
            driver,
            portal,
            timeouts,
            credentials,
            classifier: PageClassifier::new(portal, timeouts),
            history: Vec::new(),
        }
    }

    /// States entered so far, in order.
    pub fn history(&self) -> &[AuthState] {
        &self.history
    }

    pub fn state(&self) -> AuthState {
        self.history
            .last()
            .copied()
            .unwrap_or(AuthState::Unauthenticated)
    }

    fn enter(&mut self, state: AuthState) {
        if self.history.last() != Some(&state) {
            tracing::debug!(?state, "Auth state");
            self.history.push(state);
        }
    }

    /// Log in, returning once the dashboard is reached.
    pub async fn login(&mut self) -> Result<(), AuthError> {
        self.enter(AuthState::Unauthenticated);

        self.driver
            .goto(&self.portal.root_url(), self.timeouts.navigation)
            .await?;
        settle(self.timeouts.settle).await;

        let url = self.driver.current_url().await?;
        if self.classifier.is_authenticated_url(&url) {
            tracing::info!("Already authenticated (session restored from profile)");
            self.enter(AuthState::Authenticated);
            return Ok(());
        }

        if self.classifier.is_pre_login_url(&url) {
            self.enter(AuthState::Landing);
            self.click_sign_in().await?;
        }

        for round in 0..self.timeouts.poll_rounds {
            if self.classifier.is_authenticated_home(self.driver).await? {
                self.enter(AuthState::Authenticated);
                return Ok(());
            }

            if self.classifier.is_mfa_challenge(self.driver).await? {
                return self.wait_for_mfa().await;
            }

            if self.classifier.is_credential_challenge(self.driver).await?
                && self.has_visible_login_input().await?
            {
                self.enter(AuthState::CredentialChallenge);
                return self.submit_credentials().await;
            }

            tracing::debug!(round, "Waiting for a recognizable login page");
            settle(self.timeouts.poll_interval).await;
        }

        self.fail().await
    }

    async fn click_sign_in(&mut self) -> Result<(), AuthError> {
        let sign_in_text = self.portal.sign_in_text.to_uppercase();
        let link = find_by_text(self.driver, selectors::LINK, |text| {
            text.to_uppercase().contains(&sign_in_text)
        })
        .await?;

        match link {
            Some(link) => {
                tracing::info!("Clicking sign-in link on landing page");
                link.click().await?;
                settle(self.timeouts.sign_in_settle).await;
            }
            // Some landing variants redirect on their own.
            None => tracing::warn!("No sign-in link found on landing page"),
        }
        Ok(())
    }

    async fn has_visible_login_input(&self) -> Result<bool, AuthError> {
        Ok(first_visible(self.driver, selectors::USERNAME_INPUT)
            .await?
            .is_some()
            || first_visible(self.driver, selectors::PASSWORD_INPUT)
                .await?
                .is_some())
    }

    /// Username step (if shown), then password step.
    async fn submit_credentials(&mut self) -> Result<(), AuthError> {
        let credentials = self.credentials;

        if let Some(input) = first_visible(self.driver, selectors::USERNAME_INPUT).await? {
            let username = required(&credentials.username, "username")?;
            tracing::info!("Submitting username");
            input.fill(username.expose_secret()).await?;
            self.click_button(CONTINUE_LABELS, &input).await?;
            settle(self.timeouts.settle).await;

            if self.resolved().await? {
                return Ok(());
            }
        }

        let Some(input) = self
            .driver
            .wait_for_visible(selectors::PASSWORD_INPUT, self.timeouts.load)
            .await?
        else {
            tracing::warn!("Password field never appeared");
            return self.fail().await;
        };

        let password = required(&credentials.password, "password")?;
        tracing::info!("Submitting password");
        input.fill(password.expose_secret()).await?;
        self.click_button(SIGN_IN_LABELS, &input).await?;

        if self.resolved().await? {
            return Ok(());
        }
        settle(self.timeouts.submit_settle).await;
        if self.resolved().await? {
            return Ok(());
        }

        if self
            .driver
            .wait_for_url(&self.portal.dashboard_path, self.timeouts.navigation)
            .await?
        {
            self.enter(AuthState::Authenticated);
            return Ok(());
        }
        if self.classifier.is_mfa_challenge(self.driver).await? {
            return self.wait_for_mfa().await;
        }

        self.fail().await
    }

    /// Whether the login finished (directly or via MFA). MFA timing out is
    /// an error; "not yet" is `Ok(false)`.
    async fn resolved(&mut self) -> Result<bool, AuthError> {
        if self.classifier.is_authenticated_home(self.driver).await? {
            self.enter(AuthState::Authenticated);
            return Ok(true);
        }
        if self.classifier.is_mfa_challenge(self.driver).await? {
            self.wait_for_mfa().await?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Click the first button labeled with one of `labels`, else the form's
    /// submit button, else press Enter in `input`.
    async fn click_button(&self, labels: &[&str], input: &D::Element) -> Result<(), AuthError> {
        let labeled = find_by_text(self.driver, selectors::BUTTON, |text| {
            labels.iter().any(|label| text.eq_ignore_ascii_case(label))
        })
        .await?;
        if let Some(button) = labeled {
            button.click().await?;
            return Ok(());
        }

        if let Some(button) = self
            .driver
            .query_all(selectors::SUBMIT_BUTTON)
            .await?
            .into_iter()
            .next()
        {
            button.click().await?;
            return Ok(());
        }

        input.press("Enter").await?;
        Ok(())
    }

    /// Hand the browser to a human and wait for the dashboard.
    async fn wait_for_mfa(&mut self) -> Result<(), AuthError> {
        self.enter(AuthState::MfaChallenge);
        let waited = self.timeouts.mfa;
        tracing::warn!(
            "MFA challenge detected. Complete it in the browser window (waiting up to {}).",
            format_duration(waited)
        );

        if self
            .driver
            .wait_for_url(&self.portal.dashboard_path, waited)
            .await?
            || self.classifier.is_authenticated_home(self.driver).await?
        {
            tracing::info!("MFA completed");
            self.enter(AuthState::Authenticated);
            return Ok(());
        }

        self.enter(AuthState::Failed);
        Err(AuthError::MfaRequired { waited })
    }

    async fn fail(&mut self) -> Result<(), AuthError> {
        self.enter(AuthState::Failed);
        let url = self.driver.current_url().await?;
        Err(AuthError::LoginFailed { url })
    }
}

fn required<'s>(
    secret: &'s Option<SecretString>,
    what: &'static str,
) -> Result<&'s SecretString, AuthError> {
    secret.as_ref().ok_or(AuthError::MissingCredential(what))
}
