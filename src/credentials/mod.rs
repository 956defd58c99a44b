//! Portal login credentials.
//!
//! The scraper needs exactly two secrets, a username and a password. Where
//! they come from is configured in the `[credentials]` section:
//!
//! ```toml
//! [credentials]
//! backend = "env"
//! username_var = "ENERGYLINK_USERNAME"
//! password_var = "ENERGYLINK_PASSWORD"
//! ```
//!
//! or, for a password-store entry:
//!
//! ```toml
//! [credentials]
//! backend = "pass"
//! path = "royalties/energylink"
//!
//! [credentials.fields]
//! username = "login"
//! ```

mod config;
mod env;
mod pass;

pub use config::CredentialConfig;
pub use env::{EnvConfig, EnvCredentialStore};
pub use pass::{PassConfig, PassCredentialStore};

use anyhow::Result;
use async_trait::async_trait;
use secrecy::SecretString;

/// Logical key for the portal username.
pub const USERNAME_KEY: &str = "username";
/// Logical key for the portal password.
pub const PASSWORD_KEY: &str = "password";

/// A read-only key-value view of a credential backend.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Retrieve a credential by logical key.
    ///
    /// Returns `Ok(None)` if the key doesn't exist.
    /// Returns `Err` if there was an error accessing the backend.
    async fn get(&self, key: &str) -> Result<Option<SecretString>>;
}

/// Credentials typed into the identity provider's form.
///
/// Either value may be absent; the login flow only fails on a missing value
/// when the provider actually asks for it (a remembered session may skip the
/// username step entirely).
#[derive(Clone, Default)]
pub struct PortalCredentials {
    pub username: Option<SecretString>,
    pub password: Option<SecretString>,
}

impl PortalCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(SecretString::from(username.into())),
            password: Some(SecretString::from(password.into())),
        }
    }

    /// Resolve both keys from a store.
    pub async fn load(store: &dyn CredentialStore) -> Result<Self> {
        Ok(Self {
            username: store.get(USERNAME_KEY).await?,
            password: store.get(PASSWORD_KEY).await?,
        })
    }
}

impl std::fmt::Debug for PortalCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortalCredentials")
            .field("username", &self.username.as_ref().map(|_| "[REDACTED]"))
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}
