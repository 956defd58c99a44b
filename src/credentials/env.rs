//! Environment-variable credential backend.

use anyhow::Result;
use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use super::{CredentialStore, PASSWORD_KEY, USERNAME_KEY};

/// Names of the variables holding the portal credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    pub username_var: String,
    pub password_var: String,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            username_var: "ENERGYLINK_USERNAME".to_string(),
            password_var: "ENERGYLINK_PASSWORD".to_string(),
        }
    }
}

/// Reads credentials from the process environment.
pub struct EnvCredentialStore {
    config: EnvConfig,
}

impl EnvCredentialStore {
    pub fn new(config: EnvConfig) -> Self {
        Self { config }
    }

    fn var_name(&self, key: &str) -> Option<&str> {
        match key {
            USERNAME_KEY => Some(&self.config.username_var),
            PASSWORD_KEY => Some(&self.config.password_var),
            _ => None,
        }
    }
}

#[async_trait]
impl CredentialStore for EnvCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<SecretString>> {
        let Some(var) = self.var_name(key) else {
            return Ok(None);
        };
        // Unset and empty are treated alike.
        Ok(std::env::var(var)
            .ok()
            .filter(|v| !v.is_empty())
            .map(SecretString::from))
    }
}
