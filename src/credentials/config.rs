//! Credential backend selection, the `[credentials]` config section.

use serde::{Deserialize, Serialize};

use super::env::{EnvConfig, EnvCredentialStore};
use super::pass::{PassConfig, PassCredentialStore};
use super::CredentialStore;

/// Which backend supplies the portal login.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum CredentialConfig {
    /// Environment variables.
    Env {
        #[serde(flatten)]
        config: EnvConfig,
    },
    /// Password-store (pass) backend.
    Pass {
        #[serde(flatten)]
        config: PassConfig,
    },
}

impl Default for CredentialConfig {
    fn default() -> Self {
        CredentialConfig::Env {
            config: EnvConfig::default(),
        }
    }
}

impl CredentialConfig {
    /// Build a credential store from this configuration.
    pub fn build(&self) -> Box<dyn CredentialStore> {
        match self {
            CredentialConfig::Env { config } => Box::new(EnvCredentialStore::new(config.clone())),
            CredentialConfig::Pass { config } => {
                Box::new(PassCredentialStore::new(config.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pass_config() {
        let config: CredentialConfig = toml::from_str(
            r#"
backend = "pass"
path = "royalties/energylink"

[fields]
username = "login"
"#,
        )
        .unwrap();

        match config {
            CredentialConfig::Pass { config } => {
                assert_eq!(config.path, "royalties/energylink");
                assert_eq!(config.fields.get("username"), Some(&"login".to_string()));
            }
            other => panic!("expected pass backend, got {other:?}"),
        }
    }

    #[test]
    fn test_env_backend_defaults_variable_names() {
        let config: CredentialConfig = toml::from_str(r#"backend = "env""#).unwrap();

        match config {
            CredentialConfig::Env { config } => {
                assert_eq!(config.username_var, "ENERGYLINK_USERNAME");
                assert_eq!(config.password_var, "ENERGYLINK_PASSWORD");
            }
            other => panic!("expected env backend, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_backend_rejected() {
        assert!(toml::from_str::<CredentialConfig>(r#"backend = "vault""#).is_err());
    }
}
