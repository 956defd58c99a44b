//! Password-store (pass) credential backend.
//!
//! The entry's first line is the password; later lines are `field: value`
//! pairs. The entry is decrypted once per store, so a login that asks for
//! both username and password triggers a single GPG prompt.

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::sync::OnceCell;

use super::{CredentialStore, PASSWORD_KEY, USERNAME_KEY};

/// Field names tried for the username when no mapping is configured.
const USERNAME_FIELDS: &[&str] = &["username", "login", "user", "email"];

/// Configuration for a pass credential store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassConfig {
    /// The pass entry path (e.g., "royalties/energylink").
    pub path: String,

    /// Mapping from logical key names to field names in the pass entry.
    #[serde(default)]
    pub fields: HashMap<String, String>,
}

pub struct PassCredentialStore {
    config: PassConfig,
    entry: OnceCell<PassEntry>,
}

impl PassCredentialStore {
    pub fn new(config: PassConfig) -> Self {
        Self {
            config,
            entry: OnceCell::new(),
        }
    }

    /// Candidate field names for a logical key, most specific first.
    fn field_names<'a>(&'a self, key: &'a str) -> Vec<&'a str> {
        if let Some(mapped) = self.config.fields.get(key) {
            return vec![mapped.as_str()];
        }
        match key {
            USERNAME_KEY => USERNAME_FIELDS.to_vec(),
            other => vec![other],
        }
    }

    async fn entry(&self) -> Result<&PassEntry> {
        self.entry
            .get_or_try_init(|| async {
                tracing::debug!(path = %self.config.path, "Reading pass entry");
                let output = Command::new("pass")
                    .arg("show")
                    .arg(&self.config.path)
                    .output()
                    .await
                    .context("Failed to run pass command")?;

                if !output.status.success() {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    anyhow::bail!("pass show {} failed: {}", self.config.path, stderr.trim());
                }

                let content =
                    String::from_utf8(output.stdout).context("Invalid UTF-8 in pass output")?;
                Ok(PassEntry::parse(&content))
            })
            .await
    }
}

#[async_trait]
impl CredentialStore for PassCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<SecretString>> {
        let entry = self.entry().await?;
        Ok(self
            .field_names(key)
            .into_iter()
            .find_map(|field| entry.fields.get(field))
            .cloned()
            .map(SecretString::from))
    }
}

/// Decrypted entry. The first line is stored under the password key.
#[derive(Default)]
struct PassEntry {
    fields: HashMap<String, String>,
}

impl PassEntry {
    fn parse(content: &str) -> Self {
        let mut lines = content.lines();
        let mut fields = HashMap::new();

        if let Some(first) = lines.next().map(str::trim_end).filter(|l| !l.is_empty()) {
            fields.insert(PASSWORD_KEY.to_string(), first.to_string());
        }

        for line in lines {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let (key, value) = (key.trim().to_lowercase(), value.trim());
            if !key.is_empty() && !value.is_empty() {
                fields.entry(key).or_insert_with(|| value.to_string());
            }
        }

        Self { fields }
    }
}
