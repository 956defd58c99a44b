use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::credentials::CredentialConfig;
use crate::duration::{deserialize_duration, serialize_duration};

/// Default SQLite file name inside the data directory.
fn default_database() -> String {
    "royaltybook.db".to_string()
}

/// Where the portal lives and how its pages identify themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    /// Portal origin, without a trailing slash.
    pub base_url: String,

    /// Path of the authenticated dashboard. Reaching it means we are logged in.
    pub dashboard_path: String,

    /// Label of the dashboard tab holding the invoice grid.
    pub invoices_tab: String,

    /// Text of the sign-in link on the pre-login landing page.
    pub sign_in_text: String,

    /// URL substrings (lower-case) that identify the identity provider.
    pub login_url_markers: Vec<String>,

    /// URL substrings (lower-case) that identify an MFA challenge.
    pub mfa_url_markers: Vec<String>,

    /// Page texts that identify an MFA challenge, probed in order.
    pub mfa_texts: Vec<String>,

    /// Grid column id that only exists in the invoice grid.
    pub status_column: String,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: "https://app.energylink.com".to_string(),
            dashboard_path: "/Core/BSP/Dashboard".to_string(),
            invoices_tab: "Invoices / Checks".to_string(),
            sign_in_text: "SIGN IN".to_string(),
            login_url_markers: vec!["login.auth.enverus.com".to_string(), "authorize".to_string()],
            mfa_url_markers: vec!["mfa-sms-challenge".to_string()],
            mfa_texts: vec!["Verify Your Identity".to_string(), "Enter the code".to_string()],
            status_column: "status".to_string(),
        }
    }
}

impl PortalConfig {
    /// Host part of `base_url` in lower case (e.g. "app.energylink.com").
    pub fn host(&self) -> String {
        let without_scheme = self
            .base_url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.base_url);
        without_scheme
            .split('/')
            .next()
            .unwrap_or_default()
            .to_lowercase()
    }

    pub fn root_url(&self) -> String {
        format!("{}/", self.base_url.trim_end_matches('/'))
    }

    pub fn dashboard_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.dashboard_path)
    }
}

/// Every bounded wait the pipeline performs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Page navigation.
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub navigation: Duration,

    /// Waiting for an element (login inputs, detail tables).
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub load: Duration,

    /// Waiting for the first invoice grid row to render.
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub grid: Duration,

    /// How long a human gets to complete MFA in the browser window.
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub mfa: Duration,

    /// Pause after each detail page load, to go easy on the portal.
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub page_delay: Duration,

    /// Pause after loading the portal root and after switching tabs.
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub settle: Duration,

    /// Pause after clicking the sign-in link; it can bounce through redirects.
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub sign_in_settle: Duration,

    /// Pause after submitting credentials.
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub submit_settle: Duration,

    /// Pause between classification rounds while redirects play out.
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub poll_interval: Duration,

    /// First MFA text probe.
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub mfa_probe: Duration,

    /// Each following MFA text probe.
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub mfa_probe_followup: Duration,

    /// Pause after a grid page advance, before re-reading rows.
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub grid_page_settle: Duration,

    /// Classification rounds before login is declared stuck.
    pub poll_rounds: u32,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            navigation: Duration::from_secs(30),
            load: Duration::from_secs(15),
            grid: Duration::from_secs(20),
            mfa: Duration::from_secs(5 * 60),
            page_delay: Duration::from_millis(1500),
            settle: Duration::from_secs(2),
            sign_in_settle: Duration::from_secs(5),
            submit_settle: Duration::from_secs(5),
            poll_interval: Duration::from_secs(2),
            mfa_probe: Duration::from_secs(2),
            mfa_probe_followup: Duration::from_secs(1),
            grid_page_settle: Duration::from_secs(2),
            poll_rounds: 10,
        }
    }
}

impl TimeoutConfig {
    /// All waits collapsed to zero. Scripted drivers resolve instantly, so
    /// tests use this to avoid sleeping.
    pub fn immediate() -> Self {
        Self {
            navigation: Duration::ZERO,
            load: Duration::ZERO,
            grid: Duration::ZERO,
            mfa: Duration::ZERO,
            page_delay: Duration::ZERO,
            settle: Duration::ZERO,
            sign_in_settle: Duration::ZERO,
            submit_settle: Duration::ZERO,
            poll_interval: Duration::ZERO,
            mfa_probe: Duration::ZERO,
            mfa_probe_followup: Duration::ZERO,
            grid_page_settle: Duration::ZERO,
            poll_rounds: 10,
        }
    }
}

/// Browser launch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// Run without a window. MFA cannot be completed headless.
    pub headless: bool,

    /// Explicit Chrome/Chromium binary; searched for when unset.
    pub chrome_path: Option<PathBuf>,

    /// Persistent profile directory. Relative paths resolve against the data dir.
    pub profile_dir: Option<PathBuf>,

    pub window_width: u32,
    pub window_height: u32,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: false,
            chrome_path: None,
            profile_dir: None,
            window_width: 1280,
            window_height: 900,
        }
    }
}

/// Heuristics for locating statement detail tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Category header texts seen across operators' statement layouts.
    pub category_headers: Vec<String>,

    /// Texts that must all appear in a table for the header-text fallback to pick it.
    pub detail_header_markers: Vec<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            category_headers: [
                "PLANT PRODUCTS",
                "RESIDUE GAS",
                "OIL",
                "GAS DELIVERED TO PLANT",
                "GAS RESIDUE",
                "NGL",
                "GAS",
                "CONDENSATE",
                "CRUDE OIL",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            detail_header_markers: ["Code", "Type Desc", "ROYALTY"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Application configuration as written in `royaltybook.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to data directory. If relative, resolved from config file location.
    /// If not specified, defaults to the config file's directory.
    pub data_dir: Option<PathBuf>,

    /// SQLite file name (or path) inside the data directory.
    #[serde(default = "default_database")]
    pub database: String,

    pub portal: PortalConfig,
    pub timeouts: TimeoutConfig,
    pub browser: BrowserSettings,
    pub extraction: ExtractionConfig,
    pub credentials: CredentialConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            database: default_database(),
            portal: PortalConfig::default(),
            timeouts: TimeoutConfig::default(),
            browser: BrowserSettings::default(),
            extraction: ExtractionConfig::default(),
            credentials: CredentialConfig::default(),
        }
    }
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Resolve the data directory path.
    ///
    /// If `data_dir` is set and relative, it's resolved relative to `config_dir`.
    /// If `data_dir` is not set, returns `config_dir`.
    pub fn resolve_data_dir(&self, config_dir: &Path) -> PathBuf {
        match &self.data_dir {
            Some(data_dir) if data_dir.is_absolute() => data_dir.clone(),
            Some(data_dir) => config_dir.join(data_dir),
            None => config_dir.to_path_buf(),
        }
    }

    fn resolve(self, config_dir: &Path) -> ResolvedConfig {
        let data_dir = self.resolve_data_dir(config_dir);
        let database_path = data_dir.join(&self.database);
        let profile_dir = match &self.browser.profile_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => data_dir.join(dir),
            None => data_dir.join("browser_state"),
        };

        ResolvedConfig {
            data_dir,
            database_path,
            profile_dir,
            portal: self.portal,
            timeouts: self.timeouts,
            browser: self.browser,
            extraction: self.extraction,
            credentials: self.credentials,
        }
    }
}

/// Loaded configuration with resolved paths.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// The resolved data directory path.
    pub data_dir: PathBuf,

    /// Absolute path of the SQLite database.
    pub database_path: PathBuf,

    /// Absolute path of the persistent browser profile.
    pub profile_dir: PathBuf,

    pub portal: PortalConfig,
    pub timeouts: TimeoutConfig,
    pub browser: BrowserSettings,
    pub extraction: ExtractionConfig,
    pub credentials: CredentialConfig,
}

/// Returns the default config file path.
///
/// Resolution order:
/// 1. `./royaltybook.toml` if it exists in current directory
/// 2. `~/.local/share/royaltybook/royaltybook.toml` (XDG data directory)
pub fn default_config_path() -> PathBuf {
    let local_config = PathBuf::from("royaltybook.toml");
    if local_config.exists() {
        return local_config;
    }

    if let Some(data_dir) = dirs::data_dir() {
        return data_dir.join("royaltybook").join("royaltybook.toml");
    }

    local_config
}

impl ResolvedConfig {
    /// Load and resolve config from a file path.
    ///
    /// The data directory is resolved relative to the config file's parent directory.
    pub fn load(config_path: &Path) -> Result<Self> {
        let config_path = config_path
            .canonicalize()
            .with_context(|| format!("Config file not found: {}", config_path.display()))?;

        let config_dir = config_path
            .parent()
            .context("Config file has no parent directory")?;

        Ok(Config::load(&config_path)?.resolve(config_dir))
    }

    /// Load config, falling back to defaults if the file doesn't exist.
    ///
    /// Without a file, the config file's intended parent directory becomes
    /// the data directory.
    pub fn load_or_default(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            return Self::load(config_path);
        }

        let config_path = if config_path.is_relative() {
            std::env::current_dir()
                .context("Failed to get current directory")?
                .join(config_path)
        } else {
            config_path.to_path_buf()
        };

        let config_dir = config_path
            .parent()
            .context("Config path has no parent directory")?;

        Ok(Config::default().resolve(config_dir))
    }
}
