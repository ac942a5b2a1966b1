//! Hosted lab application: page options, setup and launch
//!
//! The lab itself is external. The controller only builds its setup
//! options from page-level options, sets the connection options and asks
//! it to start.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;

// ============================================================================
// PAGE OPTIONS
// ============================================================================

pub const OPTION_BASE_URL: &str = "baseUrl";
pub const OPTION_TOKEN: &str = "token";
pub const OPTION_TERMINALS_AVAILABLE: &str = "terminalsAvailable";
pub const OPTION_APP_VERSION: &str = "appVersion";
pub const OPTION_APP_NAME: &str = "appName";
pub const OPTION_APP_NAMESPACE: &str = "appNamespace";
pub const OPTION_DEV_MODE: &str = "devMode";
pub const OPTION_SETTINGS_DIR: &str = "settingsDir";
pub const OPTION_ASSETS_DIR: &str = "assetsDir";
pub const OPTION_IGNORE_PLUGINS: &str = "ignorePlugins";

/// Page-level key/value options read by the hosted application
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PageConfig {
    options: BTreeMap<String, String>,
}

impl PageConfig {
    pub fn new(options: BTreeMap<String, String>) -> Self {
        Self { options }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.options.insert(key.to_string(), value.into());
    }

    fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        match self.get(key) {
            Some(value) if !value.is_empty() => value,
            _ => default,
        }
    }
}

// ============================================================================
// SETUP & LAUNCH
// ============================================================================

/// Options the lab is constructed with before any server is known
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabConfig {
    pub name: String,
    pub namespace: String,
    pub version: String,
    pub dev_mode: bool,
    pub settings_dir: String,
    pub assets_dir: String,
    pub ignore_plugins: Vec<String>,
}

impl LabConfig {
    pub fn from_page_config(page: &PageConfig) -> Self {
        let version = page.get_or(OPTION_APP_VERSION, "unknown");
        let version = version.strip_prefix('v').unwrap_or(version);

        // Unparseable plugin lists are treated as "ignore nothing"
        let ignore_plugins = page
            .get(OPTION_IGNORE_PLUGINS)
            .and_then(|raw| serde_json::from_str::<Vec<String>>(raw).ok())
            .unwrap_or_default();

        Self {
            name: page.get_or(OPTION_APP_NAME, "LabDesk").to_string(),
            namespace: page.get_or(OPTION_APP_NAMESPACE, "labdesk").to_string(),
            version: version.to_string(),
            dev_mode: page.get_or(OPTION_DEV_MODE, "false").eq_ignore_ascii_case("true"),
            settings_dir: page.get_or(OPTION_SETTINGS_DIR, "").to_string(),
            assets_dir: page.get_or(OPTION_ASSETS_DIR, "").to_string(),
            ignore_plugins,
        }
    }
}

/// Everything the lab needs to connect when it starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabLaunch {
    pub base_url: String,
    pub token: String,
    pub ignore_plugins: Vec<String>,
    pub terminals_available: bool,
}

impl LabLaunch {
    pub fn new(page: &PageConfig, config: &LabConfig) -> Self {
        Self {
            base_url: page.get_or(OPTION_BASE_URL, "").to_string(),
            token: page.get_or(OPTION_TOKEN, "").to_string(),
            ignore_plugins: config.ignore_plugins.clone(),
            terminals_available: page.get(OPTION_TERMINALS_AVAILABLE) != Some("false"),
        }
    }
}

#[async_trait]
pub trait HostedApp: Send + Sync {
    /// Construct the lab and register its plugins. Errors are logged, not fatal.
    async fn setup(&self, config: &LabConfig) -> Result<(), String>;

    /// Start the lab against the server in `launch`
    fn start(&self, launch: &LabLaunch) -> Result<(), String>;
}

// ============================================================================
// TESTS
// ============================================================================
