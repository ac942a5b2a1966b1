//! Shell options for LabDesk
//!
//! Read once at startup from `config.json` under the LabDesk root. The file
//! may use JSON5 syntax. A missing or broken file never blocks startup.

use crate::paths::get_options_file_path;
use crate::types::StartupMode;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Environment override for the startup mode flag
pub const STARTUP_MODE_ENV: &str = "LABDESK_STARTUP_MODE";

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShellOptions {
    /// `"local"` begins in the splash with an implicit local server
    #[serde(default)]
    pub state: StartupMode,
    /// Surface malformed saved records and IPC payloads to the UI
    #[serde(default)]
    pub strict_validation: bool,
    /// Initial page-level options handed to the hosted application
    #[serde(default)]
    pub page_config: BTreeMap<String, String>,
}

/// Parse shell options from file content (JSON or JSON5)
pub fn parse_shell_options(content: &str) -> Result<ShellOptions, String> {
    json5::from_str(content).map_err(|e| format!("Failed to parse shell options: {}", e))
}

/// Load shell options from an explicit path, falling back to defaults
pub fn load_shell_options_from(path: &Path) -> ShellOptions {
    if !path.exists() {
        return ShellOptions::default();
    }

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!("Failed to read shell options {:?}: {}", path, e);
            return ShellOptions::default();
        }
    };

    parse_shell_options(&content).unwrap_or_else(|e| {
        warn!("{} ({:?}), using defaults", e, path);
        ShellOptions::default()
    })
}

/// Load shell options from the LabDesk root, applying env overrides
pub fn load_shell_options() -> ShellOptions {
    let mut options = match get_options_file_path() {
        Ok(path) => load_shell_options_from(&path),
        Err(e) => {
            warn!("Failed to resolve shell options path: {}", e);
            ShellOptions::default()
        }
    };

    if let Ok(mode) = std::env::var(STARTUP_MODE_ENV) {
        if !mode.is_empty() {
            options.state = StartupMode::from(mode);
        }
    }

    options
}

// ============================================================================
// TESTS
// ============================================================================
