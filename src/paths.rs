//! Path helpers for LabDesk configuration and state directories
//!
//! Everything lives under the LabDesk root (`$LABDESK_HOME` or `~/.labdesk`):
//! - `config.json` shell options
//! - `state/` namespaced records written by the persistence store

use std::path::PathBuf;

// ============================================================================
// HOME DIRECTORY
// ============================================================================

/// Resolve the user's home directory across platforms.
pub fn get_home_dir() -> Result<PathBuf, String> {
    for key in ["HOME", "USERPROFILE"] {
        if let Ok(value) = std::env::var(key) {
            if !value.is_empty() {
                return Ok(PathBuf::from(value));
            }
        }
    }

    if let (Ok(drive), Ok(path)) = (std::env::var("HOMEDRIVE"), std::env::var("HOMEPATH")) {
        if !drive.is_empty() && !path.is_empty() {
            return Ok(PathBuf::from(format!("{}{}", drive, path)));
        }
    }

    Err("Could not determine home directory".to_string())
}

// ============================================================================
// LABDESK ROOT
// ============================================================================

/// Get the LabDesk home directory (~/.labdesk)
pub fn get_labdesk_root() -> Result<PathBuf, String> {
    if let Ok(override_home) = std::env::var("LABDESK_HOME") {
        if !override_home.is_empty() {
            return Ok(PathBuf::from(override_home));
        }
    }

    Ok(get_home_dir()?.join(".labdesk"))
}

/// Shell options file (~/.labdesk/config.json)
pub fn get_options_file_path() -> Result<PathBuf, String> {
    Ok(get_labdesk_root()?.join("config.json"))
}

/// Root directory of the persisted state store (~/.labdesk/state)
pub fn get_state_dir() -> Result<PathBuf, String> {
    Ok(get_labdesk_root()?.join("state"))
}

// ============================================================================
// TESTS
// ============================================================================
