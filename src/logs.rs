//! System log utilities for LabDesk
//!
//! Provides access to the application log file for debugging.

/// Log file stem written by the log plugin
pub const LOG_FILE_NAME: &str = "LabDesk";

const DEFAULT_MAX_LINES: usize = 1000;

/// Keep the last `max_lines` lines of a log file
pub fn tail_lines(content: &str, max_lines: Option<usize>) -> Vec<String> {
    let lines: Vec<&str> = content.lines().collect();
    let max = max_lines.unwrap_or(DEFAULT_MAX_LINES);
    let start = lines.len().saturating_sub(max);
    lines[start..].iter().map(|line| line.to_string()).collect()
}

// ============================================================================
// TAURI COMMANDS
// ============================================================================

#[cfg(feature = "desktop")]
mod commands {
    use super::{tail_lines, LOG_FILE_NAME};
    use tauri::{AppHandle, Manager};

    fn log_file(app_handle: &AppHandle) -> Result<std::path::PathBuf, String> {
        let log_dir = app_handle
            .path()
            .app_log_dir()
            .map_err(|e| format!("Failed to get log directory: {}", e))?;
        Ok(log_dir.join(format!("{}.log", LOG_FILE_NAME)))
    }

    /// Get the path to the system log file
    #[tauri::command]
    pub fn get_system_log_path(app_handle: AppHandle) -> Result<String, String> {
        Ok(log_file(&app_handle)?.to_string_lossy().to_string())
    }

    /// Read system logs from the log file
    #[tauri::command]
    pub fn get_system_logs(app_handle: AppHandle, max_lines: Option<usize>) -> Result<Vec<String>, String> {
        let log_file = log_file(&app_handle)?;

        if !log_file.exists() {
            return Ok(vec!["No logs yet.".to_string()]);
        }

        let content = std::fs::read_to_string(&log_file)
            .map_err(|e| format!("Failed to read log file: {}", e))?;

        Ok(tail_lines(&content, max_lines))
    }
}

#[cfg(feature = "desktop")]
pub use commands::{get_system_log_path, get_system_logs};

// ============================================================================
// TESTS
// ============================================================================
