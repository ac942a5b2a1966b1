//! LabDesk - Main library entry point
//!
//! The controller core (connection registry, render-state machine, IPC
//! messages, persistence) is plain async Rust. The Tauri shell that hosts
//! it is compiled with the `desktop` feature.

// ============================================================================
// MODULES
// ============================================================================

// Shared types
pub mod types;

// Path helpers
pub mod paths;

// Shell options (startup mode, page options)
pub mod preferences;

// Known server connections and id allocation
pub mod registry;

// Saved connection list
pub mod persistence;

// Background process channels and messages
pub mod ipc;

// Hosted lab application
pub mod lab;

// Render-state machine
pub mod state;

// Async driver for the state machine
pub mod controller;

// System log access
pub mod logs;

// Tauri adapters and commands
#[cfg(feature = "desktop")]
pub mod desktop;

pub use controller::{Controller, ControllerHandle, UiSurface};
pub use ipc::{InboundMessage, IpcChannel, OutboundMessage};
pub use lab::HostedApp;
pub use persistence::{JsonFileStateStore, MemoryStateStore, StateStore};
pub use types::{ConnectionSet, ControllerSnapshot, RenderState, ServerDescriptor, StartupMode};

// ============================================================================
// MAIN ENTRY POINT
// ============================================================================

#[cfg(feature = "desktop")]
mod shell {
    use crate::controller::{Controller, ControllerHandle};
    use crate::desktop::{self, TauriIpc, WebviewLab, WebviewSurface};
    use crate::logs;
    use crate::paths::get_state_dir;
    use crate::persistence::JsonFileStateStore;
    use crate::preferences::load_shell_options;
    use log::{info, warn};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tauri::{AppHandle, Manager};
    use tauri_plugin_log::{Target, TargetKind};

    fn run_shutdown_cleanup(cleanup_guard: &Arc<AtomicBool>, app: &AppHandle, reason: &str) {
        if cleanup_guard.swap(true, Ordering::SeqCst) {
            return;
        }

        info!("Shutdown cleanup triggered: {}", reason);

        match app.try_state::<ControllerHandle>() {
            Some(controller) => {
                let controller = controller.inner().clone();
                tauri::async_runtime::block_on(controller.teardown());
                info!("Controller torn down");
            }
            None => warn!("Controller was never started, nothing to clean up"),
        }
    }

    #[cfg_attr(mobile, tauri::mobile_entry_point)]
    pub fn run() {
        let cleanup_guard = Arc::new(AtomicBool::new(false));
        let cleanup_guard_for_window = cleanup_guard.clone();
        let cleanup_guard_for_run_event = cleanup_guard.clone();

        let app = tauri::Builder::default()
            .plugin(
                tauri_plugin_log::Builder::new()
                    .targets([
                        Target::new(TargetKind::Stdout),
                        Target::new(TargetKind::LogDir {
                            file_name: Some(logs::LOG_FILE_NAME.to_string()),
                        }),
                    ])
                    .max_file_size(5_000_000)
                    .rotation_strategy(tauri_plugin_log::RotationStrategy::KeepOne)
                    .build(),
            )
            .invoke_handler(tauri::generate_handler![
                // Picker and splash (from desktop module)
                desktop::select_server,
                desktop::add_connection,
                desktop::splash_finished,
                desktop::get_controller_snapshot,
                // System logs (from logs module)
                logs::get_system_logs,
                logs::get_system_log_path,
            ])
            .setup(|app| {
                let options = load_shell_options();
                info!(
                    "Starting LabDesk in {:?} mode (strict validation: {})",
                    options.state, options.strict_validation
                );

                let store = Arc::new(JsonFileStateStore::new(get_state_dir()?));
                let handle = app.handle().clone();

                let (controller, controller_handle) = Controller::new(
                    options,
                    store,
                    Arc::new(TauriIpc { app: handle.clone() }),
                    Arc::new(WebviewSurface { app: handle.clone() }),
                    Arc::new(WebviewLab { app: handle }),
                );

                desktop::listen_inbound(app.handle(), &controller_handle);
                tauri::async_runtime::spawn(controller.run());
                app.manage(controller_handle);

                Ok(())
            })
            .on_window_event(move |window, event| {
                if let tauri::WindowEvent::Destroyed = event {
                    run_shutdown_cleanup(&cleanup_guard_for_window, window.app_handle(), "window destroyed");
                }
            })
            .build(tauri::generate_context!())
            .expect("error while building tauri application");

        app.run(move |app_handle, event| {
            if let tauri::RunEvent::ExitRequested { .. } = event {
                run_shutdown_cleanup(&cleanup_guard_for_run_event, app_handle, "exit requested");
            }
        });
    }
}

#[cfg(feature = "desktop")]
pub use shell::run;

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests;
