//! Tauri adapters for the controller
//!
//! The background process is reached through app events named after the
//! IPC channels. The webview receives render/lab events and calls back
//! through the commands below.

use crate::controller::{ControllerHandle, UiSurface};
use crate::ipc::{Channel, IpcChannel, OutboundMessage};
use crate::lab::{HostedApp, LabConfig, LabLaunch};
use crate::types::{ConnectionSet, ControllerSnapshot, RenderState, ServerDescriptor, ServerId};
use async_trait::async_trait;
use log::{debug, warn};
use serde::Serialize;
use serde_json::Value;
use tauri::{AppHandle, Emitter, Listener, State};

pub const EVENT_RENDER_STATE: &str = "labdesk://render-state";
pub const EVENT_CONNECTIONS: &str = "labdesk://connections";
pub const EVENT_FADE_SPLASH: &str = "labdesk://fade-splash";
pub const EVENT_ERROR: &str = "labdesk://error";
pub const EVENT_LAB_SETUP: &str = "labdesk://lab-setup";
pub const EVENT_LAB_START: &str = "labdesk://lab-start";

fn emit_or_warn<S: Serialize + Clone>(app: &AppHandle, event: &str, payload: S) {
    if let Err(e) = app.emit(event, payload) {
        warn!("Failed to emit {}: {}", event, e);
    }
}

// ============================================================================
// ADAPTERS
// ============================================================================

pub struct TauriIpc {
    pub app: AppHandle,
}

impl IpcChannel for TauriIpc {
    fn send(&self, message: &OutboundMessage) -> Result<(), String> {
        self.app
            .emit(message.channel().name(), message.payload())
            .map_err(|e| format!("Failed to emit {}: {}", message.channel().name(), e))
    }
}

/// Forward inbound IPC channels to the controller
pub fn listen_inbound<L: Listener>(listener: &L, controller: &ControllerHandle) {
    for channel in Channel::INBOUND {
        let controller = controller.clone();
        listener.listen(channel.name(), move |event| {
            let payload = serde_json::from_str::<Value>(event.payload()).unwrap_or(Value::Null);
            debug!("[IPC] <- {}", channel.name());
            controller.deliver(channel.name(), payload);
        });
    }
}

pub struct WebviewSurface {
    pub app: AppHandle,
}

impl UiSurface for WebviewSurface {
    fn render(&self, state: RenderState) {
        emit_or_warn(&self.app, EVENT_RENDER_STATE, state);
    }

    fn connections_changed(&self, connections: &ConnectionSet) {
        emit_or_warn(&self.app, EVENT_CONNECTIONS, connections.clone());
    }

    fn fade_splash(&self) {
        emit_or_warn(&self.app, EVENT_FADE_SPLASH, ());
    }

    fn show_error(&self, message: &str) {
        emit_or_warn(&self.app, EVENT_ERROR, message.to_string());
    }
}

pub struct WebviewLab {
    pub app: AppHandle,
}

#[async_trait]
impl HostedApp for WebviewLab {
    async fn setup(&self, config: &LabConfig) -> Result<(), String> {
        self.app
            .emit(EVENT_LAB_SETUP, config.clone())
            .map_err(|e| format!("Failed to emit lab setup: {}", e))
    }

    fn start(&self, launch: &LabLaunch) -> Result<(), String> {
        self.app
            .emit(EVENT_LAB_START, launch.clone())
            .map_err(|e| format!("Failed to emit lab start: {}", e))
    }
}

// ============================================================================
// TAURI COMMANDS
// ============================================================================

#[tauri::command]
pub fn select_server(controller: State<'_, ControllerHandle>, server_id: ServerId) {
    controller.select_server(server_id);
}

#[tauri::command]
pub fn add_connection(
    controller: State<'_, ControllerHandle>,
    name: String,
    url: String,
    token: String,
) {
    controller.add_connection(ServerDescriptor::remote(name, url, token));
}

#[tauri::command]
pub fn splash_finished(controller: State<'_, ControllerHandle>) {
    controller.splash_finished();
}

#[tauri::command]
pub async fn get_controller_snapshot(
    controller: State<'_, ControllerHandle>,
) -> Result<ControllerSnapshot, String> {
    controller.snapshot().await
}
