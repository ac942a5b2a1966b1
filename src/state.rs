//! Render-state machine
//!
//! All controller state lives in [`ControllerState`]. [`update`] applies one
//! event and returns the effects the driver must carry out, so transitions
//! can be exercised without a UI, a store or a channel.

use crate::ipc::{InboundMessage, OutboundMessage, StartRequest};
use crate::lab::{OPTION_BASE_URL, OPTION_TERMINALS_AVAILABLE, OPTION_TOKEN};
use crate::persistence::LoadOutcome;
use crate::registry::ConnectionRegistry;
use crate::types::{
    ConnectionSet, ControllerSnapshot, RenderState, ServerDescriptor, ServerId, StartupMode,
    WindowState, LOCAL_SERVER_ID,
};
use log::{debug, info, warn};

/// Platform on which terminals are unavailable
const PLATFORM_WITHOUT_TERMINALS: &str = "win32";

// ============================================================================
// EVENTS & EFFECTS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    /// Persisted registry finished loading (possibly with nothing)
    StateLoaded(LoadOutcome),
    /// Hosted application setup resolved
    LabReady,
    Inbound(InboundMessage),
    /// An inbound message failed to decode
    ProtocolViolation(String),
    /// User picked a connection in the picker
    ServerSelected(ServerId),
    /// User added a connection in the picker
    ConnectionAdded(ServerDescriptor),
    /// Splash animation completed
    SplashFinished,
    /// Window is being torn down
    Teardown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Send(OutboundMessage),
    Persist(ConnectionSet),
    SetPageOption { key: &'static str, value: String },
    StartLab,
    FadeSplash,
    Render(RenderState),
    PublishConnections(ConnectionSet),
    ReportError(String),
}

#[derive(Debug, Clone, PartialEq)]
enum StopHook {
    Unregistered,
    Armed(ServerDescriptor),
    Fired,
}

// ============================================================================
// STATE
// ============================================================================

#[derive(Debug, Clone)]
pub struct ControllerState {
    registry: ConnectionRegistry,
    render: RenderState,
    active_server: Option<ServerDescriptor>,
    platform: Option<String>,
    strict: bool,
    restored: bool,
    persist_deferred: bool,
    lab_ready: bool,
    lab_started: bool,
    /// Id of the local connection a start was requested for
    local_start: Option<ServerId>,
    stop_hook: StopHook,
}

impl ControllerState {
    /// Build the initial state and the effects to run at construction
    pub fn new(mode: StartupMode, strict: bool) -> (Self, Vec<Effect>) {
        let mut state = Self {
            registry: ConnectionRegistry::new(),
            render: RenderState::Picker,
            active_server: None,
            platform: None,
            strict,
            restored: false,
            persist_deferred: false,
            lab_ready: false,
            lab_started: false,
            local_start: None,
            stop_hook: StopHook::Unregistered,
        };

        let mut effects = vec![Effect::Send(OutboundMessage::RequestPlatform)];
        if mode == StartupMode::Local {
            state.render = RenderState::Splash;
            state.local_start = Some(LOCAL_SERVER_ID);
            effects.push(Effect::Send(OutboundMessage::RequestServerStart(
                StartRequest::Implicit,
            )));
        }
        effects.push(Effect::Render(state.render));
        effects.push(Effect::PublishConnections(state.registry.connections().clone()));

        (state, effects)
    }

    pub fn render_state(&self) -> RenderState {
        self.render
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn active_server(&self) -> Option<&ServerDescriptor> {
        self.active_server.as_ref()
    }

    pub fn platform(&self) -> Option<&str> {
        self.platform.as_deref()
    }

    pub fn lab_started(&self) -> bool {
        self.lab_started
    }

    pub fn stop_hook_registered(&self) -> bool {
        !matches!(self.stop_hook, StopHook::Unregistered)
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            render_state: self.render,
            connections: self.registry.connections().clone(),
            active_server: self.active_server.clone(),
            platform: self.platform.clone(),
        }
    }

    fn report(&self, effects: &mut Vec<Effect>, message: String) {
        if self.strict {
            effects.push(Effect::ReportError(message));
        }
    }

    /// Persist now, or once saved state has loaded so a partial set never
    /// overwrites the saved record.
    fn persist(&mut self, effects: &mut Vec<Effect>) {
        if self.restored {
            effects.push(Effect::Persist(self.registry.connections().clone()));
        } else {
            debug!("[Controller] Deferring save until saved connections load");
            self.persist_deferred = true;
        }
    }

    fn set_page_option(effects: &mut Vec<Effect>, key: &'static str, value: &str) {
        effects.push(Effect::SetPageOption {
            key,
            value: value.to_string(),
        });
    }

    fn arrive_at_running(&mut self, effects: &mut Vec<Effect>) {
        if self.render == RenderState::Running {
            return;
        }
        info!("[Controller] Entering running state");
        self.render = RenderState::Running;
        effects.push(Effect::Render(RenderState::Running));
    }

    /// Start the lab once a server is bound and setup has resolved
    fn launch_if_ready(&mut self, effects: &mut Vec<Effect>) {
        let Some(server) = &self.active_server else {
            return;
        };
        if !self.lab_ready || self.lab_started {
            return;
        }

        let local = server.is_local();
        self.lab_started = true;
        effects.push(Effect::StartLab);
        if local {
            effects.push(Effect::FadeSplash);
        }
        self.arrive_at_running(effects);
    }
}

// ============================================================================
// TRANSITIONS
// ============================================================================

/// Apply one event to the state and return the effects to execute
pub fn update(state: &mut ControllerState, event: ControllerEvent) -> Vec<Effect> {
    let mut effects = Vec::new();

    match event {
        ControllerEvent::StateLoaded(outcome) => handle_state_loaded(state, outcome, &mut effects),
        ControllerEvent::LabReady => {
            if !state.lab_ready {
                debug!("[Controller] Lab setup resolved");
                state.lab_ready = true;
                state.launch_if_ready(&mut effects);
            }
        }
        ControllerEvent::Inbound(InboundMessage::Platform(platform)) => {
            handle_platform(state, platform, &mut effects)
        }
        ControllerEvent::Inbound(InboundMessage::ServerStarted(server)) => {
            handle_server_started(state, server, &mut effects)
        }
        ControllerEvent::ProtocolViolation(reason) => {
            warn!("[IPC] Ignoring message: {}", reason);
            state.report(&mut effects, reason);
        }
        ControllerEvent::ServerSelected(id) => handle_server_selected(state, id, &mut effects),
        ControllerEvent::ConnectionAdded(server) => {
            handle_connection_added(state, server, &mut effects)
        }
        ControllerEvent::SplashFinished => {
            if state.render == RenderState::Splash {
                state.arrive_at_running(&mut effects);
            } else {
                debug!("[Controller] Splash finished outside splash, ignoring");
            }
        }
        ControllerEvent::Teardown => {
            if let StopHook::Armed(server) = &state.stop_hook {
                info!("[Controller] Requesting stop of server {}", server.id);
                effects.push(Effect::Send(OutboundMessage::RequestServerStop(server.clone())));
                state.stop_hook = StopHook::Fired;
            }
        }
    }

    effects
}

fn handle_state_loaded(state: &mut ControllerState, outcome: LoadOutcome, effects: &mut Vec<Effect>) {
    if state.restored {
        debug!("[Controller] Saved connections already loaded, ignoring");
        return;
    }
    state.restored = true;

    for issue in outcome.issues {
        state.report(effects, issue);
    }

    let restored = state.registry.restore(outcome.connections);
    for issue in restored.dropped {
        state.report(effects, issue);
    }
    if restored.replaced {
        effects.push(Effect::PublishConnections(state.registry.connections().clone()));
    }

    if std::mem::take(&mut state.persist_deferred) {
        effects.push(Effect::Persist(state.registry.connections().clone()));
    }
}

fn handle_platform(state: &mut ControllerState, platform: String, effects: &mut Vec<Effect>) {
    if state.platform.is_some() {
        debug!("[Controller] Duplicate platform answer '{}', ignoring", platform);
        return;
    }

    info!("[Controller] Platform is {}", platform);
    if platform == PLATFORM_WITHOUT_TERMINALS {
        ControllerState::set_page_option(effects, OPTION_TERMINALS_AVAILABLE, "false");
    }
    state.platform = Some(platform);
}

fn handle_server_started(
    state: &mut ControllerState,
    mut server: ServerDescriptor,
    effects: &mut Vec<Effect>,
) {
    let Some(local_id) = state.local_start else {
        warn!("[Controller] Server started without a local start request, ignoring");
        return;
    };

    if !server.has_id() {
        server.id = local_id;
    }

    if state.stop_hook == StopHook::Unregistered {
        debug!("[Controller] Registering stop hook for server {}", server.id);
        state.stop_hook = StopHook::Armed(server.clone());
    }

    if state.active_server.is_some() || state.lab_started {
        debug!("[Controller] Duplicate server start for {}, ignoring", server.id);
        return;
    }

    info!(
        "[Controller] Local server {} ready at {}",
        server.id,
        server.url.as_deref().unwrap_or_default()
    );
    ControllerState::set_page_option(effects, OPTION_TOKEN, server.token.as_deref().unwrap_or_default());
    ControllerState::set_page_option(effects, OPTION_BASE_URL, server.url.as_deref().unwrap_or_default());
    state.active_server = Some(server);
    state.launch_if_ready(effects);
}

fn handle_server_selected(state: &mut ControllerState, id: ServerId, effects: &mut Vec<Effect>) {
    if state.render != RenderState::Picker {
        debug!("[Controller] Selection of {} outside picker, ignoring", id);
        return;
    }

    let Some(server) = state.registry.get(id).cloned() else {
        warn!("[Controller] Selected unknown connection {}", id);
        state.report(effects, format!("Unknown connection {}", id));
        return;
    };

    if server.is_local() {
        info!("[Controller] Starting local connection '{}'", server.name);
        state.persist(effects);
        state.local_start = Some(server.id);
        effects.push(Effect::Send(OutboundMessage::RequestServerStart(
            StartRequest::Descriptor(server),
        )));
        effects.push(Effect::Send(OutboundMessage::WindowStateUpdate(WindowState::Local)));
        state.render = RenderState::Splash;
        effects.push(Effect::Render(RenderState::Splash));
        return;
    }

    let Some(url) = server.url.clone().filter(|url| !url.is_empty()) else {
        warn!("[Controller] Remote connection '{}' has no url", server.name);
        state.report(effects, format!("Connection '{}' has no url", server.name));
        return;
    };

    info!("[Controller] Connecting to remote '{}' at {}", server.name, url);
    state.persist(effects);
    ControllerState::set_page_option(effects, OPTION_BASE_URL, &url);
    ControllerState::set_page_option(effects, OPTION_TOKEN, server.token.as_deref().unwrap_or_default());
    let server_id = server.id;
    state.active_server = Some(server);
    state.launch_if_ready(effects);
    effects.push(Effect::Send(OutboundMessage::WindowStateUpdate(
        WindowState::Remote { server_id },
    )));
    state.arrive_at_running(effects);
}

fn handle_connection_added(
    state: &mut ControllerState,
    mut server: ServerDescriptor,
    effects: &mut Vec<Effect>,
) {
    if state.render != RenderState::Picker {
        debug!("[Controller] Connection added outside picker, ignoring");
        return;
    }

    // The picker never assigns ids
    server.id = 0;
    match state.registry.append(server) {
        Ok(set) => {
            info!("[Controller] Added connection {}", set.servers.last().map(|s| s.id).unwrap_or(0));
            effects.push(Effect::PublishConnections(set.clone()));
        }
        Err(e) => {
            warn!("[Controller] Failed to add connection: {}", e);
            state.report(effects, e);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
