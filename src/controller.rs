//! Controller driver
//!
//! Runs the render-state machine on a single task. Every input (user
//! actions, inbound IPC, persistence load, lab setup) arrives as an event
//! on one channel and is applied in order; the resulting effects are
//! carried out against the collaborators.

use crate::ipc::{InboundMessage, IpcChannel};
use crate::lab::{HostedApp, LabConfig, LabLaunch, PageConfig};
use crate::persistence::{PersistenceBridge, StateStore};
use crate::preferences::ShellOptions;
use crate::state::{update, ControllerEvent, ControllerState, Effect};
use crate::types::{ConnectionSet, ControllerSnapshot, RenderState, ServerDescriptor, ServerId};
use log::{debug, error, info, warn};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

// ============================================================================
// UI SURFACE
// ============================================================================

/// Presentation layer: picker list, splash and error display
pub trait UiSurface: Send + Sync {
    fn render(&self, state: RenderState);
    fn connections_changed(&self, connections: &ConnectionSet);
    fn fade_splash(&self);
    fn show_error(&self, message: &str);
}

// ============================================================================
// HANDLE
// ============================================================================

enum Envelope {
    Event(ControllerEvent),
    Snapshot(oneshot::Sender<ControllerSnapshot>),
    Teardown(oneshot::Sender<()>),
}

/// Cloneable entry point used by the UI and the IPC listener
#[derive(Clone)]
pub struct ControllerHandle {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl ControllerHandle {
    fn post(&self, event: ControllerEvent) {
        if self.tx.send(Envelope::Event(event)).is_err() {
            debug!("[Controller] Stopped, dropping event");
        }
    }

    pub fn select_server(&self, id: ServerId) {
        self.post(ControllerEvent::ServerSelected(id));
    }

    pub fn add_connection(&self, server: ServerDescriptor) {
        self.post(ControllerEvent::ConnectionAdded(server));
    }

    pub fn splash_finished(&self) {
        self.post(ControllerEvent::SplashFinished);
    }

    /// Deliver a raw message from the background process.
    /// Messages that fail to decode are ignored (and logged).
    pub fn deliver(&self, channel: &str, payload: Value) {
        match InboundMessage::decode(channel, payload) {
            Ok(message) => self.post(ControllerEvent::Inbound(message)),
            Err(reason) => self.post(ControllerEvent::ProtocolViolation(reason)),
        }
    }

    pub async fn snapshot(&self) -> Result<ControllerSnapshot, String> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Envelope::Snapshot(tx))
            .map_err(|_| "Controller is not running".to_string())?;
        rx.await.map_err(|_| "Controller stopped before answering".to_string())
    }

    /// Fire the stop hook and flush pending saves. Returns once done.
    pub async fn teardown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(Envelope::Teardown(tx)).is_ok() {
            let _ = rx.await;
        }
    }
}

// ============================================================================
// DRIVER
// ============================================================================

pub struct Controller {
    state: ControllerState,
    initial_effects: Vec<Effect>,
    options: ShellOptions,
    store: Arc<dyn StateStore>,
    ipc: Arc<dyn IpcChannel>,
    ui: Arc<dyn UiSurface>,
    lab: Arc<dyn HostedApp>,
    tx: mpsc::UnboundedSender<Envelope>,
    rx: mpsc::UnboundedReceiver<Envelope>,
}

impl Controller {
    pub fn new(
        options: ShellOptions,
        store: Arc<dyn StateStore>,
        ipc: Arc<dyn IpcChannel>,
        ui: Arc<dyn UiSurface>,
        lab: Arc<dyn HostedApp>,
    ) -> (Self, ControllerHandle) {
        let (state, initial_effects) = ControllerState::new(options.state, options.strict_validation);
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ControllerHandle { tx: tx.clone() };

        let controller = Self {
            state,
            initial_effects,
            options,
            store,
            ipc,
            ui,
            lab,
            tx,
            rx,
        };
        (controller, handle)
    }

    /// Run until teardown or until every handle is dropped
    pub async fn run(self) {
        let Controller {
            mut state,
            initial_effects,
            options,
            store,
            ipc,
            ui,
            lab,
            tx,
            mut rx,
        } = self;

        let bridge = PersistenceBridge::new(store);
        let mut page_config = PageConfig::new(options.page_config);
        let lab_config = LabConfig::from_page_config(&page_config);

        let mut executor = EffectExecutor {
            ipc,
            ui,
            lab: lab.clone(),
            bridge: bridge.clone(),
            lab_config: lab_config.clone(),
        };

        info!("[Controller] Starting in {:?}", state.render_state());
        executor.apply(&mut page_config, initial_effects);

        // Saved state and lab setup resolve independently of IPC traffic
        let load_tx = tx.clone();
        let load_bridge = bridge.clone();
        tokio::spawn(async move {
            let outcome = load_bridge.load().await;
            let _ = load_tx.send(Envelope::Event(ControllerEvent::StateLoaded(outcome)));
        });

        let setup_tx = tx;
        tokio::spawn(async move {
            if let Err(e) = lab.setup(&lab_config).await {
                error!("[Controller] Lab setup failed: {}", e);
            }
            let _ = setup_tx.send(Envelope::Event(ControllerEvent::LabReady));
        });

        while let Some(envelope) = rx.recv().await {
            match envelope {
                Envelope::Event(event) => {
                    let effects = update(&mut state, event);
                    executor.apply(&mut page_config, effects);
                }
                Envelope::Snapshot(reply) => {
                    let _ = reply.send(state.snapshot());
                }
                Envelope::Teardown(done) => {
                    let effects = update(&mut state, ControllerEvent::Teardown);
                    executor.apply(&mut page_config, effects);
                    bridge.flush().await;
                    info!("[Controller] Torn down");
                    let _ = done.send(());
                    break;
                }
            }
        }
    }
}

struct EffectExecutor {
    ipc: Arc<dyn IpcChannel>,
    ui: Arc<dyn UiSurface>,
    lab: Arc<dyn HostedApp>,
    bridge: PersistenceBridge,
    lab_config: LabConfig,
}

impl EffectExecutor {
    fn apply(&mut self, page_config: &mut PageConfig, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Send(message) => {
                    debug!("[IPC] -> {}", message.channel().name());
                    if let Err(e) = self.ipc.send(&message) {
                        warn!("[IPC] Failed to send {}: {}", message.channel().name(), e);
                    }
                }
                Effect::Persist(set) => self.bridge.save(set),
                Effect::SetPageOption { key, value } => page_config.set(key, value),
                Effect::StartLab => {
                    let launch = LabLaunch::new(page_config, &self.lab_config);
                    // Best effort: the UI moves on even if the lab fails
                    if let Err(e) = self.lab.start(&launch) {
                        error!("[Controller] Failed to start lab: {}", e);
                    }
                }
                Effect::FadeSplash => self.ui.fade_splash(),
                Effect::Render(state) => self.ui.render(state),
                Effect::PublishConnections(set) => self.ui.connections_changed(&set),
                Effect::ReportError(message) => self.ui.show_error(&message),
            }
        }
    }
}
