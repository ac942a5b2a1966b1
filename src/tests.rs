//! Tests for the LabDesk controller driver
//!
//! Covers:
//! - Local startup (implicit start, splash, single lab start, stop on teardown)
//! - Remote selection from the picker
//! - Adding connections and persisting the registry
//! - Malformed IPC and corrupt saved state
//! - Lab start failures

use super::*;
use crate::ipc::StartRequest;
use crate::lab::{LabConfig, LabLaunch, OPTION_APP_NAME};
use crate::persistence::{SERVER_STATE_ID, STATE_NAMESPACE};
use crate::preferences::ShellOptions;
use crate::types::{ServerType, WindowState, LOCAL_SERVER_ID};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;

// ==================== RECORDING FAKES ====================

#[derive(Default)]
struct RecordingIpc {
    sent: Mutex<Vec<OutboundMessage>>,
}

impl RecordingIpc {
    fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }

    fn count(&self, wanted: impl Fn(&OutboundMessage) -> bool) -> usize {
        self.sent().iter().filter(|&message| wanted(message)).count()
    }
}

impl IpcChannel for RecordingIpc {
    fn send(&self, message: &OutboundMessage) -> Result<(), String> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

#[derive(Default)]
struct RecordingUi {
    renders: Mutex<Vec<RenderState>>,
    connections: Mutex<Vec<ConnectionSet>>,
    fades: Mutex<usize>,
    errors: Mutex<Vec<String>>,
}

impl RecordingUi {
    fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }

    fn last_connections(&self) -> Option<ConnectionSet> {
        self.connections.lock().unwrap().last().cloned()
    }
}

impl UiSurface for RecordingUi {
    fn render(&self, state: RenderState) {
        self.renders.lock().unwrap().push(state);
    }

    fn connections_changed(&self, connections: &ConnectionSet) {
        self.connections.lock().unwrap().push(connections.clone());
    }

    fn fade_splash(&self) {
        *self.fades.lock().unwrap() += 1;
    }

    fn show_error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }
}

#[derive(Default)]
struct RecordingLab {
    setups: Mutex<Vec<LabConfig>>,
    launches: Mutex<Vec<LabLaunch>>,
    fail_start: bool,
}

impl RecordingLab {
    fn failing() -> Self {
        Self {
            fail_start: true,
            ..Default::default()
        }
    }

    fn launches(&self) -> Vec<LabLaunch> {
        self.launches.lock().unwrap().clone()
    }
}

#[async_trait]
impl HostedApp for RecordingLab {
    async fn setup(&self, config: &LabConfig) -> Result<(), String> {
        self.setups.lock().unwrap().push(config.clone());
        Ok(())
    }

    fn start(&self, launch: &LabLaunch) -> Result<(), String> {
        self.launches.lock().unwrap().push(launch.clone());
        if self.fail_start {
            return Err("lab exploded".to_string());
        }
        Ok(())
    }
}

// ==================== HARNESS ====================

struct Harness {
    handle: ControllerHandle,
    ipc: Arc<RecordingIpc>,
    ui: Arc<RecordingUi>,
    lab: Arc<RecordingLab>,
    task: JoinHandle<()>,
}

fn spawn_controller(options: ShellOptions, store: Arc<dyn StateStore>, lab: RecordingLab) -> Harness {
    let ipc = Arc::new(RecordingIpc::default());
    let ui = Arc::new(RecordingUi::default());
    let lab = Arc::new(lab);

    let (controller, handle) = Controller::new(options, store, ipc.clone(), ui.clone(), lab.clone());
    let task = tokio::spawn(controller.run());

    Harness {
        handle,
        ipc,
        ui,
        lab,
        task,
    }
}

fn picker_options() -> ShellOptions {
    ShellOptions {
        state: StartupMode::Picker,
        ..Default::default()
    }
}

async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("Timed out waiting for {}", what);
}

async fn wait_for_snapshot(
    handle: &ControllerHandle,
    what: &str,
    condition: impl Fn(&ControllerSnapshot) -> bool,
) -> ControllerSnapshot {
    for _ in 0..200 {
        let snapshot = handle.snapshot().await.unwrap();
        if condition(&snapshot) {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("Timed out waiting for {}", what);
}

fn saved_record(servers: Value) -> MemoryStateStore {
    let store = MemoryStateStore::new();
    store.insert(STATE_NAMESPACE, SERVER_STATE_ID, json!({ "servers": servers }));
    store
}

fn started_payload() -> Value {
    json!({ "url": "http://127.0.0.1:8888/", "token": "secret" })
}

fn is_stop(message: &OutboundMessage) -> bool {
    matches!(message, OutboundMessage::RequestServerStop(_))
}

// ==================== LOCAL STARTUP ====================

#[tokio::test]
async fn test_local_startup_launches_lab_once() {
    let harness = spawn_controller(
        ShellOptions::default(),
        Arc::new(MemoryStateStore::new()),
        RecordingLab::default(),
    );

    let snapshot = harness.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.render_state, RenderState::Splash);
    assert_eq!(
        harness.ipc.sent()[..2],
        [
            OutboundMessage::RequestPlatform,
            OutboundMessage::RequestServerStart(StartRequest::Implicit),
        ]
    );

    harness.handle.deliver("server-started", started_payload());
    harness.handle.splash_finished();
    wait_until("lab start", || harness.lab.launches().len() == 1).await;

    // Late duplicates change nothing
    harness.handle.deliver("server-started", started_payload());
    harness.handle.splash_finished();
    let snapshot = harness.handle.snapshot().await.unwrap();

    assert_eq!(snapshot.render_state, RenderState::Running);
    assert_eq!(harness.lab.launches().len(), 1);
    assert_eq!(*harness.ui.fades.lock().unwrap(), 1);

    let launch = &harness.lab.launches()[0];
    assert_eq!(launch.base_url, "http://127.0.0.1:8888/");
    assert_eq!(launch.token, "secret");

    let active = snapshot.active_server.unwrap();
    assert_eq!(active.id, LOCAL_SERVER_ID);
    assert_eq!(active.server_type, ServerType::Local);
}

#[tokio::test]
async fn test_local_teardown_stops_server_once() {
    let harness = spawn_controller(
        ShellOptions::default(),
        Arc::new(MemoryStateStore::new()),
        RecordingLab::default(),
    );

    harness.handle.deliver("server-started", started_payload());
    wait_for_snapshot(&harness.handle, "active server", |s| s.active_server.is_some()).await;

    harness.handle.teardown().await;
    harness.handle.teardown().await;
    harness.task.await.unwrap();

    let stops: Vec<_> = harness.ipc.sent().into_iter().filter(is_stop).collect();
    assert_eq!(stops.len(), 1);
    match &stops[0] {
        OutboundMessage::RequestServerStop(server) => {
            assert_eq!(server.id, LOCAL_SERVER_ID);
            assert_eq!(server.url.as_deref(), Some("http://127.0.0.1:8888/"));
        }
        other => panic!("unexpected message {:?}", other),
    }

    // Controller is gone; queries fail instead of hanging
    assert!(harness.handle.snapshot().await.is_err());
}

#[tokio::test]
async fn test_teardown_without_server_sends_no_stop() {
    let harness = spawn_controller(picker_options(), Arc::new(MemoryStateStore::new()), RecordingLab::default());

    harness.handle.teardown().await;
    harness.task.await.unwrap();

    assert_eq!(harness.ipc.count(is_stop), 0);
}

#[tokio::test]
async fn test_windows_platform_disables_terminals() {
    let harness = spawn_controller(
        ShellOptions::default(),
        Arc::new(MemoryStateStore::new()),
        RecordingLab::default(),
    );

    harness.handle.deliver("send-platform", json!("win32"));
    harness.handle.deliver("server-started", started_payload());
    wait_until("lab start", || harness.lab.launches().len() == 1).await;

    assert!(!harness.lab.launches()[0].terminals_available);
    let snapshot = harness.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.platform.as_deref(), Some("win32"));
}

#[tokio::test]
async fn test_lab_setup_uses_page_config() {
    let mut options = ShellOptions::default();
    options.page_config.insert(OPTION_APP_NAME.to_string(), "Notebook Lab".to_string());
    let harness = spawn_controller(options, Arc::new(MemoryStateStore::new()), RecordingLab::default());

    wait_until("lab setup", || !harness.lab.setups.lock().unwrap().is_empty()).await;
    assert_eq!(harness.lab.setups.lock().unwrap()[0].name, "Notebook Lab");
}

// ==================== PICKER ====================

#[tokio::test]
async fn test_remote_selection_reaches_running() {
    let store = saved_record(json!([
        { "id": 1, "name": "Local", "type": "local" },
        { "id": 3, "name": "Cluster", "type": "remote", "url": "https://lab.example.org/", "token": "abc" },
    ]));
    let harness = spawn_controller(picker_options(), Arc::new(store.clone()), RecordingLab::default());

    wait_for_snapshot(&harness.handle, "restore", |s| s.connections.len() == 2).await;
    harness.handle.select_server(3);
    let snapshot = wait_for_snapshot(&harness.handle, "running", |s| {
        s.render_state == RenderState::Running
    })
    .await;
    assert_eq!(snapshot.active_server.map(|s| s.id), Some(3));

    wait_until("lab start", || harness.lab.launches().len() == 1).await;
    let launch = &harness.lab.launches()[0];
    assert_eq!(launch.base_url, "https://lab.example.org/");
    assert_eq!(launch.token, "abc");

    let window_updates: Vec<_> = harness
        .ipc
        .sent()
        .into_iter()
        .filter_map(|message| match message {
            OutboundMessage::WindowStateUpdate(state) => Some(state),
            _ => None,
        })
        .collect();
    assert_eq!(window_updates, vec![WindowState::Remote { server_id: 3 }]);
    assert_eq!(
        OutboundMessage::WindowStateUpdate(window_updates[0]).payload(),
        json!({ "state": "remote", "serverId": 3 })
    );

    // Remote connections are never stopped
    harness.handle.teardown().await;
    assert_eq!(harness.ipc.count(is_stop), 0);
    assert_eq!(*harness.ui.fades.lock().unwrap(), 0);
}

#[tokio::test]
async fn test_local_selection_starts_descriptor() {
    let harness = spawn_controller(picker_options(), Arc::new(MemoryStateStore::new()), RecordingLab::default());

    harness.handle.select_server(LOCAL_SERVER_ID);
    wait_for_snapshot(&harness.handle, "splash", |s| s.render_state == RenderState::Splash).await;

    let sent = harness.ipc.sent();
    assert!(sent.iter().any(|message| matches!(
        message,
        OutboundMessage::RequestServerStart(StartRequest::Descriptor(server)) if server.id == LOCAL_SERVER_ID
    )));
    assert!(sent.contains(&OutboundMessage::WindowStateUpdate(WindowState::Local)));

    harness.handle.deliver("server-started", started_payload());
    harness.handle.splash_finished();
    wait_for_snapshot(&harness.handle, "running", |s| s.render_state == RenderState::Running).await;
    wait_until("lab start", || harness.lab.launches().len() == 1).await;
}

#[tokio::test]
async fn test_added_connection_is_persisted_on_selection() {
    let store = saved_record(json!([
        { "id": 1, "name": "Local", "type": "local" },
        { "id": 3, "name": "Cluster", "type": "remote", "url": "https://a/", "token": "t" },
    ]));
    let harness = spawn_controller(picker_options(), Arc::new(store.clone()), RecordingLab::default());

    wait_for_snapshot(&harness.handle, "restore", |s| s.connections.len() == 2).await;
    harness
        .handle
        .add_connection(ServerDescriptor::remote("Workstation", "http://ws:8888/", "xyz"));
    let snapshot = wait_for_snapshot(&harness.handle, "added", |s| s.connections.len() == 3).await;

    let added = snapshot.connections.servers.last().unwrap().clone();
    assert_eq!(added.id, 4);
    assert_eq!(harness.ui.last_connections().unwrap().len(), 3);

    harness.handle.select_server(added.id);
    harness.handle.teardown().await;

    let record = store.get(STATE_NAMESPACE, SERVER_STATE_ID).unwrap();
    let ids: Vec<u64> = record["servers"]
        .as_array()
        .unwrap()
        .iter()
        .map(|server| server["id"].as_u64().unwrap())
        .collect();
    assert_eq!(ids, vec![1, 3, 4]);
}

#[tokio::test]
async fn test_selection_is_persisted_to_json_file() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(JsonFileStateStore::new(temp.path()));
    let harness = spawn_controller(picker_options(), store.clone(), RecordingLab::default());

    // Selected before the saved state loads; the save waits for the load
    harness.handle.select_server(LOCAL_SERVER_ID);
    let path = store.record_path(STATE_NAMESPACE, SERVER_STATE_ID);
    wait_until("record written", || path.exists()).await;
    harness.handle.teardown().await;

    let content = std::fs::read_to_string(&path).unwrap();
    let record: Value = serde_json::from_str(&content).unwrap();
    assert_eq!(record["servers"][0]["id"], json!(1));
    assert_eq!(record["servers"][0]["type"], json!("local"));
}

// ==================== MALFORMED INPUT ====================

#[tokio::test]
async fn test_malformed_ipc_is_ignored() {
    let harness = spawn_controller(
        ShellOptions::default(),
        Arc::new(MemoryStateStore::new()),
        RecordingLab::default(),
    );

    harness.handle.deliver("server-started", json!({ "url": "http://x/" }));
    harness.handle.deliver("server-started", json!("started"));
    harness.handle.deliver("send-platform", json!(42));
    harness.handle.deliver("stop-server", json!({}));
    harness.handle.deliver("no-such-channel", Value::Null);

    let snapshot = harness.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.render_state, RenderState::Splash);
    assert!(snapshot.active_server.is_none());
    assert!(snapshot.platform.is_none());
    assert!(harness.lab.launches().is_empty());
    // Lenient mode keeps the UI quiet
    assert!(harness.ui.errors().is_empty());
}

#[tokio::test]
async fn test_strict_validation_reports_malformed_ipc() {
    let options = ShellOptions {
        strict_validation: true,
        ..Default::default()
    };
    let harness = spawn_controller(options, Arc::new(MemoryStateStore::new()), RecordingLab::default());

    harness.handle.deliver("no-such-channel", Value::Null);
    harness.handle.snapshot().await.unwrap();

    let errors = harness.ui.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("no-such-channel"));
}

#[tokio::test]
async fn test_corrupt_saved_state_falls_back_to_seed() {
    let store = MemoryStateStore::new();
    store.insert(STATE_NAMESPACE, SERVER_STATE_ID, json!("garbage"));
    let options = ShellOptions {
        state: StartupMode::Picker,
        strict_validation: true,
        ..Default::default()
    };
    let harness = spawn_controller(options, Arc::new(store), RecordingLab::default());

    wait_until("load issue", || !harness.ui.errors().is_empty()).await;
    let snapshot = harness.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.connections, ConnectionSet::seeded());
    assert_eq!(snapshot.render_state, RenderState::Picker);
}

#[tokio::test]
async fn test_lab_start_failure_still_reaches_running() {
    let harness = spawn_controller(
        ShellOptions::default(),
        Arc::new(MemoryStateStore::new()),
        RecordingLab::failing(),
    );

    harness.handle.deliver("server-started", started_payload());
    wait_until("lab start attempt", || harness.lab.launches().len() == 1).await;

    let snapshot = harness.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.render_state, RenderState::Running);
}

#[tokio::test]
async fn test_saved_max_id_is_dropped_and_reported() {
    let store = saved_record(json!([
        { "id": 1, "name": "Local", "type": "local" },
        { "id": 2, "name": "Lab", "type": "remote", "url": "https://a/", "token": "t" },
        { "id": u64::MAX, "name": "Huge", "type": "remote", "url": "https://b/", "token": "t" },
    ]));
    let options = ShellOptions {
        state: StartupMode::Picker,
        strict_validation: true,
        ..Default::default()
    };
    let harness = spawn_controller(options, Arc::new(store), RecordingLab::default());

    wait_until("dropped entry report", || !harness.ui.errors().is_empty()).await;
    assert!(harness.ui.errors()[0].contains("Huge"));

    harness
        .handle
        .add_connection(ServerDescriptor::remote("Workstation", "http://ws/", "xyz"));
    let snapshot = wait_for_snapshot(&harness.handle, "added", |s| s.connections.len() == 3).await;
    let ids: Vec<u64> = snapshot.connections.servers.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert!(!harness.task.is_finished());
}
