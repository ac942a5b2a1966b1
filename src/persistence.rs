//! Persistence bridge for the connection registry
//!
//! The store is an external namespaced key/value service. The bridge loads
//! the saved registry once and writes it back fire-and-forget. Saves are
//! applied in submission order by a single writer task.

use crate::types::{ConnectionSet, ServerDescriptor};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};

/// Namespace under which application state is saved
pub const STATE_NAMESPACE: &str = "JupyterApplication-state";

/// Record id of the saved connection list
pub const SERVER_STATE_ID: &str = "servers";

// ============================================================================
// STORE
// ============================================================================

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn fetch(&self, namespace: &str, id: &str) -> Result<Option<Value>, String>;
    async fn save(&self, namespace: &str, id: &str, value: Value) -> Result<(), String>;
}

/// JSON file per record: `<root>/<namespace>/<id>.json`
pub struct JsonFileStateStore {
    root: PathBuf,
}

impl JsonFileStateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn record_path(&self, namespace: &str, id: &str) -> PathBuf {
        self.root.join(namespace).join(format!("{}.json", id))
    }
}

#[async_trait]
impl StateStore for JsonFileStateStore {
    async fn fetch(&self, namespace: &str, id: &str) -> Result<Option<Value>, String> {
        let path = self.record_path(namespace, id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(format!("Failed to read {:?}: {}", path, e)),
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| format!("Failed to parse {:?}: {}", path, e))
    }

    async fn save(&self, namespace: &str, id: &str, value: Value) -> Result<(), String> {
        let path = self.record_path(namespace, id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| format!("Failed to create state directory: {}", e))?;
        }

        let content = serde_json::to_string_pretty(&value)
            .map_err(|e| format!("Failed to serialize record: {}", e))?;
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| format!("Failed to write {:?}: {}", path, e))
    }
}

/// Process-local store, used for embedding and tests
#[derive(Default, Clone)]
pub struct MemoryStateStore {
    records: Arc<Mutex<HashMap<(String, String), Value>>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, namespace: &str, id: &str) -> Option<Value> {
        self.records
            .lock()
            .ok()?
            .get(&(namespace.to_string(), id.to_string()))
            .cloned()
    }

    pub fn insert(&self, namespace: &str, id: &str, value: Value) {
        if let Ok(mut records) = self.records.lock() {
            records.insert((namespace.to_string(), id.to_string()), value);
        }
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn fetch(&self, namespace: &str, id: &str) -> Result<Option<Value>, String> {
        Ok(self.get(namespace, id))
    }

    async fn save(&self, namespace: &str, id: &str, value: Value) -> Result<(), String> {
        self.insert(namespace, id, value);
        Ok(())
    }
}

// ============================================================================
// RECORD DECODING
// ============================================================================

/// Result of loading the saved registry
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LoadOutcome {
    /// `None` when nothing usable was saved
    pub connections: Option<ConnectionSet>,
    /// Problems found while loading (already logged)
    pub issues: Vec<String>,
}

/// Decode a saved record, dropping descriptors that fail to parse
pub fn decode_connections(value: Value) -> LoadOutcome {
    let mut outcome = LoadOutcome::default();

    let servers = match value {
        Value::Object(mut record) => match record.remove("servers") {
            Some(Value::Array(servers)) => servers,
            Some(_) => {
                outcome.issues.push("Saved record field 'servers' is not a list".to_string());
                return outcome;
            }
            None => {
                outcome.issues.push("Saved record has no 'servers' field".to_string());
                return outcome;
            }
        },
        _ => {
            outcome.issues.push("Saved record is not an object".to_string());
            return outcome;
        }
    };

    let mut decoded = Vec::with_capacity(servers.len());
    for (index, raw) in servers.into_iter().enumerate() {
        match serde_json::from_value::<ServerDescriptor>(raw) {
            Ok(server) => decoded.push(server),
            Err(e) => outcome
                .issues
                .push(format!("Dropped malformed saved connection #{}: {}", index, e)),
        }
    }

    outcome.connections = Some(ConnectionSet { servers: decoded });
    outcome
}

// ============================================================================
// BRIDGE
// ============================================================================

enum WriteRequest {
    Save(ConnectionSet),
    Flush(oneshot::Sender<()>),
}

/// Pass-through between the controller and the store. Holds no copy of the set.
#[derive(Clone)]
pub struct PersistenceBridge {
    store: Arc<dyn StateStore>,
    writer: mpsc::UnboundedSender<WriteRequest>,
}

impl PersistenceBridge {
    /// Create the bridge and spawn its writer task. Must run inside a tokio runtime.
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        let (writer, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(store.clone(), rx));
        Self { store, writer }
    }

    /// Load the saved registry. Failures are logged and read as "no saved state".
    pub async fn load(&self) -> LoadOutcome {
        let record = match self.store.fetch(STATE_NAMESPACE, SERVER_STATE_ID).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!("[Persistence] No saved connections");
                return LoadOutcome::default();
            }
            Err(e) => {
                warn!("[Persistence] Failed to load saved connections: {}", e);
                return LoadOutcome {
                    connections: None,
                    issues: vec![e],
                };
            }
        };

        let outcome = decode_connections(record);
        for issue in &outcome.issues {
            warn!("[Persistence] {}", issue);
        }
        if let Some(set) = &outcome.connections {
            info!("[Persistence] Loaded {} saved connection(s)", set.len());
        }
        outcome
    }

    /// Queue a save. Nothing is awaited and failures are only logged.
    pub fn save(&self, set: ConnectionSet) {
        if self.writer.send(WriteRequest::Save(set)).is_err() {
            warn!("[Persistence] Writer stopped, dropping save");
        }
    }

    /// Wait until every save queued so far has reached the store
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.writer.send(WriteRequest::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }
}

async fn run_writer(store: Arc<dyn StateStore>, mut rx: mpsc::UnboundedReceiver<WriteRequest>) {
    while let Some(request) = rx.recv().await {
        match request {
            WriteRequest::Save(set) => {
                let value = match serde_json::to_value(&set) {
                    Ok(value) => value,
                    Err(e) => {
                        warn!("[Persistence] Failed to serialize connections: {}", e);
                        continue;
                    }
                };
                match store.save(STATE_NAMESPACE, SERVER_STATE_ID, value).await {
                    Ok(()) => debug!("[Persistence] Saved {} connection(s)", set.len()),
                    Err(e) => warn!("[Persistence] Failed to save connections: {}", e),
                }
            }
            WriteRequest::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
