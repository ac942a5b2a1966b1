//! Shared data types for the LabDesk shell controller
//!
//! This module contains the serializable types exchanged with the
//! persistence store, the background process and the UI surface:
//! - Server descriptors and the ordered connection set
//! - Render and window states
//! - Startup mode

use serde::{Deserialize, Serialize};

// ============================================================================
// SERVER TYPES
// ============================================================================

/// Registry-scoped server identifier. `0` means "not yet assigned".
pub type ServerId = u64;

/// Id reserved for the implicit local connection seeded at construction.
pub const LOCAL_SERVER_ID: ServerId = 1;

/// Display name of the implicit local connection.
pub const LOCAL_SERVER_NAME: &str = "Local";

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServerType {
    #[default]
    Local,
    Remote,
}

/// One reachable application server
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ServerDescriptor {
    #[serde(default)]
    pub id: ServerId,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub server_type: ServerType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl ServerDescriptor {
    /// The implicit local entry every connection set starts with
    pub fn implicit_local(id: ServerId) -> Self {
        Self {
            id,
            name: LOCAL_SERVER_NAME.to_string(),
            server_type: ServerType::Local,
            url: None,
            token: None,
        }
    }

    pub fn remote(name: impl Into<String>, url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            server_type: ServerType::Remote,
            url: Some(url.into()),
            token: Some(token.into()),
        }
    }

    pub fn has_id(&self) -> bool {
        self.id != 0
    }

    pub fn is_local(&self) -> bool {
        self.server_type == ServerType::Local
    }

    /// A descriptor is resolved once both url and token are known
    pub fn is_resolved(&self) -> bool {
        self.url.as_deref().is_some_and(|url| !url.is_empty()) && self.token.is_some()
    }
}

/// Ordered set of known connections; insertion order is display order
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct ConnectionSet {
    #[serde(default)]
    pub servers: Vec<ServerDescriptor>,
}

impl ConnectionSet {
    pub fn seeded() -> Self {
        Self {
            servers: vec![ServerDescriptor::implicit_local(LOCAL_SERVER_ID)],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn max_id(&self) -> Option<ServerId> {
        self.servers.iter().map(|server| server.id).max()
    }
}

// ============================================================================
// UI & WINDOW STATE
// ============================================================================

/// Which top-level UI surface is displayed
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RenderState {
    Picker,
    Splash,
    Running,
}

/// Connection mode reported to the background process
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum WindowState {
    Local,
    Remote {
        #[serde(rename = "serverId")]
        server_id: ServerId,
    },
}

/// Startup mode flag, read once when the controller is built.
/// `"local"` starts the implicit local server, anything else shows the picker.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(from = "String", into = "String")]
pub enum StartupMode {
    #[default]
    Local,
    Picker,
}

impl From<String> for StartupMode {
    fn from(value: String) -> Self {
        if value == "local" {
            StartupMode::Local
        } else {
            StartupMode::Picker
        }
    }
}

impl From<StartupMode> for String {
    fn from(mode: StartupMode) -> Self {
        match mode {
            StartupMode::Local => "local".to_string(),
            StartupMode::Picker => "picker".to_string(),
        }
    }
}

/// Point-in-time view of the controller for the UI
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ControllerSnapshot {
    pub render_state: RenderState,
    pub connections: ConnectionSet,
    pub active_server: Option<ServerDescriptor>,
    pub platform: Option<String>,
}

// ============================================================================
// TESTS
// ============================================================================
