//! IPC protocol with the background process
//!
//! Channel names form a closed set grouped by origin. Payloads are plain
//! JSON values. Inbound messages are decoded into typed variants; anything
//! that does not decode is rejected so the caller can log and ignore it.

use crate::types::{ServerDescriptor, WindowState};
use serde_json::Value;

// ============================================================================
// CHANNELS
// ============================================================================

/// Server lifecycle channels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerChannel {
    RequestServerStart,
    ServerStarted,
    RequestServerStop,
}

/// Application lifecycle channels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationChannel {
    GetPlatform,
    SendPlatform,
}

/// Window lifecycle channels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowChannel {
    StateUpdate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Server(ServerChannel),
    Application(ApplicationChannel),
    Window(WindowChannel),
}

impl Channel {
    pub const ALL: [Channel; 6] = [
        Channel::Server(ServerChannel::RequestServerStart),
        Channel::Server(ServerChannel::ServerStarted),
        Channel::Server(ServerChannel::RequestServerStop),
        Channel::Application(ApplicationChannel::GetPlatform),
        Channel::Application(ApplicationChannel::SendPlatform),
        Channel::Window(WindowChannel::StateUpdate),
    ];

    /// Channels the background process sends on
    pub const INBOUND: [Channel; 2] = [
        Channel::Server(ServerChannel::ServerStarted),
        Channel::Application(ApplicationChannel::SendPlatform),
    ];

    pub fn name(self) -> &'static str {
        match self {
            Channel::Server(ServerChannel::RequestServerStart) => "start-server",
            Channel::Server(ServerChannel::ServerStarted) => "server-started",
            Channel::Server(ServerChannel::RequestServerStop) => "stop-server",
            Channel::Application(ApplicationChannel::GetPlatform) => "get-platform",
            Channel::Application(ApplicationChannel::SendPlatform) => "send-platform",
            Channel::Window(WindowChannel::StateUpdate) => "window-state-update",
        }
    }

    pub fn from_name(name: &str) -> Option<Channel> {
        Channel::ALL.into_iter().find(|channel| channel.name() == name)
    }

    pub fn is_inbound(self) -> bool {
        Channel::INBOUND.contains(&self)
    }
}

// ============================================================================
// MESSAGES
// ============================================================================

/// Payload of a server start request
#[derive(Debug, Clone, PartialEq)]
pub enum StartRequest {
    /// Implicit local start at launch, sent as the literal `"start"`
    Implicit,
    Descriptor(ServerDescriptor),
}

/// Messages sent to the background process
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    RequestPlatform,
    RequestServerStart(StartRequest),
    RequestServerStop(ServerDescriptor),
    WindowStateUpdate(WindowState),
}

impl OutboundMessage {
    pub fn channel(&self) -> Channel {
        match self {
            OutboundMessage::RequestPlatform => Channel::Application(ApplicationChannel::GetPlatform),
            OutboundMessage::RequestServerStart(_) => {
                Channel::Server(ServerChannel::RequestServerStart)
            }
            OutboundMessage::RequestServerStop(_) => {
                Channel::Server(ServerChannel::RequestServerStop)
            }
            OutboundMessage::WindowStateUpdate(_) => Channel::Window(WindowChannel::StateUpdate),
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            OutboundMessage::RequestPlatform => Value::Null,
            OutboundMessage::RequestServerStart(StartRequest::Implicit) => {
                Value::String("start".to_string())
            }
            OutboundMessage::RequestServerStart(StartRequest::Descriptor(server))
            | OutboundMessage::RequestServerStop(server) => {
                serde_json::to_value(server).unwrap_or(Value::Null)
            }
            OutboundMessage::WindowStateUpdate(state) => {
                serde_json::to_value(state).unwrap_or(Value::Null)
            }
        }
    }
}

/// Messages received from the background process
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Platform(String),
    ServerStarted(ServerDescriptor),
}

impl InboundMessage {
    /// Decode a raw message. Unknown channels, outbound-only channels and
    /// malformed payloads are rejected.
    pub fn decode(channel: &str, payload: Value) -> Result<InboundMessage, String> {
        let known = Channel::from_name(channel)
            .ok_or_else(|| format!("Unknown IPC channel '{}'", channel))?;

        match known {
            Channel::Application(ApplicationChannel::SendPlatform) => match payload {
                Value::String(platform) => Ok(InboundMessage::Platform(platform)),
                other => Err(format!("Platform payload is not a string: {}", other)),
            },
            Channel::Server(ServerChannel::ServerStarted) => {
                let server: ServerDescriptor = serde_json::from_value(payload)
                    .map_err(|e| format!("Failed to decode started server: {}", e))?;
                if !server.is_resolved() {
                    return Err("Started server is missing url or token".to_string());
                }
                Ok(InboundMessage::ServerStarted(server))
            }
            _ => Err(format!("Channel '{}' is not an inbound channel", channel)),
        }
    }
}

/// Outbound side of the channel to the background process
pub trait IpcChannel: Send + Sync {
    fn send(&self, message: &OutboundMessage) -> Result<(), String>;
}

// ============================================================================
// TESTS
// ============================================================================
