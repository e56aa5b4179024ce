//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::app::CoreStatus;
use crate::events::StateEvent;
use crate::state::{AecMode, DeviceState, ListeningMode};

/// Largest frame a client may send
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Requests from a client to the daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Ping to check connectivity
    Ping,

    /// Request current device status
    GetStatus,

    /// Same as pressing the chat button
    ToggleChat,

    /// Push-to-talk press
    StartListening,

    /// Push-to-talk release
    StopListening,

    /// Start a conversation as if `text` had been spoken as the wake word
    WakeWord { text: String },

    SetAecMode { mode: AecMode },

    /// Show an expression for a while, then return to neutral
    ShowExpression { emotion: String, duration_secs: u64 },

    Reboot,

    /// Subscribe to state event notifications
    Subscribe,
}

/// Responses from the daemon to a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Current device status
    Status(DaemonStatus),

    /// Pong response to ping
    Pong,

    /// Command accepted
    Ok,

    /// Subscription confirmed
    Subscribed,

    /// Error response
    Error { code: String, message: String },
}

impl Response {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Push notification from the daemon to subscribed clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// State event occurred
    StateEvent { event: StateEvent },
    /// Events were dropped because the client fell behind
    Lagged { skipped: u64 },
}

/// Full daemon status snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Uptime in seconds
    pub uptime_secs: u64,

    pub state: DeviceState,
    pub listening_mode: ListeningMode,
    pub aec_mode: AecMode,
    pub emotion_locked: bool,
}

impl DaemonStatus {
    pub fn new(core: CoreStatus, uptime_secs: u64) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs,
            state: core.state,
            listening_mode: core.listening_mode,
            aec_mode: core.aec_mode,
            emotion_locked: core.emotion_locked,
        }
    }
}
