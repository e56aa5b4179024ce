//! Events published by the device core
//!
//! Listeners such as an LED indicator, telemetry, or subscribed IPC clients
//! receive these over a broadcast channel.

use serde::{Deserialize, Serialize};

use crate::state::DeviceState;

/// Events emitted by the core as it runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateEvent {
    /// The device state changed
    StateChanged {
        previous: DeviceState,
        current: DeviceState,
    },

    /// Voice activity changed while listening
    VoiceActivity {
        /// Whether the user is currently speaking
        speaking: bool,
    },

    /// A user-visible alert was raised
    Alert {
        status: String,
        message: String,
        emotion: String,
    },
}

impl std::fmt::Display for StateEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateEvent::StateChanged { previous, current } => {
                write!(f, "STATE_CHANGED ({} -> {})", previous, current)
            }
            StateEvent::VoiceActivity { speaking } => {
                write!(f, "VOICE_ACTIVITY (speaking={})", speaking)
            }
            StateEvent::Alert { status, message, .. } => {
                write!(f, "ALERT ({}: {})", status, message)
            }
        }
    }
}
