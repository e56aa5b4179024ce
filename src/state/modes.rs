//! Listening, abort and echo-cancellation modes

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Governs how and when the device stops listening on its own
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListeningMode {
    /// The server decides when the utterance is over
    #[default]
    AutoStop,
    /// Listening continues until an explicit stop
    ManualStop,
    /// Full duplex; the microphone stays open while speaking
    Realtime,
}

impl std::fmt::Display for ListeningMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListeningMode::AutoStop => write!(f, "auto"),
            ListeningMode::ManualStop => write!(f, "manual"),
            ListeningMode::Realtime => write!(f, "realtime"),
        }
    }
}

/// Why speech output was interrupted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    None,
    WakeWordDetected,
}

/// Where acoustic echo cancellation runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AecMode {
    #[default]
    Off,
    OnDeviceSide,
    OnServerSide,
}

impl AecMode {
    /// Listening mode used when a conversation is started automatically
    pub fn listening_mode(self) -> ListeningMode {
        match self {
            AecMode::Off => ListeningMode::AutoStop,
            AecMode::OnDeviceSide | AecMode::OnServerSide => ListeningMode::Realtime,
        }
    }
}

impl std::fmt::Display for AecMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AecMode::Off => write!(f, "off"),
            AecMode::OnDeviceSide => write!(f, "on_device_side"),
            AecMode::OnServerSide => write!(f, "on_server_side"),
        }
    }
}

impl FromStr for AecMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(AecMode::Off),
            "device" | "on_device_side" => Ok(AecMode::OnDeviceSide),
            "server" | "on_server_side" => Ok(AecMode::OnServerSide),
            other => Err(format!("unknown AEC mode: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aec_selects_listening_mode() {
        assert_eq!(AecMode::Off.listening_mode(), ListeningMode::AutoStop);
        assert_eq!(AecMode::OnDeviceSide.listening_mode(), ListeningMode::Realtime);
        assert_eq!(AecMode::OnServerSide.listening_mode(), ListeningMode::Realtime);
    }

    #[test]
    fn test_aec_mode_parse() {
        assert_eq!("server".parse::<AecMode>().unwrap(), AecMode::OnServerSide);
        assert_eq!("OFF".parse::<AecMode>().unwrap(), AecMode::Off);
        assert!("both".parse::<AecMode>().is_err());
    }
}
