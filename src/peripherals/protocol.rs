//! Network protocol interface and the events it reports

use serde::{Deserialize, Serialize};

use super::audio::AudioPacket;
use crate::state::{AbortReason, ListeningMode};

/// Transport to the conversation server
pub trait Protocol: Send {
    /// Connect the control channel; returns false if it could not start
    fn start(&mut self) -> bool;

    fn open_audio_channel(&mut self) -> bool;
    fn close_audio_channel(&mut self);
    fn is_audio_channel_opened(&self) -> bool;

    /// Returns false when the transport cannot take more audio right now
    fn send_audio(&mut self, packet: AudioPacket) -> bool;

    fn send_start_listening(&mut self, mode: ListeningMode);
    fn send_stop_listening(&mut self);
    fn send_abort_speaking(&mut self, reason: AbortReason);
    fn send_wake_word_detected(&mut self, wake_word: &str);
}

/// Callbacks from the protocol layer into the core
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolEvent {
    Connected,
    NetworkError(String),
    IncomingAudio(AudioPacket),
    AudioChannelOpened,
    AudioChannelClosed,
    Message(IncomingMessage),
}

/// Type-tagged structured message from the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IncomingMessage {
    Tts {
        state: TtsState,
        #[serde(default)]
        text: Option<String>,
    },
    Stt {
        text: String,
    },
    Llm {
        #[serde(default)]
        emotion: Option<String>,
    },
    System {
        command: String,
    },
    Alert {
        status: String,
        message: String,
        emotion: String,
    },
    Custom {
        payload: serde_json::Value,
    },
}

impl IncomingMessage {
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TtsState {
    Start,
    Stop,
    SentenceStart,
    SentenceEnd,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tts_sentence() {
        let msg = IncomingMessage::parse(
            r#"{"type":"tts","state":"sentence_start","text":"hello"}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            IncomingMessage::Tts {
                state: TtsState::SentenceStart,
                text: Some("hello".into()),
            }
        );
    }

    #[test]
    fn test_parse_tts_without_text() {
        let msg = IncomingMessage::parse(r#"{"type":"tts","state":"sentence_end"}"#).unwrap();
        assert!(matches!(
            msg,
            IncomingMessage::Tts {
                state: TtsState::SentenceEnd,
                text: None
            }
        ));
    }

    #[test]
    fn test_parse_unknown_type_fails() {
        assert!(IncomingMessage::parse(r#"{"type":"hello"}"#).is_err());
    }

    #[test]
    fn test_parse_custom_payload() {
        let msg =
            IncomingMessage::parse(r#"{"type":"custom","payload":{"action":"wave"}}"#).unwrap();
        match msg {
            IncomingMessage::Custom { payload } => assert_eq!(payload["action"], "wave"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
