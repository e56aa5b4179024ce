//! Protocol callbacks and incoming structured messages

use tracing::{debug, info, warn};

use super::{lang, Alert, Application};
use crate::peripherals::{IncomingMessage, ProtocolEvent, Sound, TtsState};
use crate::state::{DeviceState, ListeningMode};

impl Application {
    pub fn handle_protocol_event(&mut self, event: ProtocolEvent) {
        match event {
            ProtocolEvent::Connected => {
                debug!("protocol connected");
                self.dismiss_alert();
            }
            ProtocolEvent::NetworkError(message) => {
                // normally routed through the NetworkError signal
                *self.last_error.lock() = message;
                self.report_network_error();
            }
            ProtocolEvent::IncomingAudio(packet) => {
                if self.state() == DeviceState::Speaking {
                    self.audio.push_decode_packet(packet);
                }
            }
            ProtocolEvent::AudioChannelOpened => {
                self.board.set_power_save_mode(false);
            }
            ProtocolEvent::AudioChannelClosed => self.on_audio_channel_closed(),
            ProtocolEvent::Message(message) => self.handle_message(message),
        }
    }

    pub fn handle_message(&mut self, message: IncomingMessage) {
        match message {
            IncomingMessage::Tts { state, text } => self.handle_tts(state, text),
            IncomingMessage::Stt { text } => {
                if text.is_empty() {
                    return;
                }
                info!(text = %text, ">>");
                self.display.set_chat_message("user", &text);
            }
            IncomingMessage::Llm { emotion } => {
                if let Some(emotion) = emotion {
                    self.apply_emotion(&emotion);
                }
            }
            IncomingMessage::System { command } => {
                info!(command = %command, "system command");
                if command == "reboot" {
                    self.dispatcher.schedule(|app: &mut Application| {
                        app.reboot();
                    });
                } else {
                    warn!(command = %command, "unknown system command");
                }
            }
            IncomingMessage::Alert {
                status,
                message,
                emotion,
            } => {
                self.alert(Alert::new(status, message, emotion).with_sound(Sound::Vibration));
            }
            IncomingMessage::Custom { payload } => {
                info!(payload = %payload, "custom message");
                self.display.set_chat_message("system", &payload.to_string());
            }
        }
    }

    fn handle_tts(&mut self, state: TtsState, text: Option<String>) {
        match state {
            TtsState::Start => {
                self.aborted = false;
                if matches!(self.state(), DeviceState::Idle | DeviceState::Listening) {
                    self.set_device_state(DeviceState::Speaking);
                }
            }
            TtsState::Stop => {
                if self.state() != DeviceState::Speaking {
                    return;
                }
                self.display.set_chat_message("system", "");
                if self.listening_mode() == ListeningMode::ManualStop {
                    self.set_device_state(DeviceState::Idle);
                } else {
                    self.set_device_state(DeviceState::Listening);
                }
            }
            TtsState::SentenceStart => {
                if let Some(text) = text {
                    info!(text = %text, "<<");
                    self.display.set_chat_message("assistant", &text);
                }
            }
            TtsState::SentenceEnd => {}
        }
    }

    pub(crate) fn report_network_error(&mut self) {
        self.set_device_state(DeviceState::Idle);
        let message = self.last_error.lock().clone();
        self.alert(Alert::new(lang::ERROR, message, "circle_xmark").with_sound(Sound::Exclamation));
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::Harness;
    use super::*;
    use crate::peripherals::{AudioPacket, Board};

    fn tts(state: TtsState) -> IncomingMessage {
        IncomingMessage::Tts { state, text: None }
    }

    #[tokio::test]
    async fn test_tts_start_enters_speaking_from_listening() {
        let mut h = Harness::with_protocol();
        h.app.toggle_chat_state().unwrap();
        h.app.abort_speaking(crate::state::AbortReason::None);

        h.app.handle_message(tts(TtsState::Start));

        assert_eq!(h.app.state(), DeviceState::Speaking);
        assert!(!h.app.is_aborted());
    }

    #[tokio::test]
    async fn test_tts_stop_returns_to_listening_in_auto_stop() {
        let mut h = Harness::with_protocol();
        h.app.toggle_chat_state().unwrap();
        h.app.handle_message(tts(TtsState::Start));

        h.app.handle_message(tts(TtsState::Stop));

        assert_eq!(h.app.state(), DeviceState::Listening);
    }

    #[tokio::test]
    async fn test_tts_stop_goes_idle_in_manual_stop() {
        let mut h = Harness::with_protocol();
        h.app.start_listening().unwrap();
        h.app.handle_message(tts(TtsState::Start));

        h.app.handle_message(tts(TtsState::Stop));

        assert_eq!(h.app.state(), DeviceState::Idle);
    }

    #[tokio::test]
    async fn test_tts_stop_outside_speaking_is_ignored() {
        let mut h = Harness::with_protocol();
        h.app.handle_message(tts(TtsState::Stop));
        assert_eq!(h.app.state(), DeviceState::Idle);
    }

    #[tokio::test]
    async fn test_sentence_and_transcript_reach_display() {
        let mut h = Harness::with_protocol();
        h.app.handle_message(IncomingMessage::Stt { text: String::new() });
        h.app.handle_message(IncomingMessage::Stt { text: "hi".into() });
        h.app.handle_message(IncomingMessage::Tts {
            state: TtsState::SentenceStart,
            text: Some("hello there".into()),
        });

        let chats = h.display.inner.lock().chats.clone();
        assert_eq!(
            chats,
            vec![
                ("user".to_string(), "hi".to_string()),
                ("assistant".to_string(), "hello there".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_llm_emotion_respects_lock() {
        let mut h = Harness::with_protocol();
        h.app.handle_message(IncomingMessage::Llm {
            emotion: Some("happy".into()),
        });
        assert_eq!(h.display.last_emotion().as_deref(), Some("happy"));

        h.app.lock_emotion("winking", std::time::Duration::from_secs(30));
        h.app.handle_message(IncomingMessage::Llm {
            emotion: Some("sad".into()),
        });
        assert_eq!(h.display.last_emotion().as_deref(), Some("winking"));
    }

    #[tokio::test]
    async fn test_server_alert_vibrates() {
        let mut h = Harness::with_protocol();
        h.app.handle_message(IncomingMessage::Alert {
            status: "Warning".into(),
            message: "quota".into(),
            emotion: "sad".into(),
        });

        assert_eq!(h.audio.lock().sounds.last(), Some(&Sound::Vibration));
        assert_eq!(h.alerts(), vec!["quota".to_string()]);
    }

    #[tokio::test]
    async fn test_custom_payload_shown_as_system_line() {
        let mut h = Harness::with_protocol();
        h.app.handle_message(IncomingMessage::Custom {
            payload: serde_json::json!({"action": "wave"}),
        });

        assert_eq!(
            h.display.last_chat(),
            Some(("system".to_string(), r#"{"action":"wave"}"#.to_string()))
        );
    }

    #[tokio::test]
    async fn test_incoming_audio_decoded_only_while_speaking() {
        let mut h = Harness::with_protocol();
        h.app
            .handle_protocol_event(ProtocolEvent::IncomingAudio(AudioPacket::default()));
        assert_eq!(h.audio.lock().decoded, 0);

        h.app.toggle_chat_state().unwrap();
        h.app.handle_message(tts(TtsState::Start));
        h.app
            .handle_protocol_event(ProtocolEvent::IncomingAudio(AudioPacket::default()));
        assert_eq!(h.audio.lock().decoded, 1);
    }

    #[tokio::test]
    async fn test_channel_opened_leaves_power_save() {
        let mut h = Harness::with_protocol();
        h.board.set_power_save_mode(true);

        h.app.handle_protocol_event(ProtocolEvent::AudioChannelOpened);

        assert!(!h.board.power_save());
    }
}
