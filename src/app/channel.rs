//! Audio channel handshake and conversation entry points

use thiserror::Error;
use tracing::{error, info, warn};

use super::Application;
use crate::peripherals::{Protocol, Sound};
use crate::state::{AbortReason, DeviceState, ListeningMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("protocol is not initialized")]
    ProtocolNotReady,
    #[error("failed to open audio channel")]
    OpenFailed,
}

impl Application {
    pub fn toggle_chat_state(&mut self) -> Result<(), ChannelError> {
        match self.state() {
            DeviceState::Activating => {
                self.set_device_state(DeviceState::Idle);
                return Ok(());
            }
            DeviceState::Configuring => {
                self.audio.enable_audio_testing(true);
                self.set_device_state(DeviceState::AudioTesting);
                return Ok(());
            }
            DeviceState::AudioTesting => {
                self.audio.enable_audio_testing(false);
                self.set_device_state(DeviceState::Configuring);
                return Ok(());
            }
            _ => {}
        }

        self.require_protocol()?;

        match self.state() {
            DeviceState::Idle => {
                self.open_audio_channel()?;
                self.set_listening_mode(self.aec_mode.listening_mode());
            }
            DeviceState::Speaking => self.abort_speaking(AbortReason::None),
            DeviceState::Listening => self.close_audio_channel(),
            _ => {}
        }
        Ok(())
    }

    /// Push-to-talk press
    pub fn start_listening(&mut self) -> Result<(), ChannelError> {
        match self.state() {
            DeviceState::Activating => {
                self.set_device_state(DeviceState::Idle);
                return Ok(());
            }
            DeviceState::Configuring => {
                self.audio.enable_audio_testing(true);
                self.set_device_state(DeviceState::AudioTesting);
                return Ok(());
            }
            _ => {}
        }

        self.require_protocol()?;

        match self.state() {
            DeviceState::Idle => {
                self.open_audio_channel()?;
                self.set_listening_mode(ListeningMode::ManualStop);
            }
            DeviceState::Speaking => {
                self.abort_speaking(AbortReason::None);
                self.set_listening_mode(ListeningMode::ManualStop);
            }
            _ => {}
        }
        Ok(())
    }

    /// Push-to-talk release
    pub fn stop_listening(&mut self) {
        match self.state() {
            DeviceState::AudioTesting => {
                self.audio.enable_audio_testing(false);
                self.set_device_state(DeviceState::Configuring);
            }
            DeviceState::Listening => {
                if let Some(protocol) = self.protocol.as_mut() {
                    protocol.send_stop_listening();
                }
                self.set_device_state(DeviceState::Idle);
            }
            _ => {}
        }
    }

    /// Trigger a conversation from a recognized phrase rather than audio
    pub fn wake_word_invoke(&mut self, wake_word: &str) -> Result<(), ChannelError> {
        match self.state() {
            DeviceState::Idle => {
                self.toggle_chat_state()?;
                if let Some(protocol) = self.protocol.as_mut() {
                    protocol.send_wake_word_detected(wake_word);
                }
            }
            DeviceState::Speaking => self.abort_speaking(AbortReason::None),
            DeviceState::Listening => self.close_audio_channel(),
            _ => {}
        }
        Ok(())
    }

    /// Open the audio channel unless it is already open.
    ///
    /// The device passes through Connecting; on failure the state from
    /// before the attempt is restored.
    pub(crate) fn open_audio_channel(&mut self) -> Result<(), ChannelError> {
        let previous = self.state();
        let protocol = self.require_protocol()?;
        if protocol.is_audio_channel_opened() {
            return Ok(());
        }

        self.set_device_state(DeviceState::Connecting);
        let opened = self
            .protocol
            .as_mut()
            .is_some_and(|protocol| protocol.open_audio_channel());

        if !opened {
            warn!(restore = %previous, "audio channel failed to open");
            self.set_device_state(previous);
            return Err(ChannelError::OpenFailed);
        }
        info!("audio channel opened");
        Ok(())
    }

    pub(crate) fn close_audio_channel(&mut self) {
        if let Some(protocol) = self.protocol.as_mut() {
            protocol.close_audio_channel();
        }
    }

    /// Record the mode and enter Listening
    pub(crate) fn set_listening_mode(&mut self, mode: ListeningMode) {
        self.machine.set_listening_mode(mode);
        self.set_device_state(DeviceState::Listening);
    }

    pub(crate) fn abort_speaking(&mut self, reason: AbortReason) {
        info!(?reason, "abort speaking");
        self.aborted = true;
        if let Some(protocol) = self.protocol.as_mut() {
            protocol.send_abort_speaking(reason);
        }
    }

    pub(crate) fn handle_wake_word(&mut self) {
        match self.state() {
            DeviceState::Idle => {
                if self.protocol.is_none() {
                    return;
                }
                let wake_word = self.audio.last_wake_word();
                info!(wake_word = %wake_word, "wake word detected");

                self.audio.encode_wake_word();
                if self.open_audio_channel().is_err() {
                    self.audio.enable_wake_word_detection(true);
                    return;
                }

                if self.options.send_wake_word_data {
                    self.stream_wake_word_audio();
                    if let Some(protocol) = self.protocol.as_mut() {
                        protocol.send_wake_word_detected(&wake_word);
                    }
                }

                self.set_listening_mode(self.aec_mode.listening_mode());
                self.audio.play_sound(Sound::Popup);
            }
            DeviceState::Speaking => self.abort_speaking(AbortReason::WakeWordDetected),
            DeviceState::Activating => self.set_device_state(DeviceState::Idle),
            _ => {}
        }
    }

    /// Backpressure: drain until the protocol refuses or the queue is empty
    pub(crate) fn drain_send_queue(&mut self) {
        let Some(protocol) = self.protocol.as_mut() else {
            return;
        };
        while let Some(packet) = self.audio.pop_send_packet() {
            if !protocol.send_audio(packet) {
                break;
            }
        }
    }

    pub(crate) fn on_audio_channel_closed(&mut self) {
        self.board.set_power_save_mode(true);
        self.display.set_chat_message("system", "");
        self.set_device_state(DeviceState::Idle);
    }

    fn stream_wake_word_audio(&mut self) {
        let Some(protocol) = self.protocol.as_mut() else {
            return;
        };
        while let Some(packet) = self.audio.pop_wake_word_packet() {
            if !protocol.send_audio(packet) {
                error!("protocol refused wake word audio");
                break;
            }
        }
    }

    fn require_protocol(&self) -> Result<&dyn Protocol, ChannelError> {
        self.protocol.as_deref().ok_or(ChannelError::ProtocolNotReady)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::Harness;
    use super::*;
    use crate::peripherals::ProtocolEvent;
    use crate::state::AecMode;

    #[tokio::test]
    async fn test_toggle_from_idle_listens_in_auto_stop() {
        let mut h = Harness::with_protocol();
        h.app.toggle_chat_state().unwrap();

        assert_eq!(h.app.state(), DeviceState::Listening);
        assert_eq!(h.app.listening_mode(), ListeningMode::AutoStop);
        assert_eq!(h.protocol.lock().calls, vec!["open", "start_listening:auto"]);
        assert_eq!(
            h.state_changes(),
            vec![
                (DeviceState::Idle, DeviceState::Connecting),
                (DeviceState::Connecting, DeviceState::Listening),
            ]
        );
    }

    #[tokio::test]
    async fn test_toggle_with_aec_listens_in_realtime() {
        let mut h = Harness::with_protocol();
        h.app.set_aec_mode(AecMode::OnDeviceSide);
        h.app.toggle_chat_state().unwrap();

        assert_eq!(h.app.listening_mode(), ListeningMode::Realtime);
        assert!(h
            .protocol
            .lock()
            .calls
            .contains(&"start_listening:realtime".to_string()));
    }

    #[tokio::test]
    async fn test_failed_open_reverts_to_idle() {
        let mut h = Harness::with_protocol();
        h.protocol.lock().open_succeeds = false;

        let result = h.app.toggle_chat_state();

        assert_eq!(result, Err(ChannelError::OpenFailed));
        assert_eq!(h.app.state(), DeviceState::Idle);
        assert_eq!(h.protocol.lock().calls, vec!["open"]);
        assert!(!h
            .state_changes()
            .iter()
            .any(|(_, to)| *to == DeviceState::Listening));
    }

    #[tokio::test]
    async fn test_toggle_without_protocol_is_rejected() {
        let mut h = Harness::new();
        h.app.set_device_state(DeviceState::Idle);
        h.drain_events();

        assert_eq!(h.app.toggle_chat_state(), Err(ChannelError::ProtocolNotReady));
        assert_eq!(h.app.start_listening(), Err(ChannelError::ProtocolNotReady));
        assert_eq!(h.app.state(), DeviceState::Idle);
        assert!(h.drain_events().is_empty());
    }

    #[tokio::test]
    async fn test_toggle_while_speaking_aborts_without_reason() {
        let mut h = Harness::with_protocol();
        h.app.toggle_chat_state().unwrap();
        h.app.set_device_state(DeviceState::Speaking);

        h.app.toggle_chat_state().unwrap();

        assert!(h.app.is_aborted());
        assert_eq!(h.protocol.lock().calls.last().map(String::as_str), Some("abort:none"));
    }

    #[tokio::test]
    async fn test_toggle_while_listening_closes_channel() {
        let mut h = Harness::with_protocol();
        h.app.toggle_chat_state().unwrap();

        h.app.toggle_chat_state().unwrap();

        assert!(!h.protocol.lock().opened);
        assert_eq!(h.protocol.lock().calls.last().map(String::as_str), Some("close"));
    }

    #[tokio::test]
    async fn test_toggle_from_activating_returns_idle() {
        let mut h = Harness::new();
        h.app.set_device_state(DeviceState::Activating);

        h.app.toggle_chat_state().unwrap();
        assert_eq!(h.app.state(), DeviceState::Idle);
    }

    #[tokio::test]
    async fn test_toggle_flips_audio_testing() {
        let mut h = Harness::new();
        h.app.set_device_state(DeviceState::Configuring);

        h.app.toggle_chat_state().unwrap();
        assert_eq!(h.app.state(), DeviceState::AudioTesting);
        assert!(h.audio.lock().audio_testing);

        h.app.stop_listening();
        assert_eq!(h.app.state(), DeviceState::Configuring);
        assert!(!h.audio.lock().audio_testing);
    }

    #[tokio::test]
    async fn test_start_listening_uses_manual_stop() {
        let mut h = Harness::with_protocol();
        h.app.start_listening().unwrap();

        assert_eq!(h.app.state(), DeviceState::Listening);
        assert_eq!(h.app.listening_mode(), ListeningMode::ManualStop);
    }

    #[tokio::test]
    async fn test_start_listening_while_speaking_interrupts() {
        let mut h = Harness::with_protocol();
        h.app.toggle_chat_state().unwrap();
        h.app.set_device_state(DeviceState::Speaking);
        h.protocol.lock().calls.clear();

        h.app.start_listening().unwrap();

        assert_eq!(h.app.state(), DeviceState::Listening);
        assert_eq!(h.app.listening_mode(), ListeningMode::ManualStop);
        assert_eq!(h.protocol.lock().calls[0], "abort:none");
    }

    #[tokio::test]
    async fn test_stop_listening_notifies_and_goes_idle() {
        let mut h = Harness::with_protocol();
        h.app.start_listening().unwrap();

        h.app.stop_listening();

        assert_eq!(h.app.state(), DeviceState::Idle);
        assert_eq!(
            h.protocol.lock().calls.last().map(String::as_str),
            Some("stop_listening")
        );
    }

    #[tokio::test]
    async fn test_already_open_channel_skips_connecting() {
        let mut h = Harness::with_protocol();
        h.protocol.lock().opened = true;

        h.app.toggle_chat_state().unwrap();

        assert_eq!(
            h.state_changes(),
            vec![(DeviceState::Idle, DeviceState::Listening)]
        );
        assert!(!h.protocol.lock().calls.contains(&"open".to_string()));
    }

    #[tokio::test]
    async fn test_send_audio_drains_until_refused() {
        let mut h = Harness::with_protocol();
        h.audio.lock().queue_send_packets(5);
        h.protocol.lock().accept_audio = 3;

        h.app.drain_send_queue();

        // the refused packet is consumed, the rest wait for the next signal
        assert_eq!(h.protocol.lock().sent_audio, 3);
        assert_eq!(h.audio.lock().send_queue.len(), 1);
    }

    #[tokio::test]
    async fn test_send_audio_drains_empty_queue() {
        let mut h = Harness::with_protocol();
        h.audio.lock().queue_send_packets(4);

        h.app.drain_send_queue();

        assert_eq!(h.protocol.lock().sent_audio, 4);
        assert!(h.audio.lock().send_queue.is_empty());
    }

    #[tokio::test]
    async fn test_wake_word_in_idle_opens_and_streams() {
        let mut h = Harness::with_protocol();
        h.audio.lock().last_wake_word = "hey bot".into();
        h.audio.lock().queue_wake_word_packets(2);

        h.app.handle_wake_word();

        assert_eq!(h.app.state(), DeviceState::Listening);
        assert_eq!(h.protocol.lock().sent_audio, 2);
        assert!(h
            .protocol
            .lock()
            .calls
            .contains(&"wake_word:hey bot".to_string()));
        assert!(h.audio.lock().wake_word_encoded);
        assert_eq!(h.audio.lock().sounds.last(), Some(&Sound::Popup));
    }

    #[tokio::test]
    async fn test_wake_word_open_failure_rearms_detection() {
        let mut h = Harness::with_protocol();
        h.protocol.lock().open_succeeds = false;
        h.audio.lock().wake_word = false;

        h.app.handle_wake_word();

        assert_eq!(h.app.state(), DeviceState::Idle);
        assert!(h.audio.lock().wake_word);
    }

    #[tokio::test]
    async fn test_wake_word_while_speaking_aborts_with_reason() {
        let mut h = Harness::with_protocol();
        h.app.toggle_chat_state().unwrap();
        h.app.set_device_state(DeviceState::Speaking);

        h.app.handle_wake_word();

        let calls = h.protocol.lock().calls.clone();
        assert_eq!(calls.last().map(String::as_str), Some("abort:wake_word_detected"));
        assert!(!calls.contains(&"abort:none".to_string()));
    }

    #[tokio::test]
    async fn test_wake_word_invoke_sends_text() {
        let mut h = Harness::with_protocol();

        h.app.wake_word_invoke("hello").unwrap();

        assert_eq!(h.app.state(), DeviceState::Listening);
        assert_eq!(
            h.protocol.lock().calls.last().map(String::as_str),
            Some("wake_word:hello")
        );
    }

    #[tokio::test]
    async fn test_channel_closed_always_returns_idle() {
        for state in [DeviceState::Listening, DeviceState::Speaking, DeviceState::Connecting] {
            let mut h = Harness::with_protocol();
            h.app.set_device_state(state);

            h.app.protocol_events().post(ProtocolEvent::AudioChannelClosed);
            h.poll();

            assert_eq!(h.app.state(), DeviceState::Idle);
            assert!(h.board.power_save());
        }
    }
}
