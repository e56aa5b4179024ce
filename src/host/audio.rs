use tracing::debug;

use crate::peripherals::{AudioPacket, AudioService, Sound};

/// Audio pipeline with no capture or playback.
///
/// It keeps the enable flags so the core's view stays consistent, and its
/// queues are always empty.
#[derive(Debug, Default)]
pub struct NullAudio {
    running: bool,
    wake_word: bool,
    voice_processing: bool,
    device_aec: bool,
    audio_testing: bool,
}

impl NullAudio {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioService for NullAudio {
    fn start(&mut self) {
        self.running = true;
        debug!("audio started");
    }

    fn stop(&mut self) {
        self.running = false;
        self.wake_word = false;
        self.voice_processing = false;
        debug!("audio stopped");
    }

    fn enable_wake_word_detection(&mut self, enable: bool) {
        self.wake_word = enable;
    }

    fn enable_voice_processing(&mut self, enable: bool) {
        self.voice_processing = enable;
    }

    fn enable_device_aec(&mut self, enable: bool) {
        self.device_aec = enable;
    }

    fn enable_audio_testing(&mut self, enable: bool) {
        self.audio_testing = enable;
    }

    fn is_voice_processing_running(&self) -> bool {
        self.voice_processing
    }

    fn is_wake_word_running(&self) -> bool {
        self.wake_word
    }

    fn wake_word_during_playback(&self) -> bool {
        self.device_aec
    }

    fn is_voice_detected(&self) -> bool {
        false
    }

    fn is_idle(&self) -> bool {
        true
    }

    fn pop_send_packet(&mut self) -> Option<AudioPacket> {
        None
    }

    fn push_decode_packet(&mut self, packet: AudioPacket) {
        debug!(bytes = packet.payload.len(), "discarding decoded audio");
    }

    fn reset_decoder(&mut self) {}

    fn encode_wake_word(&mut self) {}

    fn pop_wake_word_packet(&mut self) -> Option<AudioPacket> {
        None
    }

    fn last_wake_word(&self) -> String {
        String::new()
    }

    fn play_sound(&mut self, sound: Sound) {
        debug!(%sound, "play sound");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_clears_pipelines() {
        let mut audio = NullAudio::new();
        audio.start();
        audio.enable_voice_processing(true);
        audio.enable_wake_word_detection(true);

        audio.stop();

        assert!(!audio.is_voice_processing_running());
        assert!(!audio.is_wake_word_running());
        assert!(audio.pop_send_packet().is_none());
    }
}
