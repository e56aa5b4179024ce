use tracing::{debug, info};

use crate::app::ProtocolEvents;
use crate::peripherals::{AudioPacket, IncomingMessage, Protocol, ProtocolEvent};
use crate::state::{AbortReason, ListeningMode};

/// Protocol with no server behind it.
///
/// Channel open and close are reported back like a real transport would,
/// and a wake word is echoed back as the transcript.
pub struct LoopbackProtocol {
    events: ProtocolEvents,
    opened: bool,
    sent_bytes: usize,
}

impl LoopbackProtocol {
    pub fn new(events: ProtocolEvents) -> Self {
        Self {
            events,
            opened: false,
            sent_bytes: 0,
        }
    }

    pub fn sent_bytes(&self) -> usize {
        self.sent_bytes
    }
}

impl Protocol for LoopbackProtocol {
    fn start(&mut self) -> bool {
        self.events.post(ProtocolEvent::Connected);
        true
    }

    fn open_audio_channel(&mut self) -> bool {
        self.opened = true;
        info!("loopback audio channel opened");
        self.events.post(ProtocolEvent::AudioChannelOpened);
        true
    }

    fn close_audio_channel(&mut self) {
        if !self.opened {
            return;
        }
        self.opened = false;
        info!("loopback audio channel closed");
        self.events.post(ProtocolEvent::AudioChannelClosed);
    }

    fn is_audio_channel_opened(&self) -> bool {
        self.opened
    }

    fn send_audio(&mut self, packet: AudioPacket) -> bool {
        if !self.opened {
            return false;
        }
        self.sent_bytes += packet.payload.len();
        true
    }

    fn send_start_listening(&mut self, mode: ListeningMode) {
        debug!(%mode, "start listening");
    }

    fn send_stop_listening(&mut self) {
        debug!("stop listening");
    }

    fn send_abort_speaking(&mut self, reason: AbortReason) {
        debug!(?reason, "abort speaking");
    }

    fn send_wake_word_detected(&mut self, wake_word: &str) {
        self.events.post(ProtocolEvent::Message(IncomingMessage::Stt {
            text: wake_word.to_string(),
        }));
    }
}
