//! Audio pipeline interface

use std::fmt;
use std::sync::Arc;

use crate::dispatch::{DispatcherHandle, Signal};

/// One encoded audio frame travelling to or from the server
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioPacket {
    pub sample_rate: u32,
    pub frame_duration_ms: u32,
    pub timestamp: u32,
    pub payload: Vec<u8>,
}

/// Sound cues the core asks the audio pipeline to play
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sound {
    Success,
    Exclamation,
    Popup,
    Vibration,
    Activation,
    Upgrade,
    /// Spoken digit, used to read out activation codes
    Digit(u8),
}

impl fmt::Display for Sound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sound::Success => write!(f, "success"),
            Sound::Exclamation => write!(f, "exclamation"),
            Sound::Popup => write!(f, "popup"),
            Sound::Vibration => write!(f, "vibration"),
            Sound::Activation => write!(f, "activation"),
            Sound::Upgrade => write!(f, "upgrade"),
            Sound::Digit(d) => write!(f, "digit_{}", d),
        }
    }
}

/// Voice capture, wake-word detection and playback.
///
/// Wake-word detection and voice processing share the microphone pipeline;
/// the core never enables both at once except during realtime playback.
pub trait AudioService: Send {
    fn start(&mut self);
    fn stop(&mut self);

    fn enable_wake_word_detection(&mut self, enable: bool);
    fn enable_voice_processing(&mut self, enable: bool);
    fn enable_device_aec(&mut self, enable: bool);
    fn enable_audio_testing(&mut self, enable: bool);

    fn is_voice_processing_running(&self) -> bool;
    fn is_wake_word_running(&self) -> bool;
    /// Whether the wake-word detector keeps working while audio plays
    fn wake_word_during_playback(&self) -> bool;
    /// Last voice-activity reading
    fn is_voice_detected(&self) -> bool;
    /// Nothing queued for encoding, decoding or playback
    fn is_idle(&self) -> bool;

    fn pop_send_packet(&mut self) -> Option<AudioPacket>;
    fn push_decode_packet(&mut self, packet: AudioPacket);
    fn reset_decoder(&mut self);

    /// Encode the buffered audio around the last wake word
    fn encode_wake_word(&mut self);
    fn pop_wake_word_packet(&mut self) -> Option<AudioPacket>;
    fn last_wake_word(&self) -> String;

    fn play_sound(&mut self, sound: Sound);
}

/// Signal raiser handed to the audio pipeline's own threads
#[derive(Clone)]
pub struct AudioSignals {
    raise: Arc<dyn Fn(Signal) + Send + Sync>,
}

impl AudioSignals {
    pub fn new(raise: impl Fn(Signal) + Send + Sync + 'static) -> Self {
        Self {
            raise: Arc::new(raise),
        }
    }

    pub fn send_queue_available(&self) {
        (self.raise)(Signal::SendAudio);
    }

    pub fn wake_word_detected(&self) {
        (self.raise)(Signal::WakeWordDetected);
    }

    pub fn voice_activity_changed(&self) {
        (self.raise)(Signal::VoiceActivityChanged);
    }
}

impl<C: 'static> From<DispatcherHandle<C>> for AudioSignals {
    fn from(handle: DispatcherHandle<C>) -> Self {
        Self::new(move |signal| handle.raise(signal))
    }
}

impl fmt::Debug for AudioSignals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioSignals").finish_non_exhaustive()
    }
}
