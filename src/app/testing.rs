//! In-memory collaborators for exercising the core without hardware

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::broadcast;

use super::{AppOptions, Application, Peripherals};
use crate::dispatch::Dispatcher;
use crate::events::StateEvent;
use crate::peripherals::{AudioPacket, AudioService, Board, Display, Protocol, Sound};
use crate::state::{AbortReason, DeviceState, ListeningMode};

#[derive(Debug)]
pub struct ProtocolLog {
    pub calls: Vec<String>,
    pub opened: bool,
    pub open_succeeds: bool,
    /// Packets accepted before `send_audio` starts refusing
    pub accept_audio: usize,
    pub sent_audio: usize,
}

impl Default for ProtocolLog {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            opened: false,
            open_succeeds: true,
            accept_audio: usize::MAX,
            sent_audio: 0,
        }
    }
}

pub struct FakeProtocol(pub Arc<Mutex<ProtocolLog>>);

impl Protocol for FakeProtocol {
    fn start(&mut self) -> bool {
        true
    }

    fn open_audio_channel(&mut self) -> bool {
        let mut log = self.0.lock();
        log.calls.push("open".into());
        log.opened = log.open_succeeds;
        log.open_succeeds
    }

    fn close_audio_channel(&mut self) {
        let mut log = self.0.lock();
        log.calls.push("close".into());
        log.opened = false;
    }

    fn is_audio_channel_opened(&self) -> bool {
        self.0.lock().opened
    }

    fn send_audio(&mut self, _packet: AudioPacket) -> bool {
        let mut log = self.0.lock();
        if log.sent_audio >= log.accept_audio {
            return false;
        }
        log.sent_audio += 1;
        true
    }

    fn send_start_listening(&mut self, mode: ListeningMode) {
        self.0.lock().calls.push(format!("start_listening:{mode}"));
    }

    fn send_stop_listening(&mut self) {
        self.0.lock().calls.push("stop_listening".into());
    }

    fn send_abort_speaking(&mut self, reason: AbortReason) {
        let reason = match reason {
            AbortReason::None => "none",
            AbortReason::WakeWordDetected => "wake_word_detected",
        };
        self.0.lock().calls.push(format!("abort:{reason}"));
    }

    fn send_wake_word_detected(&mut self, wake_word: &str) {
        self.0.lock().calls.push(format!("wake_word:{wake_word}"));
    }
}

#[derive(Debug)]
pub struct AudioLog {
    pub started: bool,
    pub wake_word: bool,
    pub wake_word_enables: usize,
    pub voice_processing: bool,
    pub device_aec: bool,
    pub audio_testing: bool,
    pub wake_word_during_playback: bool,
    pub voice_detected: bool,
    pub idle: bool,
    pub send_queue: VecDeque<AudioPacket>,
    pub wake_word_packets: VecDeque<AudioPacket>,
    pub wake_word_encoded: bool,
    pub last_wake_word: String,
    pub decoded: usize,
    pub decoder_resets: usize,
    pub sounds: Vec<Sound>,
}

impl Default for AudioLog {
    fn default() -> Self {
        Self {
            started: false,
            wake_word: false,
            wake_word_enables: 0,
            voice_processing: false,
            device_aec: false,
            audio_testing: false,
            wake_word_during_playback: false,
            voice_detected: false,
            idle: true,
            send_queue: VecDeque::new(),
            wake_word_packets: VecDeque::new(),
            wake_word_encoded: false,
            last_wake_word: String::new(),
            decoded: 0,
            decoder_resets: 0,
            sounds: Vec::new(),
        }
    }
}

impl AudioLog {
    pub fn queue_send_packets(&mut self, count: usize) {
        self.send_queue
            .extend((0..count).map(|_| AudioPacket::default()));
    }

    pub fn queue_wake_word_packets(&mut self, count: usize) {
        self.wake_word_packets
            .extend((0..count).map(|_| AudioPacket::default()));
    }
}

pub struct FakeAudio(pub Arc<Mutex<AudioLog>>);

impl AudioService for FakeAudio {
    fn start(&mut self) {
        self.0.lock().started = true;
    }

    fn stop(&mut self) {
        self.0.lock().started = false;
    }

    fn enable_wake_word_detection(&mut self, enable: bool) {
        let mut log = self.0.lock();
        log.wake_word = enable;
        if enable {
            log.wake_word_enables += 1;
        }
    }

    fn enable_voice_processing(&mut self, enable: bool) {
        self.0.lock().voice_processing = enable;
    }

    fn enable_device_aec(&mut self, enable: bool) {
        self.0.lock().device_aec = enable;
    }

    fn enable_audio_testing(&mut self, enable: bool) {
        self.0.lock().audio_testing = enable;
    }

    fn is_voice_processing_running(&self) -> bool {
        self.0.lock().voice_processing
    }

    fn is_wake_word_running(&self) -> bool {
        self.0.lock().wake_word
    }

    fn wake_word_during_playback(&self) -> bool {
        self.0.lock().wake_word_during_playback
    }

    fn is_voice_detected(&self) -> bool {
        self.0.lock().voice_detected
    }

    fn is_idle(&self) -> bool {
        self.0.lock().idle
    }

    fn pop_send_packet(&mut self) -> Option<AudioPacket> {
        self.0.lock().send_queue.pop_front()
    }

    fn push_decode_packet(&mut self, _packet: AudioPacket) {
        self.0.lock().decoded += 1;
    }

    fn reset_decoder(&mut self) {
        self.0.lock().decoder_resets += 1;
    }

    fn encode_wake_word(&mut self) {
        self.0.lock().wake_word_encoded = true;
    }

    fn pop_wake_word_packet(&mut self) -> Option<AudioPacket> {
        self.0.lock().wake_word_packets.pop_front()
    }

    fn last_wake_word(&self) -> String {
        self.0.lock().last_wake_word.clone()
    }

    fn play_sound(&mut self, sound: Sound) {
        self.0.lock().sounds.push(sound);
    }
}

#[derive(Debug, Default, Clone)]
pub struct DisplayLog {
    pub statuses: Vec<String>,
    pub emotions: Vec<String>,
    pub chats: Vec<(String, String)>,
    pub notifications: Vec<String>,
    pub status_bar_updates: usize,
}

#[derive(Default)]
pub struct RecordingDisplay {
    pub inner: Mutex<DisplayLog>,
}

impl RecordingDisplay {
    pub fn statuses(&self) -> Vec<String> {
        self.inner.lock().statuses.clone()
    }

    pub fn last_emotion(&self) -> Option<String> {
        self.inner.lock().emotions.last().cloned()
    }

    pub fn last_chat(&self) -> Option<(String, String)> {
        self.inner.lock().chats.last().cloned()
    }

    pub fn clear(&self) {
        *self.inner.lock() = DisplayLog::default();
    }
}

impl Display for RecordingDisplay {
    fn set_status(&self, status: &str) {
        self.inner.lock().statuses.push(status.to_string());
    }

    fn set_emotion(&self, emotion: &str) {
        self.inner.lock().emotions.push(emotion.to_string());
    }

    fn set_chat_message(&self, role: &str, content: &str) {
        self.inner
            .lock()
            .chats
            .push((role.to_string(), content.to_string()));
    }

    fn show_notification(&self, message: &str) {
        self.inner.lock().notifications.push(message.to_string());
    }

    fn update_status_bar(&self, _update_all: bool) {
        self.inner.lock().status_bar_updates += 1;
    }
}

#[derive(Default)]
pub struct FakeBoard {
    power_save: AtomicBool,
    restarted: AtomicBool,
}

impl FakeBoard {
    pub fn power_save(&self) -> bool {
        self.power_save.load(Ordering::SeqCst)
    }

    pub fn restarted(&self) -> bool {
        self.restarted.load(Ordering::SeqCst)
    }
}

impl Board for FakeBoard {
    fn set_power_save_mode(&self, enabled: bool) {
        self.power_save.store(enabled, Ordering::SeqCst);
    }

    fn restart(&self) -> ! {
        self.restarted.store(true, Ordering::SeqCst);
        panic!("board restarted");
    }
}

/// Shared views of the fakes, kept after the app moves to another thread
pub struct Fakes {
    pub audio: Arc<Mutex<AudioLog>>,
    pub protocol: Arc<Mutex<ProtocolLog>>,
    pub display: Arc<RecordingDisplay>,
    pub board: Arc<FakeBoard>,
}

/// An [`Application`] wired to fakes, driven by polling its dispatcher.
/// Must be created inside a tokio runtime.
pub struct Harness {
    pub app: Application,
    pub dispatcher: Dispatcher<Application>,
    pub audio: Arc<Mutex<AudioLog>>,
    pub protocol: Arc<Mutex<ProtocolLog>>,
    pub display: Arc<RecordingDisplay>,
    pub board: Arc<FakeBoard>,
    events: broadcast::Receiver<StateEvent>,
}

impl Harness {
    /// Fresh core in Unknown with no protocol installed
    pub fn new() -> Self {
        let dispatcher = Dispatcher::new();
        let audio = Arc::new(Mutex::new(AudioLog::default()));
        let display = Arc::new(RecordingDisplay::default());
        let board = Arc::new(FakeBoard::default());
        let (event_tx, events) = broadcast::channel(256);

        let peripherals = Peripherals {
            audio: Box::new(FakeAudio(Arc::clone(&audio))),
            display: Arc::clone(&display) as Arc<dyn Display>,
            board: Arc::clone(&board) as Arc<dyn Board>,
        };
        let options = AppOptions {
            reboot_delay: Duration::ZERO,
            ..AppOptions::default()
        };
        let app = Application::new(
            dispatcher.handle(),
            peripherals,
            options,
            event_tx,
            Handle::current(),
        );

        Self {
            app,
            dispatcher,
            audio,
            protocol: Arc::new(Mutex::new(ProtocolLog::default())),
            display,
            board,
            events,
        }
    }

    /// Booted core sitting in Idle with every record cleared
    pub fn with_protocol() -> Self {
        let mut harness = Self::new();
        harness.app.start();
        harness.install_protocol();
        while harness.poll() {}

        harness.display.clear();
        harness.protocol.lock().calls.clear();
        harness.audio.lock().sounds.clear();
        harness.drain_events();
        harness
    }

    pub fn install_protocol(&mut self) {
        let protocol = FakeProtocol(Arc::clone(&self.protocol));
        self.app.finish_boot(Box::new(protocol), "1.0.0");
    }

    pub fn poll(&mut self) -> bool {
        self.dispatcher.poll(&mut self.app)
    }

    pub fn drain_events(&mut self) -> Vec<StateEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    pub fn state_changes(&mut self) -> Vec<(DeviceState, DeviceState)> {
        self.drain_events()
            .into_iter()
            .filter_map(|event| match event {
                StateEvent::StateChanged { previous, current } => Some((previous, current)),
                _ => None,
            })
            .collect()
    }

    pub fn alerts(&mut self) -> Vec<String> {
        self.drain_events()
            .into_iter()
            .filter_map(|event| match event {
                StateEvent::Alert { message, .. } => Some(message),
                _ => None,
            })
            .collect()
    }

    /// Separate the core from its fakes so it can run on a dispatcher thread
    pub fn split(self) -> (Application, Dispatcher<Application>, Fakes) {
        let fakes = Fakes {
            audio: self.audio,
            protocol: self.protocol,
            display: self.display,
            board: self.board,
        };
        (self.app, self.dispatcher, fakes)
    }
}
