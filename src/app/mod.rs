//! The device core owned by the dispatcher thread
//!
//! [`Application`] holds the state machine and every collaborator handle.
//! It is only ever touched from the dispatcher; other threads reach it
//! through a [`Controller`], [`ProtocolEvents`] or a [`DispatcherHost`].

mod alert;
mod channel;
mod control;
pub mod lang;
mod messages;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::dispatch::{DispatcherHandle, SignalHandler};
use crate::events::StateEvent;
use crate::oneshot::Deferred;
use crate::peripherals::{AudioService, AudioSignals, Board, Display, Protocol, Sound};
use crate::state::{AecMode, DeviceState, ListeningMode, StateMachine, StateWatch};

pub use alert::Alert;
pub use channel::ChannelError;
pub use control::{ControlError, Controller, CoreStatus, DispatcherHost, ProtocolEvents};

/// Clock ticks between housekeeping log lines
const HOUSEKEEPING_TICKS: u64 = 10;

/// Behavior switches for the core
#[derive(Debug, Clone)]
pub struct AppOptions {
    pub aec_mode: AecMode,
    /// Stream the buffered wake-word audio to the server before listening
    pub send_wake_word_data: bool,
    /// How long the activation code expression stays locked
    pub emotion_lock: Duration,
    /// Pause between releasing audio and restarting
    pub reboot_delay: Duration,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            aec_mode: AecMode::Off,
            send_wake_word_data: true,
            emotion_lock: Duration::from_secs(15),
            reboot_delay: Duration::from_secs(1),
        }
    }
}

/// Collaborators the core drives
pub struct Peripherals {
    pub audio: Box<dyn AudioService>,
    pub display: Arc<dyn Display>,
    pub board: Arc<dyn Board>,
}

pub struct Application {
    machine: StateMachine,
    dispatcher: DispatcherHandle<Application>,
    protocol: Option<Box<dyn Protocol>>,
    audio: Box<dyn AudioService>,
    display: Arc<dyn Display>,
    board: Arc<dyn Board>,
    options: AppOptions,
    aec_mode: AecMode,
    /// Set when speech output was interrupted, cleared when the next one starts
    aborted: bool,
    /// Automatic expression changes are suppressed while set
    emotion_locked: bool,
    emotion_unlock: Deferred<Application>,
    /// Message of the most recent network error
    last_error: Arc<Mutex<String>>,
}

impl Application {
    pub fn new(
        dispatcher: DispatcherHandle<Application>,
        peripherals: Peripherals,
        options: AppOptions,
        event_tx: broadcast::Sender<StateEvent>,
        runtime: Handle,
    ) -> Self {
        let emotion_unlock = Deferred::new("emotion_unlock", dispatcher.clone(), runtime);
        Self {
            machine: StateMachine::new(event_tx),
            dispatcher,
            protocol: None,
            audio: peripherals.audio,
            display: peripherals.display,
            board: peripherals.board,
            aec_mode: options.aec_mode,
            options,
            aborted: false,
            emotion_locked: false,
            emotion_unlock,
            last_error: Arc::new(Mutex::new(String::new())),
        }
    }

    pub fn state(&self) -> DeviceState {
        self.machine.state()
    }

    pub fn listening_mode(&self) -> ListeningMode {
        self.machine.listening_mode()
    }

    pub fn aec_mode(&self) -> AecMode {
        self.aec_mode
    }

    pub fn is_emotion_locked(&self) -> bool {
        self.emotion_locked
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    pub fn clock_ticks(&self) -> u64 {
        self.machine.clock_ticks()
    }

    pub fn watch(&self) -> StateWatch {
        self.machine.watch()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.machine.subscribe()
    }

    /// Command handle for other threads
    pub fn controller(&self) -> Controller {
        Controller::new(self.dispatcher.clone(), self.watch())
    }

    /// Signal raiser for the audio pipeline's threads
    pub fn audio_signals(&self) -> AudioSignals {
        AudioSignals::from(self.dispatcher.clone())
    }

    /// Callback sink for the protocol layer
    pub fn protocol_events(&self) -> ProtocolEvents {
        ProtocolEvents::new(
            self.dispatcher.clone(),
            Arc::clone(&self.last_error),
            self.watch(),
        )
    }

    /// Enter Starting and bring up audio
    pub fn start(&mut self) {
        self.set_device_state(DeviceState::Starting);
        self.display
            .set_chat_message("system", &self.board.user_agent());
        self.audio.start();
    }

    /// Install the protocol once the update workflow is done and go Idle
    pub fn finish_boot(&mut self, mut protocol: Box<dyn Protocol>, version: &str) {
        self.display.set_status(lang::LOADING_PROTOCOL);
        let started = protocol.start();
        self.protocol = Some(protocol);

        self.set_device_state(DeviceState::Idle);

        if started {
            self.display
                .show_notification(&format!("{}{}", lang::VERSION, version));
            self.display.set_chat_message("system", "");
            self.audio.play_sound(Sound::Success);
        } else {
            warn!("protocol failed to start");
        }
    }

    /// Move to `state` and apply its entry effects exactly once
    pub fn set_device_state(&mut self, state: DeviceState) {
        let Some(transition) = self.machine.transition_to(state) else {
            return;
        };

        match transition.current {
            DeviceState::Unknown | DeviceState::Idle => {
                self.display.set_status(lang::STANDBY);
                self.apply_emotion("neutral");
                self.audio.enable_voice_processing(false);
                self.audio.enable_wake_word_detection(true);
            }
            DeviceState::Connecting => {
                self.display.set_status(lang::CONNECTING);
                self.apply_emotion("neutral");
                self.display.set_chat_message("system", "");
            }
            DeviceState::Listening => {
                self.display.set_status(lang::LISTENING);
                self.apply_emotion("neutral");

                if !self.audio.is_voice_processing_running() {
                    if let Some(protocol) = self.protocol.as_mut() {
                        protocol.send_start_listening(self.machine.listening_mode());
                    }
                    self.audio.enable_voice_processing(true);
                    self.audio.enable_wake_word_detection(false);
                }
            }
            DeviceState::Speaking => {
                self.display.set_status(lang::SPEAKING);

                if self.machine.listening_mode() != ListeningMode::Realtime {
                    self.audio.enable_voice_processing(false);
                    let during_playback = self.audio.wake_word_during_playback();
                    self.audio.enable_wake_word_detection(during_playback);
                }
                self.audio.reset_decoder();
            }
            _ => {}
        }
    }

    /// Show an alert on the display and tell listeners about it
    pub fn alert(&mut self, alert: Alert) {
        warn!(
            emotion = %alert.emotion,
            status = %alert.status,
            message = %alert.message,
            "alert"
        );
        self.display.set_status(&alert.status);
        self.display.set_emotion(&alert.emotion);
        self.display.set_chat_message("system", &alert.message);
        if let Some(sound) = alert.sound {
            self.audio.play_sound(sound);
        }
        self.machine.emit(StateEvent::Alert {
            status: alert.status,
            message: alert.message,
            emotion: alert.emotion,
        });
    }

    /// Clear an alert, but only when nothing else owns the display
    pub fn dismiss_alert(&mut self) {
        if self.state() == DeviceState::Idle {
            self.display.set_status(lang::STANDBY);
            self.apply_emotion("neutral");
            self.display.set_chat_message("system", "");
        }
    }

    /// Show `emotion` and ignore automatic expression changes for `duration`
    pub fn lock_emotion(&mut self, emotion: &str, duration: Duration) {
        self.hold_emotion(emotion, duration, false);
    }

    /// Like [`lock_emotion`](Self::lock_emotion), but the display goes back
    /// to neutral when the time is up
    pub fn show_transient_expression(&mut self, emotion: &str, duration: Duration) {
        self.hold_emotion(emotion, duration, true);
    }

    fn hold_emotion(&mut self, emotion: &str, duration: Duration, restore: bool) {
        self.emotion_locked = true;
        self.display.set_emotion(emotion);
        info!(emotion, secs = duration.as_secs(), "emotion locked");

        self.emotion_unlock.arm(duration, move |app| {
            app.emotion_locked = false;
            info!("emotion unlocked");
            if restore {
                app.apply_emotion("neutral");
            }
        });
    }

    /// Display the activation code and read it out digit by digit
    pub fn show_activation_code(&mut self, code: &str, message: &str) {
        self.alert(Alert::new(lang::ACTIVATION, message, "winking").with_sound(Sound::Activation));
        self.lock_emotion("winking", self.options.emotion_lock);

        for digit in code.chars().filter_map(|c| c.to_digit(10)) {
            self.audio.play_sound(Sound::Digit(digit as u8));
        }
    }

    /// Automatic expression change; skipped while the emotion is locked
    fn apply_emotion(&self, emotion: &str) {
        if self.emotion_locked {
            debug!(emotion, "emotion locked, ignoring change");
            return;
        }
        self.display.set_emotion(emotion);
    }

    pub fn set_aec_mode(&mut self, mode: AecMode) {
        self.aec_mode = mode;
        match mode {
            AecMode::Off => {
                self.audio.enable_device_aec(false);
                self.display.show_notification(lang::RTC_MODE_OFF);
            }
            AecMode::OnServerSide => {
                self.audio.enable_device_aec(false);
                self.display.show_notification(lang::RTC_MODE_ON);
            }
            AecMode::OnDeviceSide => {
                self.audio.enable_device_aec(true);
                self.display.show_notification(lang::RTC_MODE_ON);
            }
        }

        // the new mode takes effect on the next conversation
        if let Some(protocol) = self.protocol.as_mut() {
            if protocol.is_audio_channel_opened() {
                protocol.close_audio_channel();
            }
        }
    }

    pub fn can_enter_sleep_mode(&self) -> bool {
        if self.state() != DeviceState::Idle {
            return false;
        }
        if self
            .protocol
            .as_ref()
            .is_some_and(|protocol| protocol.is_audio_channel_opened())
        {
            return false;
        }
        self.audio.is_idle()
    }

    /// Release the channel and audio, then restart the device
    pub fn reboot(&mut self) -> ! {
        info!("rebooting");
        if let Some(mut protocol) = self.protocol.take() {
            if protocol.is_audio_channel_opened() {
                protocol.close_audio_channel();
            }
        }
        self.audio.stop();

        std::thread::sleep(self.options.reboot_delay);
        self.board.restart()
    }

    pub(crate) fn prepare_upgrade(&mut self) {
        if let Some(protocol) = self.protocol.as_mut() {
            if protocol.is_audio_channel_opened() {
                info!("closing audio channel before firmware upgrade");
                protocol.close_audio_channel();
            }
        }
        self.board.set_power_save_mode(false);
        self.audio.stop();
    }

    pub(crate) fn restore_after_failed_upgrade(&mut self) {
        self.audio.start();
        self.board.set_power_save_mode(true);
    }

    pub(crate) fn display(&self) -> &Arc<dyn Display> {
        &self.display
    }
}

impl SignalHandler for Application {
    fn on_network_error(&mut self) {
        self.report_network_error();
    }

    fn on_send_audio(&mut self) {
        self.drain_send_queue();
    }

    fn on_wake_word_detected(&mut self) {
        self.handle_wake_word();
    }

    fn on_voice_activity_changed(&mut self) {
        if self.state() == DeviceState::Listening {
            let speaking = self.audio.is_voice_detected();
            self.machine.emit(StateEvent::VoiceActivity { speaking });
        }
    }

    fn on_clock_tick(&mut self) {
        let ticks = self.machine.tick();
        self.display.update_status_bar(false);

        if ticks % HOUSEKEEPING_TICKS == 0 {
            debug!(
                ticks,
                state = %self.state(),
                audio_idle = self.audio.is_idle(),
                "housekeeping"
            );
        }
    }
}
