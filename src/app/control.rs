//! Handles for code that does not run on the dispatcher
//!
//! Nothing here holds a reference to [`Application`]. Commands are posted to
//! the dispatcher and state is read from the watch snapshot.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{error, warn};

use super::{Alert, Application, ChannelError};
use crate::dispatch::{DispatcherHandle, Signal};
use crate::events::StateEvent;
use crate::ota::UpdateHost;
use crate::peripherals::{IncomingMessage, Protocol, ProtocolEvent};
use crate::state::{AecMode, DeviceState, ListeningMode, StateWatch};

#[derive(Debug, Error)]
pub enum ControlError {
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error("dispatcher is not running")]
    DispatcherStopped,
}

/// Point-in-time view of the core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreStatus {
    pub state: DeviceState,
    pub listening_mode: ListeningMode,
    pub aec_mode: AecMode,
    pub emotion_locked: bool,
    pub clock_ticks: u64,
}

/// Command channel into the core
#[derive(Clone)]
pub struct Controller {
    dispatcher: DispatcherHandle<Application>,
    state: StateWatch,
}

impl Controller {
    pub(crate) fn new(dispatcher: DispatcherHandle<Application>, state: StateWatch) -> Self {
        Self { dispatcher, state }
    }

    /// Current state without a round trip to the dispatcher
    pub fn device_state(&self) -> DeviceState {
        *self.state.borrow()
    }

    pub fn watch(&self) -> StateWatch {
        self.state.clone()
    }

    pub async fn status(&self) -> Result<CoreStatus, ControlError> {
        self.call(|app| CoreStatus {
            state: app.state(),
            listening_mode: app.listening_mode(),
            aec_mode: app.aec_mode(),
            emotion_locked: app.is_emotion_locked(),
            clock_ticks: app.clock_ticks(),
        })
        .await
    }

    pub async fn subscribe(&self) -> Result<broadcast::Receiver<StateEvent>, ControlError> {
        self.call(|app| app.subscribe()).await
    }

    pub async fn toggle_chat(&self) -> Result<(), ControlError> {
        self.call(|app| app.toggle_chat_state()).await??;
        Ok(())
    }

    pub async fn start_listening(&self) -> Result<(), ControlError> {
        self.call(|app| app.start_listening()).await??;
        Ok(())
    }

    pub async fn stop_listening(&self) -> Result<(), ControlError> {
        self.call(|app| app.stop_listening()).await
    }

    pub async fn wake_word(&self, text: String) -> Result<(), ControlError> {
        self.call(move |app| app.wake_word_invoke(&text)).await??;
        Ok(())
    }

    pub async fn set_aec_mode(&self, mode: AecMode) -> Result<(), ControlError> {
        self.call(move |app| app.set_aec_mode(mode)).await
    }

    pub async fn show_expression(
        &self,
        emotion: String,
        duration: Duration,
    ) -> Result<(), ControlError> {
        self.call(move |app| app.show_transient_expression(&emotion, duration))
            .await
    }

    /// Hand the protocol to the core once the update workflow is done
    pub async fn install_protocol(
        &self,
        protocol: Box<dyn Protocol>,
        version: String,
    ) -> Result<(), ControlError> {
        self.call(move |app| app.finish_boot(protocol, &version)).await
    }

    /// Fire and forget; the device does not come back from this
    pub fn reboot(&self) {
        self.dispatcher.schedule(|app: &mut Application| {
            app.reboot();
        });
    }

    async fn call<R, F>(&self, f: F) -> Result<R, ControlError>
    where
        R: Send + 'static,
        F: FnOnce(&mut Application) -> R + Send + 'static,
    {
        if self.dispatcher.is_shutdown() {
            return Err(ControlError::DispatcherStopped);
        }
        self.dispatcher
            .request(f)
            .await
            .map_err(|_| ControlError::DispatcherStopped)
    }
}

/// Sink for protocol layer callbacks, usable from any thread
#[derive(Clone)]
pub struct ProtocolEvents {
    dispatcher: DispatcherHandle<Application>,
    last_error: Arc<Mutex<String>>,
    state: StateWatch,
}

impl ProtocolEvents {
    pub(crate) fn new(
        dispatcher: DispatcherHandle<Application>,
        last_error: Arc<Mutex<String>>,
        state: StateWatch,
    ) -> Self {
        Self {
            dispatcher,
            last_error,
            state,
        }
    }

    pub fn post(&self, event: ProtocolEvent) {
        match event {
            ProtocolEvent::NetworkError(message) => {
                error!(message = %message, "network error");
                *self.last_error.lock() = message;
                self.dispatcher.raise(Signal::NetworkError);
            }
            ProtocolEvent::IncomingAudio(packet) => {
                // not worth a dispatcher wake-up when nothing is playing
                if *self.state.borrow() != DeviceState::Speaking {
                    return;
                }
                self.dispatcher.schedule(move |app: &mut Application| {
                    app.handle_protocol_event(ProtocolEvent::IncomingAudio(packet));
                });
            }
            event => {
                self.dispatcher.schedule(move |app: &mut Application| {
                    app.handle_protocol_event(event);
                });
            }
        }
    }

    /// Parse a JSON text frame and post it as a message
    pub fn post_json(&self, text: &str) {
        match IncomingMessage::parse(text) {
            Ok(message) => self.post(ProtocolEvent::Message(message)),
            Err(e) => warn!(error = %e, "dropping malformed message"),
        }
    }
}

/// [`UpdateHost`] that runs every effect on the dispatcher.
///
/// Calls block until the dispatcher has applied them, so this must be used
/// from a plain thread, never from the dispatcher or an async task.
pub struct DispatcherHost {
    dispatcher: DispatcherHandle<Application>,
    state: StateWatch,
}

impl DispatcherHost {
    pub fn new(controller: &Controller) -> Self {
        Self {
            dispatcher: controller.dispatcher.clone(),
            state: controller.watch(),
        }
    }

    fn call<F>(&self, what: &'static str, f: F)
    where
        F: FnOnce(&mut Application) + Send + 'static,
    {
        if self.dispatcher.request(f).blocking_recv().is_err() {
            warn!(what, "dispatcher dropped update request");
        }
    }
}

impl UpdateHost for DispatcherHost {
    fn device_state(&self) -> DeviceState {
        // A stopped dispatcher reads as Idle so pending waits give up
        if self.dispatcher.is_shutdown() {
            return DeviceState::Idle;
        }
        *self.state.borrow()
    }

    fn set_device_state(&self, state: DeviceState) {
        self.call("set_device_state", move |app| app.set_device_state(state));
    }

    fn set_status(&self, status: &str) {
        let status = status.to_string();
        self.call("set_status", move |app| app.display().set_status(&status));
    }

    fn set_chat_message(&self, role: &str, content: &str) {
        let (role, content) = (role.to_string(), content.to_string());
        self.call("set_chat_message", move |app| {
            app.display().set_chat_message(&role, &content)
        });
    }

    fn alert(&self, alert: Alert) {
        self.call("alert", move |app| app.alert(alert));
    }

    fn show_activation_code(&self, code: &str, message: &str) {
        let (code, message) = (code.to_string(), message.to_string());
        self.call("show_activation_code", move |app| {
            app.show_activation_code(&code, &message)
        });
    }

    fn prepare_upgrade(&self) {
        self.call("prepare_upgrade", |app| app.prepare_upgrade());
    }

    fn restore_after_failed_upgrade(&self) {
        self.call("restore_after_failed_upgrade", |app| {
            app.restore_after_failed_upgrade()
        });
    }

    fn reboot(&self) {
        self.dispatcher.schedule(|app: &mut Application| {
            app.reboot();
        });
    }
}
