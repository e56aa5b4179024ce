//! Core state machine implementation
//!
//! Tracks the live device state, the listening mode chosen when listening
//! started, and the clock ticks since the last transition.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info};

use super::modes::ListeningMode;
use crate::events::StateEvent;

/// Operational state of the device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    #[default]
    Unknown,
    Starting,
    Configuring,
    Idle,
    Connecting,
    Listening,
    Speaking,
    Upgrading,
    Activating,
    AudioTesting,
    FatalError,
}

impl DeviceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceState::Unknown => "unknown",
            DeviceState::Starting => "starting",
            DeviceState::Configuring => "configuring",
            DeviceState::Idle => "idle",
            DeviceState::Connecting => "connecting",
            DeviceState::Listening => "listening",
            DeviceState::Speaking => "speaking",
            DeviceState::Upgrading => "upgrading",
            DeviceState::Activating => "activating",
            DeviceState::AudioTesting => "audio_testing",
            DeviceState::FatalError => "fatal_error",
        }
    }
}

impl std::fmt::Display for DeviceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only view of the current device state for other contexts
pub type StateWatch = watch::Receiver<DeviceState>;

/// A transition that actually changed the state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub previous: DeviceState,
    pub current: DeviceState,
}

/// The state machine that records transitions and notifies listeners
pub struct StateMachine {
    /// Current state
    state: DeviceState,
    /// Mode selected the last time listening started
    listening_mode: ListeningMode,
    /// Clock ticks since the last transition
    clock_ticks: u64,
    /// Time when the current state was entered
    state_entered_at: Instant,
    /// Channel for emitting state events
    event_tx: broadcast::Sender<StateEvent>,
    /// Snapshot published to read-only observers
    snapshot_tx: watch::Sender<DeviceState>,
}

impl StateMachine {
    /// Create a new state machine in the `Unknown` state
    pub fn new(event_tx: broadcast::Sender<StateEvent>) -> Self {
        let (snapshot_tx, _) = watch::channel(DeviceState::Unknown);
        Self {
            state: DeviceState::Unknown,
            listening_mode: ListeningMode::default(),
            clock_ticks: 0,
            state_entered_at: Instant::now(),
            event_tx,
            snapshot_tx,
        }
    }

    /// Get the current state
    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn listening_mode(&self) -> ListeningMode {
        self.listening_mode
    }

    pub fn set_listening_mode(&mut self, mode: ListeningMode) {
        self.listening_mode = mode;
    }

    pub fn clock_ticks(&self) -> u64 {
        self.clock_ticks
    }

    /// Count one clock tick and return the total since the last transition
    pub fn tick(&mut self) -> u64 {
        self.clock_ticks += 1;
        self.clock_ticks
    }

    /// Subscribe to state snapshots
    pub fn watch(&self) -> StateWatch {
        self.snapshot_tx.subscribe()
    }

    /// Subscribe to state events
    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.event_tx.subscribe()
    }

    /// Publish a non-transition event to listeners
    pub fn emit(&self, event: StateEvent) {
        debug!(%event, "emitting state event");
        let _ = self.event_tx.send(event);
    }

    /// Move to `new_state`.
    ///
    /// Returns `None` without touching anything if the device is already in
    /// `new_state`; otherwise the caller must apply the entry effects for the
    /// returned transition.
    pub fn transition_to(&mut self, new_state: DeviceState) -> Option<Transition> {
        let previous = self.state;
        if previous == new_state {
            return None;
        }

        let duration_ms = self.state_entered_at.elapsed().as_millis() as u64;
        info!(
            from = %previous,
            to = %new_state,
            duration_ms = duration_ms,
            "state transition"
        );

        self.state = new_state;
        self.clock_ticks = 0;
        self.state_entered_at = Instant::now();
        self.snapshot_tx.send_replace(new_state);
        self.emit(StateEvent::StateChanged {
            previous,
            current: new_state,
        });

        Some(Transition {
            previous,
            current: new_state,
        })
    }
}
