//! Device state machine
//!
//! Owns the single live [`DeviceState`] and publishes every transition to
//! listeners. Entry side effects are applied by the application core, which
//! is the only caller of [`StateMachine::transition_to`].

mod machine;
mod modes;

pub use machine::{DeviceState, StateMachine, StateWatch, Transition};
pub use modes::{AbortReason, AecMode, ListeningMode};
