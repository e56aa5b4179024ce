//! voicebot-core: event dispatch and device state for a voice-interactive robot
//!
//! - [`dispatch`]: the single-threaded dispatcher every state change runs on
//! - [`state`]: device states and the transition bookkeeping
//! - [`app`]: the core itself, the audio channel handshake and the handles
//!   other threads use to reach it
//! - [`ota`]: version check, upgrade and activation with bounded retries
//! - [`oneshot`]: apply-now, revert-later effects
//!
//! The network protocol, audio pipeline, display and board are reached only
//! through the traits in [`peripherals`].

pub mod app;
pub mod config;
pub mod dispatch;
pub mod events;
pub mod host;
pub mod ipc;
pub mod lifecycle;
pub mod oneshot;
pub mod ota;
pub mod peripherals;
pub mod state;
