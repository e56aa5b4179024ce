//! Firmware update check and device activation
//!
//! Runs once at boot on its own thread. It retries the version check with
//! exponential backoff, hands off to the upgrade procedure when a new
//! firmware exists, then polls the activation endpoint until the server
//! accepts the device.

mod retry;
mod service;
mod workflow;

pub use retry::{ActivationState, OtaRetryState, RetryPolicy, MAX_ACTIVATION_ATTEMPTS, MAX_RETRY};
pub use service::{ActivationError, UpdateService, UpgradeProgress};
pub use workflow::{Sleeper, ThreadSleeper, UpdateHost, UpdateOutcome, UpdateWorkflow};
