//! Version check, upgrade hand-off and activation polling
//!
//! The workflow never touches device state directly: every effect goes
//! through [`UpdateHost`], which in production marshals it onto the
//! dispatcher. Waits happen on the workflow's own thread and are cut short
//! when the device is put back to Idle.

use std::time::Duration;

use tracing::{error, info, warn};

use super::retry::{ActivationState, OtaRetryState, RetryPolicy};
use super::service::{ActivationError, UpdateService};
use crate::app::{lang, Alert};
use crate::peripherals::Sound;
use crate::state::DeviceState;

/// Granularity of interruptible waits
const WAIT_SLICE: Duration = Duration::from_secs(1);

/// How a workflow run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Version checked and device activated (or nothing to activate)
    Ready,
    /// Too many consecutive version check failures
    VersionCheckAbandoned,
    /// The device was put back to Idle while activation was pending
    ActivationCancelled,
    /// Every activation poll failed; the device stays in Activating
    ActivationExhausted,
    /// A new firmware was installed and a restart was requested
    Rebooting,
}

/// What the workflow needs from the device core
pub trait UpdateHost {
    fn device_state(&self) -> DeviceState;
    /// Must not return before the transition has been applied
    fn set_device_state(&self, state: DeviceState);
    fn set_status(&self, status: &str);
    fn set_chat_message(&self, role: &str, content: &str);
    fn alert(&self, alert: Alert);
    fn show_activation_code(&self, code: &str, message: &str);
    /// Close the audio channel and release audio before flashing
    fn prepare_upgrade(&self);
    /// Bring audio back after a failed upgrade
    fn restore_after_failed_upgrade(&self);
    fn reboot(&self);
}

/// Blocking wait used between attempts
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the calling thread
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

pub struct UpdateWorkflow<S, H, Z> {
    service: S,
    host: H,
    sleeper: Z,
    policy: RetryPolicy,
}

impl<S, H, Z> UpdateWorkflow<S, H, Z>
where
    S: UpdateService,
    H: UpdateHost,
    Z: Sleeper,
{
    pub fn new(service: S, host: H, sleeper: Z, policy: RetryPolicy) -> Self {
        Self {
            service,
            host,
            sleeper,
            policy,
        }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Run the check/upgrade/activate sequence to completion
    pub fn run(&mut self) -> UpdateOutcome {
        let mut retry = OtaRetryState::new(&self.policy);

        loop {
            self.host.set_device_state(DeviceState::Activating);
            self.host.set_status(lang::CHECKING_NEW_VERSION);

            if !self.service.check_version() {
                let Some(delay) = retry.record_failure(&self.policy) else {
                    error!(
                        retries = retry.retry_count,
                        "too many retries, exit version check"
                    );
                    return UpdateOutcome::VersionCheckAbandoned;
                };

                let url = self.service.check_version_url();
                self.host.alert(
                    Alert::new(
                        lang::ERROR,
                        lang::check_new_version_failed(delay.as_secs(), &url),
                        "cloud_slash",
                    )
                    .with_sound(Sound::Exclamation),
                );
                warn!(
                    delay_secs = delay.as_secs(),
                    retry = retry.retry_count,
                    max_retry = self.policy.max_retry,
                    "check new version failed, retrying"
                );

                if self.wait_unless_idle(delay) {
                    info!("backoff wait cut short, device is idle");
                }
                continue;
            }
            retry.reset(&self.policy);

            if self.service.has_new_version() {
                if self.upgrade_firmware() {
                    return UpdateOutcome::Rebooting;
                }
                // a failed upgrade is not fatal, keep booting the current image
            }

            self.service.mark_current_version_valid();

            let activation = ActivationState::from_service(&self.service);
            if !activation.is_outstanding() {
                info!(version = %self.service.current_version(), "version check done");
                return UpdateOutcome::Ready;
            }

            return self.activate(activation);
        }
    }

    /// Install the firmware the server advertised.
    ///
    /// Returns true once a reboot has been requested; false means the old
    /// image keeps running.
    fn upgrade_firmware(&mut self) -> bool {
        let Self {
            service,
            host,
            sleeper,
            policy,
        } = self;

        let upgrade_url = service.firmware_url();
        let version_info = service.firmware_version();

        host.prepare_upgrade();
        info!(url = %upgrade_url, "starting firmware upgrade");
        host.alert(
            Alert::new(lang::OTA_UPGRADE, lang::UPGRADING, "download").with_sound(Sound::Upgrade),
        );
        sleeper.sleep(policy.notice_delay);

        host.set_device_state(DeviceState::Upgrading);
        host.set_chat_message("system", &format!("{}{}", lang::NEW_VERSION, version_info));
        sleeper.sleep(policy.settle_delay);

        let upgraded = service.start_upgrade_from_url(&upgrade_url, &mut |progress| {
            host.set_chat_message("system", &progress.to_string());
        });

        if !upgraded {
            error!("firmware upgrade failed, restoring audio and continuing");
            host.restore_after_failed_upgrade();
            host.alert(
                Alert::new(lang::ERROR, lang::UPGRADE_FAILED, "circle_xmark")
                    .with_sound(Sound::Exclamation),
            );
            sleeper.sleep(policy.notice_delay);
            return false;
        }

        info!("firmware upgrade successful, rebooting");
        host.set_chat_message("system", "Upgrade successful, rebooting...");
        sleeper.sleep(policy.settle_delay);
        host.reboot();
        true
    }

    /// Poll the activation endpoint until it succeeds, the attempts run
    /// out, or the device is put back to Idle
    fn activate(&mut self, mut activation: ActivationState) -> UpdateOutcome {
        self.host.set_status(lang::ACTIVATION);
        if let Some(code) = activation.code.as_deref() {
            let message = self.service.activation_message();
            self.host.show_activation_code(code, &message);
        }

        loop {
            if self.host.device_state() == DeviceState::Idle {
                info!(attempts = activation.attempts, "activation cancelled");
                return UpdateOutcome::ActivationCancelled;
            }
            if activation.attempts >= self.policy.activation_attempts {
                error!(
                    attempts = activation.attempts,
                    "activation attempts exhausted, waiting for operator"
                );
                return UpdateOutcome::ActivationExhausted;
            }

            activation.attempts += 1;
            info!(
                attempt = activation.attempts,
                max = self.policy.activation_attempts,
                "activating"
            );

            match self.service.activate() {
                Ok(()) => {
                    info!("device activated");
                    return UpdateOutcome::Ready;
                }
                Err(ActivationError::Timeout) => {
                    self.sleeper.sleep(self.policy.activation_timeout_delay);
                }
                Err(e) => {
                    warn!(error = %e, "activation attempt failed");
                    self.sleeper.sleep(self.policy.activation_failure_delay);
                }
            }
        }
    }

    /// Wait `total` in short slices; returns true if the device went Idle
    fn wait_unless_idle(&self, total: Duration) -> bool {
        let mut remaining = total;
        while !remaining.is_zero() {
            let step = remaining.min(WAIT_SLICE);
            self.sleeper.sleep(step);
            remaining -= step;
            if self.host.device_state() == DeviceState::Idle {
                return true;
            }
        }
        false
    }
}
