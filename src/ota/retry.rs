//! Retry bookkeeping for the version check and activation loops

use std::time::Duration;

use super::service::UpdateService;

/// Consecutive failed version checks after which the check is abandoned
pub const MAX_RETRY: u32 = 10;
/// Upper bound on activation polls per workflow run
pub const MAX_ACTIVATION_ATTEMPTS: u32 = 10;

const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(10);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(600);

/// Timing and bounds for the update workflow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retry: u32,
    /// First backoff delay; doubles after every failed check
    pub initial_delay: Duration,
    /// Ceiling for the doubling backoff
    pub max_delay: Duration,
    pub activation_attempts: u32,
    /// Wait after an activation poll that timed out
    pub activation_timeout_delay: Duration,
    /// Wait after any other failed activation poll
    pub activation_failure_delay: Duration,
    /// How long upgrade notices stay up before work starts
    pub notice_delay: Duration,
    /// Short pause around audio shutdown and reboot
    pub settle_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retry: MAX_RETRY,
            initial_delay: INITIAL_RETRY_DELAY,
            max_delay: MAX_RETRY_DELAY,
            activation_attempts: MAX_ACTIVATION_ATTEMPTS,
            activation_timeout_delay: Duration::from_secs(3),
            activation_failure_delay: Duration::from_secs(10),
            notice_delay: Duration::from_secs(3),
            settle_delay: Duration::from_secs(1),
        }
    }
}

/// Backoff state of the version check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtaRetryState {
    pub retry_count: u32,
    pub retry_delay: Duration,
}

impl OtaRetryState {
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            retry_count: 0,
            retry_delay: policy.initial_delay,
        }
    }

    /// Record a failed check.
    ///
    /// Returns how long to wait before the next attempt, or `None` once
    /// `max_retry` consecutive failures have been seen.
    pub fn record_failure(&mut self, policy: &RetryPolicy) -> Option<Duration> {
        self.retry_count += 1;
        if self.retry_count >= policy.max_retry {
            return None;
        }
        let wait = self.retry_delay;
        self.retry_delay = (self.retry_delay * 2).min(policy.max_delay);
        Some(wait)
    }

    pub fn reset(&mut self, policy: &RetryPolicy) {
        *self = Self::new(policy);
    }
}

/// Outstanding activation work for one workflow run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationState {
    pub code: Option<String>,
    pub has_challenge: bool,
    pub attempts: u32,
}

impl ActivationState {
    pub fn from_service<S: UpdateService + ?Sized>(service: &S) -> Self {
        Self {
            code: service
                .has_activation_code()
                .then(|| service.activation_code()),
            has_challenge: service.has_activation_challenge(),
            attempts: 0,
        }
    }

    pub fn is_outstanding(&self) -> bool {
        self.code.is_some() || self.has_challenge
    }
}
