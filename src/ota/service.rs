//! Update server interface

use std::fmt;

/// Why an activation poll failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActivationError {
    /// The server has not seen the code yet
    #[error("activation timed out")]
    Timeout,

    #[error("activation failed: {0}")]
    Failed(String),
}

/// Download progress reported during a firmware upgrade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpgradeProgress {
    pub percent: u8,
    pub bytes_per_second: usize,
}

impl fmt::Display for UpgradeProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}% {}KB/s", self.percent, self.bytes_per_second / 1024)
    }
}

/// Firmware/configuration server
pub trait UpdateService {
    /// Fetch version and activation info; false on any transport failure
    fn check_version(&mut self) -> bool;
    fn check_version_url(&self) -> String;

    fn current_version(&self) -> String;
    fn has_new_version(&self) -> bool;
    fn firmware_version(&self) -> String;
    fn firmware_url(&self) -> String;
    fn mark_current_version_valid(&mut self);

    fn has_activation_code(&self) -> bool;
    fn has_activation_challenge(&self) -> bool;
    fn activation_code(&self) -> String;
    fn activation_message(&self) -> String;
    fn activate(&mut self) -> Result<(), ActivationError>;

    /// Download and install firmware; returns false if the upgrade failed
    fn start_upgrade_from_url(
        &mut self,
        url: &str,
        progress: &mut dyn FnMut(UpgradeProgress),
    ) -> bool;
}
