use tracing::{info, warn};

use crate::ota::{ActivationError, UpdateService, UpgradeProgress};

/// Update service for a device with no update server.
///
/// The check always succeeds, never finds a new firmware and needs no
/// activation.
#[derive(Debug)]
pub struct OfflineUpdateService {
    version: String,
    valid: bool,
}

impl OfflineUpdateService {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            valid: false,
        }
    }

    pub fn is_marked_valid(&self) -> bool {
        self.valid
    }
}

impl Default for OfflineUpdateService {
    fn default() -> Self {
        Self::new(env!("CARGO_PKG_VERSION"))
    }
}

impl UpdateService for OfflineUpdateService {
    fn check_version(&mut self) -> bool {
        info!(version = %self.version, "offline, skipping remote version check");
        true
    }

    fn check_version_url(&self) -> String {
        "offline".to_string()
    }

    fn current_version(&self) -> String {
        self.version.clone()
    }

    fn has_new_version(&self) -> bool {
        false
    }

    fn firmware_version(&self) -> String {
        self.version.clone()
    }

    fn firmware_url(&self) -> String {
        String::new()
    }

    fn mark_current_version_valid(&mut self) {
        self.valid = true;
    }

    fn has_activation_code(&self) -> bool {
        false
    }

    fn has_activation_challenge(&self) -> bool {
        false
    }

    fn activation_code(&self) -> String {
        String::new()
    }

    fn activation_message(&self) -> String {
        String::new()
    }

    fn activate(&mut self) -> Result<(), ActivationError> {
        Ok(())
    }

    fn start_upgrade_from_url(
        &mut self,
        url: &str,
        _progress: &mut dyn FnMut(UpgradeProgress),
    ) -> bool {
        warn!(url, "cannot upgrade while offline");
        false
    }
}
