//! User-facing strings

pub const STANDBY: &str = "Standby";
pub const CONNECTING: &str = "Connecting...";
pub const LISTENING: &str = "Listening...";
pub const SPEAKING: &str = "Speaking...";
pub const ERROR: &str = "Error";
pub const ACTIVATION: &str = "Activation";
pub const CHECKING_NEW_VERSION: &str = "Checking new version...";
pub const LOADING_PROTOCOL: &str = "Logging in...";
pub const OTA_UPGRADE: &str = "OTA Upgrade";
pub const UPGRADING: &str = "System is upgrading...";
pub const UPGRADE_FAILED: &str = "Upgrade failed";
pub const NEW_VERSION: &str = "New version: ";
pub const VERSION: &str = "Version ";
pub const RTC_MODE_OFF: &str = "AEC Off";
pub const RTC_MODE_ON: &str = "AEC On";

pub fn check_new_version_failed(delay_secs: u64, url: &str) -> String {
    format!("Check new version failed, retry in {delay_secs} seconds: {url}")
}
