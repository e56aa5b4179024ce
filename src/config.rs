//! Configuration loading and management

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};

use crate::app::AppOptions;
use crate::ota::RetryPolicy;
use crate::state::AecMode;

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Echo cancellation mode at boot
    pub aec_mode: AecMode,

    /// Stream the buffered wake-word audio before listening
    pub send_wake_word_data: bool,

    /// Interval of the housekeeping clock
    pub clock_interval: Duration,

    /// How long the activation code expression stays up
    pub emotion_lock: Duration,

    /// Version check and activation retry limits
    pub retry: RetryPolicy,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let data_dir = match lookup("VOICEBOT_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => {
                let home = lookup("HOME").context("HOME is not set")?;
                PathBuf::from(home)
                    .join(".local")
                    .join("share")
                    .join("voicebot")
            }
        };

        let socket_path = lookup("VOICEBOT_SOCKET")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("voicebot.sock"));

        let aec_mode = match lookup("VOICEBOT_AEC_MODE") {
            Some(value) => AecMode::from_str(&value).map_err(|e| anyhow!(e))?,
            None => AecMode::default(),
        };

        let send_wake_word_data = match lookup("VOICEBOT_SEND_WAKE_WORD_DATA") {
            Some(value) => parse_bool(&value)
                .with_context(|| format!("invalid VOICEBOT_SEND_WAKE_WORD_DATA: {value}"))?,
            None => true,
        };

        let clock_interval = secs(&lookup, "VOICEBOT_CLOCK_INTERVAL_SECS", 1)?;
        if clock_interval.is_zero() {
            bail!("VOICEBOT_CLOCK_INTERVAL_SECS must be at least 1");
        }
        let emotion_lock = secs(&lookup, "VOICEBOT_EMOTION_LOCK_SECS", 15)?;

        let mut retry = RetryPolicy::default();
        if let Some(value) = lookup("VOICEBOT_MAX_RETRY") {
            retry.max_retry = value
                .parse()
                .with_context(|| format!("invalid VOICEBOT_MAX_RETRY: {value}"))?;
        }
        retry.max_delay = secs(&lookup, "VOICEBOT_MAX_RETRY_DELAY_SECS", retry.max_delay.as_secs())?;
        if retry.max_delay < retry.initial_delay {
            bail!(
                "VOICEBOT_MAX_RETRY_DELAY_SECS must be at least {}",
                retry.initial_delay.as_secs()
            );
        }

        Ok(Self {
            socket_path,
            data_dir,
            aec_mode,
            send_wake_word_data,
            clock_interval,
            emotion_lock,
            retry,
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }

    pub fn app_options(&self) -> AppOptions {
        AppOptions {
            aec_mode: self.aec_mode,
            send_wake_word_data: self.send_wake_word_data,
            emotion_lock: self.emotion_lock,
            ..AppOptions::default()
        }
    }
}

fn secs(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> Result<Duration> {
    let secs = match lookup(key) {
        Some(value) => value
            .parse()
            .with_context(|| format!("invalid {key}: {value}"))?,
        None => default,
    };
    Ok(Duration::from_secs(secs))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
