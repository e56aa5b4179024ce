//! Collaborators for running the core as a host process
//!
//! None of these touch hardware. They log what a device would do so the
//! daemon can be driven end to end over IPC.

mod audio;
mod loopback;
mod update;

use tracing::{debug, info, trace};

use crate::peripherals::{Board, Display};

pub use audio::NullAudio;
pub use loopback::LoopbackProtocol;
pub use update::OfflineUpdateService;

/// Exit code asking the supervisor to start the daemon again
pub const RESTART_EXIT_CODE: i32 = 75;

/// Display that writes to the log
#[derive(Debug, Default)]
pub struct LogDisplay;

impl Display for LogDisplay {
    fn set_status(&self, status: &str) {
        info!(status, "display status");
    }

    fn set_emotion(&self, emotion: &str) {
        debug!(emotion, "display emotion");
    }

    fn set_chat_message(&self, role: &str, content: &str) {
        if !content.is_empty() {
            info!(role, content, "chat");
        }
    }

    fn show_notification(&self, message: &str) {
        info!(message, "notification");
    }

    fn update_status_bar(&self, update_all: bool) {
        trace!(update_all, "status bar");
    }
}

/// Board backed by the current process
#[derive(Debug, Default)]
pub struct ProcessBoard;

impl Board for ProcessBoard {
    fn set_power_save_mode(&self, enabled: bool) {
        debug!(enabled, "power save");
    }

    fn restart(&self) -> ! {
        info!(code = RESTART_EXIT_CODE, "restarting process");
        std::process::exit(RESTART_EXIT_CODE)
    }

    fn user_agent(&self) -> String {
        format!(
            "voicebot-daemon/{} ({})",
            env!("CARGO_PKG_VERSION"),
            std::env::consts::OS
        )
    }
}
