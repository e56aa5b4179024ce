//! Interfaces to the collaborators the core drives
//!
//! The network protocol, audio pipeline, display and board are implemented
//! elsewhere; the core only sees these traits.

mod audio;
mod protocol;

pub use audio::{AudioPacket, AudioService, AudioSignals, Sound};
pub use protocol::{IncomingMessage, Protocol, ProtocolEvent, TtsState};

/// Write-only user interface surface
pub trait Display: Send + Sync {
    fn set_status(&self, status: &str);
    fn set_emotion(&self, emotion: &str);
    /// Show a chat-style line; an empty `content` clears the area
    fn set_chat_message(&self, role: &str, content: &str);
    fn show_notification(&self, message: &str);
    fn update_status_bar(&self, update_all: bool);
}

/// Board-level controls
pub trait Board: Send + Sync {
    fn set_power_save_mode(&self, enabled: bool);

    /// Restart the device. There is no way back from this call.
    fn restart(&self) -> !;

    /// Identification line shown while booting
    fn user_agent(&self) -> String {
        format!("voicebot/{}", env!("CARGO_PKG_VERSION"))
    }
}
