use crate::peripherals::Sound;

/// A dismissible message shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub status: String,
    pub message: String,
    pub emotion: String,
    pub sound: Option<Sound>,
}

impl Alert {
    pub fn new(
        status: impl Into<String>,
        message: impl Into<String>,
        emotion: impl Into<String>,
    ) -> Self {
        Self {
            status: status.into(),
            message: message.into(),
            emotion: emotion.into(),
            sound: None,
        }
    }

    pub fn with_sound(mut self, sound: Sound) -> Self {
        self.sound = Some(sound);
        self
    }
}
