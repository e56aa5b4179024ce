//! Coalescing event signals consumed once per dispatcher wake-up

use std::fmt;

/// Independent event flags a producer can raise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    /// At least one task is waiting in the queue
    Schedule,
    /// The audio send queue has packets ready
    SendAudio,
    /// The wake-word detector fired
    WakeWordDetected,
    /// Voice activity started or stopped
    VoiceActivityChanged,
    /// Periodic clock tick
    ClockTick,
    /// The protocol layer reported a network error
    NetworkError,
}

impl Signal {
    /// Order in which the dispatcher handles signals within one wake-up
    pub const PRIORITY: [Signal; 6] = [
        Signal::NetworkError,
        Signal::SendAudio,
        Signal::WakeWordDetected,
        Signal::VoiceActivityChanged,
        Signal::Schedule,
        Signal::ClockTick,
    ];

    const fn bit(self) -> u8 {
        match self {
            Signal::Schedule => 1 << 0,
            Signal::SendAudio => 1 << 1,
            Signal::WakeWordDetected => 1 << 2,
            Signal::VoiceActivityChanged => 1 << 3,
            Signal::ClockTick => 1 << 4,
            Signal::NetworkError => 1 << 5,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Schedule => write!(f, "SCHEDULE"),
            Signal::SendAudio => write!(f, "SEND_AUDIO"),
            Signal::WakeWordDetected => write!(f, "WAKE_WORD_DETECTED"),
            Signal::VoiceActivityChanged => write!(f, "VAD_CHANGE"),
            Signal::ClockTick => write!(f, "CLOCK_TICK"),
            Signal::NetworkError => write!(f, "ERROR"),
        }
    }
}

/// A set of pending signals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalSet(u8);

impl SignalSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Add a signal; raising one that is already pending has no effect
    pub fn insert(&mut self, signal: Signal) {
        self.0 |= signal.bit();
    }

    pub fn contains(&self, signal: Signal) -> bool {
        self.0 & signal.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Take every pending signal, leaving the set empty
    pub fn take(&mut self) -> SignalSet {
        std::mem::take(self)
    }

    /// Pending signals in handling order
    pub fn iter(&self) -> impl Iterator<Item = Signal> + '_ {
        Signal::PRIORITY
            .into_iter()
            .filter(move |signal| self.contains(*signal))
    }
}

impl FromIterator<Signal> for SignalSet {
    fn from_iter<I: IntoIterator<Item = Signal>>(iter: I) -> Self {
        let mut set = SignalSet::empty();
        for signal in iter {
            set.insert(signal);
        }
        set
    }
}
