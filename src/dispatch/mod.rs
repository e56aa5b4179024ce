//! Event dispatcher
//!
//! Every piece of work that touches device state runs on one dedicated
//! thread. Producers either raise a coalescing [`Signal`] or schedule a
//! closure through a [`DispatcherHandle`].

mod clock;
mod scheduler;
mod signals;

pub use clock::run_clock;
pub use scheduler::{Dispatcher, DispatcherHandle, SignalHandler, Task};
pub use signals::{Signal, SignalSet};
