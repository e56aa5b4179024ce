//! Task queue and the dispatcher loop
//!
//! The queue lock only guards the push/swap boundary: tasks run with no lock
//! held, so a task may schedule more work without deadlocking. Anything it
//! schedules runs on the next wake-up.

use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::{Condvar, Mutex};
use tokio::sync::oneshot;
use tracing::{debug, error, info};

use super::signals::{Signal, SignalSet};

/// A unit of work executed on the dispatcher thread
pub type Task<C> = Box<dyn FnOnce(&mut C) + Send + 'static>;

/// Per-signal handling for the dispatcher context
///
/// `Signal::Schedule` is handled by the dispatcher itself (it drains the
/// task queue), so it has no hook here.
pub trait SignalHandler {
    fn on_network_error(&mut self) {}
    fn on_send_audio(&mut self) {}
    fn on_wake_word_detected(&mut self) {}
    fn on_voice_activity_changed(&mut self) {}
    fn on_clock_tick(&mut self) {}
}

/// Pending signals plus the condvar the dispatcher sleeps on
struct EventGroup {
    signals: Mutex<SignalSet>,
    wake: Condvar,
    shutdown: AtomicBool,
}

impl EventGroup {
    fn raise(&self, signal: Signal) {
        let mut signals = self.signals.lock();
        signals.insert(signal);
        self.wake.notify_one();
    }

    /// Block until something is pending, then capture and clear it.
    /// Returns `None` once shutdown has been requested.
    fn wait(&self) -> Option<SignalSet> {
        let mut signals = self.signals.lock();
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                return None;
            }
            if !signals.is_empty() {
                return Some(signals.take());
            }
            self.wake.wait(&mut signals);
        }
    }

    fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        let _signals = self.signals.lock();
        self.wake.notify_all();
    }
}

struct Shared<C> {
    events: EventGroup,
    tasks: Mutex<Vec<Task<C>>>,
}

/// The single execution context that owns the device core
pub struct Dispatcher<C> {
    shared: Arc<Shared<C>>,
}

/// Cloneable producer-side handle to a [`Dispatcher`]
pub struct DispatcherHandle<C> {
    shared: Arc<Shared<C>>,
}

impl<C> Clone for DispatcherHandle<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C> DispatcherHandle<C> {
    /// Queue `task` to run on the dispatcher thread.
    /// After shutdown the task is dropped without running.
    pub fn schedule<F>(&self, task: F)
    where
        F: FnOnce(&mut C) + Send + 'static,
    {
        let mut tasks = self.shared.tasks.lock();
        if self.is_shutdown() {
            drop(tasks);
            debug!("dispatcher stopped, dropping task");
            return;
        }
        tasks.push(Box::new(task));
        drop(tasks);
        self.shared.events.raise(Signal::Schedule);
    }

    /// Raise a signal; coalesces with an identical pending one
    pub fn raise(&self, signal: Signal) {
        self.shared.events.raise(signal);
    }

    /// Run `f` on the dispatcher and hand its result back.
    ///
    /// Await the receiver from async code or call `blocking_recv` from a
    /// plain thread. Never wait on it from the dispatcher thread itself.
    pub fn request<R, F>(&self, f: F) -> oneshot::Receiver<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut C) -> R + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.schedule(move |ctx| {
            let _ = tx.send(f(ctx));
        });
        rx
    }

    /// Ask the dispatcher loop to exit after its current wake-up.
    /// Queued tasks are dropped, so pending `request` receivers resolve
    /// with an error.
    pub fn shutdown(&self) {
        self.shared.events.request_shutdown();
        let pending = std::mem::take(&mut *self.shared.tasks.lock());
        if !pending.is_empty() {
            debug!(count = pending.len(), "dropping tasks queued at shutdown");
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.events.shutdown.load(Ordering::Acquire)
    }
}

impl<C> Default for Dispatcher<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Dispatcher<C> {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                events: EventGroup {
                    signals: Mutex::new(SignalSet::empty()),
                    wake: Condvar::new(),
                    shutdown: AtomicBool::new(false),
                },
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn handle(&self) -> DispatcherHandle<C> {
        DispatcherHandle {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C: SignalHandler> Dispatcher<C> {
    /// Run the dispatcher loop until shutdown is requested
    pub fn run(&self, ctx: &mut C) {
        info!("dispatcher loop started");

        while let Some(signals) = self.shared.events.wait() {
            self.dispatch(signals, ctx);
        }

        info!("dispatcher loop stopped");
    }

    /// Handle whatever is pending without blocking.
    /// Returns false when nothing was pending.
    pub fn poll(&self, ctx: &mut C) -> bool {
        let signals = self.shared.events.signals.lock().take();
        if signals.is_empty() {
            return false;
        }
        self.dispatch(signals, ctx);
        true
    }

    fn dispatch(&self, signals: SignalSet, ctx: &mut C) {
        for signal in signals.iter() {
            match signal {
                Signal::NetworkError => guarded(signal, || ctx.on_network_error()),
                Signal::SendAudio => guarded(signal, || ctx.on_send_audio()),
                Signal::WakeWordDetected => guarded(signal, || ctx.on_wake_word_detected()),
                Signal::VoiceActivityChanged => {
                    guarded(signal, || ctx.on_voice_activity_changed())
                }
                Signal::Schedule => self.drain(ctx),
                Signal::ClockTick => guarded(signal, || ctx.on_clock_tick()),
            }
        }
    }

    /// Run every task queued at this instant
    fn drain(&self, ctx: &mut C) {
        let tasks = std::mem::take(&mut *self.shared.tasks.lock());
        if tasks.len() > 1 {
            debug!(count = tasks.len(), "draining scheduled tasks");
        }
        for task in tasks {
            guarded(Signal::Schedule, || task(ctx));
        }
    }
}

impl<C: SignalHandler + Send + 'static> Dispatcher<C> {
    /// Move `ctx` onto a dedicated thread and run the loop there.
    /// The thread returns the context once the loop exits.
    pub fn spawn(self, mut ctx: C) -> io::Result<thread::JoinHandle<C>> {
        thread::Builder::new()
            .name("main-event-loop".to_string())
            .spawn(move || {
                self.run(&mut ctx);
                ctx
            })
    }
}

/// Run one piece of dispatched work, logging a panic instead of unwinding
/// through the loop
fn guarded(signal: Signal, work: impl FnOnce()) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(work)) {
        error!(
            %signal,
            reason = panic_message(payload.as_ref()),
            "dispatched work panicked"
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic payload"
    }
}
