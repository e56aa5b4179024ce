//! Deferred one-shot reversals
//!
//! The caller applies an effect right away and arms a [`Deferred`] with the
//! matching reversal. When the delay elapses the timer task only schedules
//! the reversal; the reversal itself always runs on the dispatcher.
//!
//! Arming an already armed slot cancels the pending reversal and starts the
//! delay over, so the effect lasts `delay` from the most recent arm.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::dispatch::DispatcherHandle;

/// A single cancellable reversal slot
pub struct Deferred<C> {
    name: &'static str,
    dispatcher: DispatcherHandle<C>,
    runtime: Handle,
    /// Generation whose reversal is still pending; 0 when disarmed
    armed: Arc<AtomicU64>,
    next_generation: u64,
    timer: Option<JoinHandle<()>>,
}

impl<C: 'static> Deferred<C> {
    pub fn new(name: &'static str, dispatcher: DispatcherHandle<C>, runtime: Handle) -> Self {
        Self {
            name,
            dispatcher,
            runtime,
            armed: Arc::new(AtomicU64::new(0)),
            next_generation: 0,
            timer: None,
        }
    }

    /// Schedule `reversal` to run on the dispatcher after `delay`,
    /// replacing any reversal that is still pending
    pub fn arm<F>(&mut self, delay: Duration, reversal: F)
    where
        F: FnOnce(&mut C) + Send + 'static,
    {
        if self.cancel() {
            debug!(name = self.name, "restarting one-shot timer");
        }

        self.next_generation += 1;
        let generation = self.next_generation;
        self.armed.store(generation, Ordering::SeqCst);

        let armed = Arc::clone(&self.armed);
        let dispatcher = self.dispatcher.clone();
        let name = self.name;
        self.timer = Some(self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            dispatcher.schedule(move |ctx| {
                if armed
                    .compare_exchange(generation, 0, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
                {
                    debug!(name, "dropping stale one-shot reversal");
                    return;
                }
                debug!(name, "one-shot reversal");
                reversal(ctx);
            });
        }));
    }

    /// Drop the pending reversal. Returns true if one was pending.
    pub fn cancel(&mut self) -> bool {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.armed.swap(0, Ordering::SeqCst) != 0
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst) != 0
    }
}

impl<C> Drop for Deferred<C> {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}
