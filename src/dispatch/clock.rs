use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tracing::debug;

use super::{DispatcherHandle, Signal};

/// Raise [`Signal::ClockTick`] every `period` until the dispatcher shuts down.
///
/// Ticks missed while the runtime was busy are skipped, not replayed.
pub async fn run_clock<C>(dispatcher: DispatcherHandle<C>, period: Duration) {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // the first tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if dispatcher.is_shutdown() {
            debug!("clock stopped");
            return;
        }
        dispatcher.raise(Signal::ClockTick);
    }
}
