//! Reusable tick driver for platform adapters.
//!
//! Adapters that own a real tokio runtime can spawn a [`TickLoop`] instead
//! of writing their own interval loop; fully controllable hosts (tests, the
//! fake server) skip this and call `Scheduler::tick` by hand.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info};

/// Fixed-interval tick driver.
pub struct TickLoop {
    tick_interval: Duration,
}

impl TickLoop {
    pub fn new(tick_interval: Duration) -> Self {
        Self { tick_interval }
    }

    /// Spawns the loop on the current tokio runtime.
    ///
    /// `on_tick` receives the running tick count and is expected to drive
    /// scheduler ticking and any per-tick platform work. It runs on the
    /// loop's task — that task *is* the logical tick thread.
    pub fn spawn<F>(self, mut on_tick: F) -> TickLoopHandle
    where
        F: FnMut(u64) + Send + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(async move {
            let mut ticker = interval(self.tick_interval);
            let mut tick_count: u64 = 0;
            info!("tick loop started ({:?} per tick)", self.tick_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        tick_count += 1;
                        on_tick(tick_count);
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("tick loop stopped after {} ticks", tick_count);
            tick_count
        });

        TickLoopHandle { shutdown_tx, join }
    }
}

/// Handle for a spawned [`TickLoop`].
pub struct TickLoopHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<u64>,
}

impl TickLoopHandle {
    /// Stops the loop and returns the number of ticks it ran.
    pub async fn stop(self) -> u64 {
        let _ = self.shutdown_tx.send(true);
        self.join.await.unwrap_or(0)
    }
}
