//! Background reclamation of idle actor ledgers.

use crate::clock::FAR_FUTURE;
use crate::engine::AdmissionEngine;
use std::sync::Weak;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

/// Handle to the periodic sweep task. Dropping it stops the task.
#[derive(Debug)]
pub(crate) struct Sweeper {
    handle: JoinHandle<()>,
}

impl Sweeper {
    /// Spawn on the current tokio runtime. The task only holds a weak
    /// reference and exits once the engine is gone.
    pub(crate) fn spawn(engine: Weak<AdmissionEngine>, every: Duration) -> Self {
        let every = every.min(FAR_FUTURE);
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(live) = engine.upgrade() else {
                    break;
                };
                live.sweep();
            }
            debug!("reclamation sweeper exited: engine dropped");
        });
        debug!(interval_ms = every.as_millis() as u64, "reclamation sweeper started");
        Self { handle }
    }

    pub(crate) fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        // sweep() is synchronous, so the task is only ever parked on tick().
        self.handle.abort();
    }
}
