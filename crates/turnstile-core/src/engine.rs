//! The admission control engine.
//!
//! One engine is shared (behind an `Arc`) by every request handler. Actor
//! ledgers and session registries live in sharded maps; each operation does
//! its read-modify-write under the shard lock of the key it touches, so two
//! checks for the same actor never interleave while unrelated keys proceed
//! in parallel.

use crate::clock::{Clock, SystemClock};
use crate::config::AdmissionConfig;
use crate::error::ConfigError;
use crate::ledger::ActorLedger;
use crate::session::SessionRegistry;
use crate::sweep::Sweeper;
use crate::verdict::{DenyReason, Verdict};
use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Point-in-time counts, for introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStats {
    pub actors: usize,
    pub blocked_actors: usize,
    pub sessions: usize,
    pub seated: usize,
}

pub struct AdmissionEngine {
    config: AdmissionConfig,
    clock: Arc<dyn Clock>,
    actors: DashMap<String, ActorLedger>,
    sessions: DashMap<String, SessionRegistry>,
    sweeper: Mutex<Option<Sweeper>>,
}

impl std::fmt::Debug for AdmissionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionEngine")
            .field("config", &self.config)
            .field("actors", &self.actors.len())
            .field("sessions", &self.sessions.len())
            .finish_non_exhaustive()
    }
}

impl AdmissionEngine {
    pub fn new(config: AdmissionConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: AdmissionConfig, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            clock,
            actors: DashMap::new(),
            sessions: DashMap::new(),
            sweeper: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    /// Decide whether `actor_id` may submit now, recording the attempt.
    ///
    /// # Panics
    /// If `actor_id` is empty.
    pub fn check_submission(&self, actor_id: &str) -> Verdict {
        require_id("actor_id", actor_id);
        if !self.config.enforce {
            return self.full_quota();
        }

        let verdict = {
            let mut ledger = self
                .actors
                .entry(actor_id.to_owned())
                .or_insert_with(|| ActorLedger::new(self.clock.now()));
            // Read the clock under the lock so timestamps land in order.
            let now = self.clock.now();
            ledger.check(now, &self.config)
        };

        match verdict.reason {
            Some(DenyReason::BlockImposed { block }) => warn!(
                actor = actor_id,
                block_ms = block.as_millis() as u64,
                "actor blocked after repeated rate limit violations"
            ),
            Some(reason) => debug!(
                actor = actor_id,
                reason = reason.code(),
                retry_after_ms = verdict.retry_after.map(|d| d.as_millis() as u64),
                "submission denied"
            ),
            None => debug!(
                actor = actor_id,
                remaining = verdict.remaining,
                "submission allowed"
            ),
        }

        verdict
    }

    /// What [`check_submission`](Self::check_submission) would answer, without
    /// recording anything.
    ///
    /// # Panics
    /// If `actor_id` is empty.
    pub fn status(&self, actor_id: &str) -> Verdict {
        require_id("actor_id", actor_id);
        if !self.config.enforce {
            return self.full_quota();
        }

        match self.actors.get(actor_id) {
            Some(ledger) => ledger.peek(self.clock.now(), &self.config),
            None => self.full_quota(),
        }
    }

    /// Forget everything about `actor_id`, including an active block.
    ///
    /// # Panics
    /// If `actor_id` is empty.
    pub fn reset(&self, actor_id: &str) {
        require_id("actor_id", actor_id);
        if self.actors.remove(actor_id).is_some() {
            info!(actor = actor_id, "actor ledger reset");
        }
    }

    /// Admit `actor_id` to `session_id` if a seat is free or it already holds one.
    ///
    /// # Panics
    /// If either identifier is empty.
    pub fn check_join(&self, session_id: &str, actor_id: &str) -> Verdict {
        require_id("session_id", session_id);
        require_id("actor_id", actor_id);
        if !self.config.enforce {
            return Verdict::allow(self.config.max_capacity, Duration::ZERO);
        }

        let verdict = self
            .sessions
            .entry(session_id.to_owned())
            .or_default()
            .join(actor_id, self.config.max_capacity);

        if verdict.allowed {
            debug!(
                session = session_id,
                actor = actor_id,
                remaining = verdict.remaining,
                "join allowed"
            );
        } else {
            info!(session = session_id, actor = actor_id, "session full, join denied");
        }

        verdict
    }

    /// Release `actor_id`'s seat in `session_id`. Absent actors and sessions
    /// are a no-op.
    ///
    /// # Panics
    /// If either identifier is empty.
    pub fn remove_participant(&self, session_id: &str, actor_id: &str) {
        require_id("session_id", session_id);
        require_id("actor_id", actor_id);

        let removed = match self.sessions.get_mut(session_id) {
            Some(mut session) => session.remove(actor_id),
            None => return,
        };
        // An empty registry is indistinguishable from an absent one.
        self.sessions.remove_if(session_id, |_, s| s.is_empty());

        if removed {
            debug!(session = session_id, actor = actor_id, "participant removed");
        }
    }

    /// Drop the whole member set of `session_id`.
    ///
    /// # Panics
    /// If `session_id` is empty.
    pub fn clear_session(&self, session_id: &str) {
        require_id("session_id", session_id);
        if let Some((_, session)) = self.sessions.remove(session_id) {
            info!(session = session_id, members = session.len(), "session cleared");
        }
    }

    /// Evict ledgers idle for longer than the stale threshold. Ledgers serving
    /// an active block are kept. Sessions are never touched.
    ///
    /// Returns the number of evicted ledgers.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let threshold = self.config.stale_threshold();
        let mut evicted = 0usize;

        self.actors.retain(|_, ledger| {
            let keep = !ledger.is_stale(now, threshold);
            if !keep {
                evicted += 1;
            }
            keep
        });

        if evicted > 0 {
            info!(evicted, remaining = self.actors.len(), "reclaimed idle actor ledgers");
        } else {
            debug!(remaining = self.actors.len(), "reclamation sweep found nothing idle");
        }
        evicted
    }

    /// Run [`sweep`](Self::sweep) every `sweep_interval` on the current tokio
    /// runtime. Calling it again while a sweeper is running is a no-op.
    ///
    /// # Panics
    /// If called outside a tokio runtime.
    pub fn start_sweeper(self: &Arc<Self>) {
        let mut slot = self.sweeper.lock().unwrap_or_else(|e| e.into_inner());
        if slot.as_ref().is_some_and(Sweeper::is_running) {
            return;
        }
        *slot = Some(Sweeper::spawn(
            Arc::downgrade(self),
            self.config.sweep_interval,
        ));
    }

    pub fn sweeper_running(&self) -> bool {
        self.sweeper
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(Sweeper::is_running)
    }

    /// Stop the sweeper and discard all ledgers and registries.
    pub fn destroy(&self) {
        let sweeper = self
            .sweeper
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        drop(sweeper);

        let actors = self.actors.len();
        let sessions = self.sessions.len();
        self.actors.clear();
        self.sessions.clear();
        info!(actors, sessions, "admission engine destroyed");
    }

    pub fn stats(&self) -> EngineStats {
        let now = self.clock.now();
        EngineStats {
            actors: self.actors.len(),
            blocked_actors: self
                .actors
                .iter()
                .filter(|l| l.block_remaining(now).is_some())
                .count(),
            sessions: self.sessions.len(),
            seated: self.sessions.iter().map(|s| s.len()).sum(),
        }
    }

    fn full_quota(&self) -> Verdict {
        Verdict::allow(self.config.max_per_window, Duration::ZERO)
    }
}

/// An empty key would let unrelated anonymous callers share state.
fn require_id(what: &str, id: &str) {
    assert!(!id.is_empty(), "{what} must not be empty");
}
