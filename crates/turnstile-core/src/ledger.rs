//! Per-actor submission ledger: sliding window, violation escalation, and
//! temporary blocks.
//!
//! Timestamps are appended at the back and pruned from the front, so the
//! deque stays time-ordered and pruning is amortized O(1). An action leaves
//! the window exactly `window` after it was recorded.

use crate::clock::saturating_add;
use crate::config::AdmissionConfig;
use crate::verdict::{DenyReason, Verdict};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct ActorLedger {
    recent_actions: VecDeque<Instant>,
    violation_count: u32,
    blocked_until: Option<Instant>,
    last_activity: Instant,
}

impl ActorLedger {
    pub fn new(now: Instant) -> Self {
        Self {
            recent_actions: VecDeque::new(),
            violation_count: 0,
            blocked_until: None,
            last_activity: now,
        }
    }

    /// Record an attempted submission and decide it.
    pub fn check(&mut self, now: Instant, cfg: &AdmissionConfig) -> Verdict {
        self.last_activity = now;

        if let Some(left) = self.block_remaining(now) {
            return Verdict::deny(DenyReason::TemporarilyBlocked, Some(left));
        }
        // Lazily drop an expired block.
        self.blocked_until = None;

        self.prune(now, cfg.window);

        if self.recent_actions.len() < cfg.max_per_window as usize {
            self.recent_actions.push_back(now);
            let remaining = cfg.max_per_window - self.recent_actions.len() as u32;
            return Verdict::allow(remaining, self.reset_in(now, cfg.window));
        }

        self.violation_count += 1;
        if self.violation_count >= cfg.max_violations {
            self.blocked_until = Some(saturating_add(now, cfg.block_duration));
            self.violation_count = 0;
            return Verdict::deny(
                DenyReason::BlockImposed {
                    block: cfg.block_duration,
                },
                Some(cfg.block_duration),
            );
        }

        Verdict::deny(
            DenyReason::RateLimited,
            Some(self.reset_in(now, cfg.window)),
        )
    }

    /// Same decision as [`check`](Self::check) without recording anything.
    /// An allowed status reports the quota left before consuming.
    pub fn peek(&self, now: Instant, cfg: &AdmissionConfig) -> Verdict {
        if let Some(left) = self.block_remaining(now) {
            return Verdict::deny(DenyReason::TemporarilyBlocked, Some(left));
        }

        let mut live = self
            .recent_actions
            .iter()
            .filter(|t| now.saturating_duration_since(**t) < cfg.window);
        let oldest = live.next();
        let count = oldest.map_or(0, |_| 1 + live.count());
        let reset_in = oldest.map_or(Duration::ZERO, |t| until_expiry(now, *t, cfg.window));

        if count < cfg.max_per_window as usize {
            Verdict::allow(cfg.max_per_window - count as u32, reset_in)
        } else {
            Verdict::deny(DenyReason::RateLimited, Some(reset_in))
        }
    }

    /// Time left on an active block, or `None` if not blocked at `now`.
    pub fn block_remaining(&self, now: Instant) -> Option<Duration> {
        self.blocked_until
            .filter(|until| *until > now)
            .map(|until| until - now)
    }

    /// Idle past `threshold` and not serving an active block.
    pub fn is_stale(&self, now: Instant, threshold: Duration) -> bool {
        self.block_remaining(now).is_none()
            && now.saturating_duration_since(self.last_activity) > threshold
    }

    pub fn violation_count(&self) -> u32 {
        self.violation_count
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(front) = self.recent_actions.front() {
            if now.saturating_duration_since(*front) >= window {
                self.recent_actions.pop_front();
            } else {
                break;
            }
        }
    }

    fn reset_in(&self, now: Instant, window: Duration) -> Duration {
        self.recent_actions
            .front()
            .map_or(Duration::ZERO, |oldest| until_expiry(now, *oldest, window))
    }
}

fn until_expiry(now: Instant, at: Instant, window: Duration) -> Duration {
    window.saturating_sub(now.saturating_duration_since(at))
}
