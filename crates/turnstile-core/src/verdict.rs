//! Admission verdicts.
//!
//! A denial is a normal outcome, not an error. Callers translate
//! `allowed == false` into a rejection carrying [`Verdict::retry_after`] and
//! the reason message.

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::fmt;
use std::time::Duration;

/// Machine-readable reason codes.
pub mod reason_codes {
    pub const RATE_LIMITED: &str = "RATE_LIMITED";
    pub const TEMPORARILY_BLOCKED: &str = "TEMPORARILY_BLOCKED";
    pub const BLOCK_IMPOSED: &str = "BLOCK_IMPOSED";
    pub const SESSION_FULL: &str = "SESSION_FULL";
}

/// Why a check was denied. The `Display` strings are the stable contract
/// callers match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// The actor is at its window limit.
    RateLimited,
    /// A previously imposed block has not yet expired.
    TemporarilyBlocked,
    /// This attempt crossed the violation threshold and started a block.
    BlockImposed { block: Duration },
    /// The session is at capacity.
    SessionFull,
}

impl DenyReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::RateLimited => reason_codes::RATE_LIMITED,
            Self::TemporarilyBlocked => reason_codes::TEMPORARILY_BLOCKED,
            Self::BlockImposed { .. } => reason_codes::BLOCK_IMPOSED,
            Self::SessionFull => reason_codes::SESSION_FULL,
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimited => f.write_str("rate limit exceeded"),
            Self::TemporarilyBlocked => f.write_str("temporary block"),
            Self::BlockImposed { block } => write!(
                f,
                "too many violations, blocked for {}",
                humantime::format_duration(*block)
            ),
            Self::SessionFull => f.write_str("session has reached maximum capacity"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub allowed: bool,
    /// Quota left after this check (submissions) or free seats (joins).
    pub remaining: u32,
    /// Time until the oldest counted action leaves the window. Zero when
    /// nothing is counted or for session verdicts. On a denial it mirrors
    /// `retry_after`, so for a blocked actor it is the time left on the block.
    pub reset_in: Duration,
    /// Set on denials: how long the caller should wait before retrying.
    pub retry_after: Option<Duration>,
    pub reason: Option<DenyReason>,
}

impl Verdict {
    pub fn allow(remaining: u32, reset_in: Duration) -> Self {
        Self {
            allowed: true,
            remaining,
            reset_in,
            retry_after: None,
            reason: None,
        }
    }

    pub fn deny(reason: DenyReason, retry_after: Option<Duration>) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            reset_in: retry_after.unwrap_or(Duration::ZERO),
            retry_after,
            reason: Some(reason),
        }
    }

    /// Human-readable reason, if denied.
    pub fn message(&self) -> Option<String> {
        self.reason.map(|r| r.to_string())
    }

    pub fn is_denied(&self) -> bool {
        !self.allowed
    }
}

impl Serialize for Verdict {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Verdict", 6)?;
        s.serialize_field("allowed", &self.allowed)?;
        s.serialize_field("remaining", &self.remaining)?;
        s.serialize_field("reset_in_ms", &duration_ms(self.reset_in))?;
        s.serialize_field("retry_after_ms", &self.retry_after.map(duration_ms))?;
        s.serialize_field("reason", &self.message())?;
        s.serialize_field("reason_code", &self.reason.map(|r| r.code()))?;
        s.end()
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_strings_are_stable() {
        assert_eq!(DenyReason::RateLimited.to_string(), "rate limit exceeded");
        assert_eq!(DenyReason::TemporarilyBlocked.to_string(), "temporary block");
        assert_eq!(
            DenyReason::SessionFull.to_string(),
            "session has reached maximum capacity"
        );
        let imposed = DenyReason::BlockImposed {
            block: Duration::from_secs(300),
        };
        assert_eq!(imposed.to_string(), "too many violations, blocked for 5m");
    }

    #[test]
    fn serializes_to_flat_json() {
        let v = Verdict::deny(DenyReason::RateLimited, Some(Duration::from_millis(1500)));
        let json = serde_json::to_value(&v).unwrap();

        assert_eq!(json["allowed"], false);
        assert_eq!(json["remaining"], 0);
        assert_eq!(json["retry_after_ms"], 1500);
        assert_eq!(json["reason"], "rate limit exceeded");
        assert_eq!(json["reason_code"], "RATE_LIMITED");

        let ok = serde_json::to_value(Verdict::allow(3, Duration::from_secs(2))).unwrap();
        assert_eq!(ok["reset_in_ms"], 2000);
        assert!(ok["retry_after_ms"].is_null());
        assert!(ok["reason"].is_null());
    }

    #[test]
    fn denial_reset_in_mirrors_retry_after() {
        let left = Duration::from_secs(240);
        let v = Verdict::deny(DenyReason::TemporarilyBlocked, Some(left));
        assert_eq!(v.reset_in, left);

        let full = Verdict::deny(DenyReason::SessionFull, None);
        assert_eq!(full.reset_in, Duration::ZERO);
    }
}
