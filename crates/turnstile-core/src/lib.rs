//! Turnstile: in-memory admission control for live collaborative sessions.
//!
//! Answers one question per call: may this actor act right now, and if not,
//! when may it retry?
//!
//! - Per-actor sliding-window submission limits with violation escalation
//!   into temporary blocks.
//! - Per-session capacity limits with idempotent rejoin.
//! - A background sweep that reclaims idle actor state.
//!
//! State is process-local and not persisted.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use turnstile_core::{AdmissionConfig, AdmissionEngine};
//!
//! let engine = Arc::new(AdmissionEngine::new(AdmissionConfig::default())?);
//! engine.start_sweeper();
//!
//! let verdict = engine.check_submission("p1");
//! if !verdict.allowed {
//!     // reject, surfacing verdict.retry_after and verdict.message()
//! }
//! ```

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod session;
mod sweep;
pub mod verdict;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AdmissionConfig;
pub use engine::{AdmissionEngine, EngineStats};
pub use error::ConfigError;
pub use verdict::{reason_codes, DenyReason, Verdict};
