//! Exit codes for the `turnstile` binary. Part of the public contract.

pub const SUCCESS: i32 = 0;
pub const DENIED: i32 = 1; // Replay observed a denial and --fail-on-deny was set
pub const CONFIG_ERROR: i32 = 2; // Invalid config/scenario or unreadable file
