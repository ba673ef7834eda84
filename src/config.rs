//! Centralized runtime constants for the console.
//!
//! All tunable intervals, timeouts, and defaults are collected here so they can
//! be found and adjusted in a single place rather than scattered across modules.

use std::time::Duration;

use crate::error::AppError;

/// Default tick interval of the process access-control watchdog (seconds).
pub const DEFAULT_POLICY_INTERVAL_SECS: f64 = 10.0;

/// Default delay between two latency probes of the net-load job (seconds).
pub const DEFAULT_NETLOAD_INTERVAL_SECS: f64 = 0.3;

/// Number of echo requests sent by a single ping probe.
pub const PING_COUNT: u32 = 1;

/// Per-probe reply timeout handed to the system `ping` (seconds).
pub const PING_TIMEOUT_SECS: u64 = 2;

/// Number of most-terminated process names reported in the policy status.
pub const POLICY_TOP_TERMINATED_COUNT: usize = 5;

/// Log filter used when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "sysmgmt=info,sysmgmt_lib=info";

/// Convert a user-supplied interval in seconds into a `Duration`.
///
/// Zero, negative, NaN and infinite values are configuration errors and are
/// rejected before any job is constructed.
pub fn interval_from_secs(secs: f64) -> Result<Duration, AppError> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(AppError::InvalidInput(format!(
            "interval must be a positive number of seconds, got {secs}"
        )));
    }
    Duration::try_from_secs_f64(secs)
        .map_err(|e| AppError::InvalidInput(format!("interval {secs}s is out of range: {e}")))
}
