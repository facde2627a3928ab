/*!
 * Core Types
 * Common types and clock helpers used across the instrumentation core
 */

use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Epoch timestamp in milliseconds
pub type TimestampMs = u64;

/// Duration in milliseconds
pub type DurationMs = f64;

/// Caller-supplied cumulative garbage collection time in milliseconds
pub type GcDurationMs = f64;

/// Current wall-clock time in milliseconds since epoch
#[inline]
pub fn now_epoch_ms() -> TimestampMs {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as TimestampMs)
        .unwrap_or(0)
}

/// Milliseconds elapsed since a monotonic reference point
#[inline]
pub fn elapsed_ms(since: Instant) -> DurationMs {
    since.elapsed().as_secs_f64() * 1_000.0
}
