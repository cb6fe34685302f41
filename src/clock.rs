//! Clock - Current Time Source
//!
//! TigerStyle: All time reads go through an injectable clock.
//!
//! `SystemClock` is used in production. `ManualClock` only moves when told
//! to, so ordering tests never depend on wall-clock resolution.

use chrono::{DateTime, TimeZone, Utc};
use std::fmt::Debug;
use std::sync::atomic::{AtomicI64, Ordering};

// =============================================================================
// TigerStyle Constants
// =============================================================================

/// Maximum single advance of a manual clock (one day)
pub const MANUAL_ADVANCE_MS_MAX: i64 = 24 * 60 * 60 * 1000;

/// Default start of a manual clock: 2024-01-01T00:00:00Z
pub const MANUAL_START_MS_DEFAULT: i64 = 1_704_067_200_000;

// =============================================================================
// Clock
// =============================================================================

/// Source of the current time
pub trait Clock: Send + Sync + Debug {
    /// Current time in UTC.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A controllable clock for deterministic tests.
///
/// - Time only moves forward
/// - All time operations are explicit
#[derive(Debug)]
pub struct ManualClock {
    /// Current time in milliseconds since epoch
    current_ms: AtomicI64,
}

impl ManualClock {
    /// Create a clock at `MANUAL_START_MS_DEFAULT`.
    pub fn new() -> Self {
        Self::at_ms(MANUAL_START_MS_DEFAULT)
    }

    /// Create a clock starting at the given time.
    pub fn at_ms(start_ms: i64) -> Self {
        assert!(start_ms >= 0, "start_ms must be non-negative, got {}", start_ms);
        Self {
            current_ms: AtomicI64::new(start_ms),
        }
    }

    /// Get current time in milliseconds.
    pub fn now_ms(&self) -> i64 {
        self.current_ms.load(Ordering::SeqCst)
    }

    /// Advance time by the given milliseconds.
    ///
    /// # Panics
    /// Panics if ms is negative or exceeds MANUAL_ADVANCE_MS_MAX.
    ///
    /// # Returns
    /// The new current time.
    pub fn advance_ms(&self, ms: i64) -> i64 {
        assert!(
            (0..=MANUAL_ADVANCE_MS_MAX).contains(&ms),
            "advance_ms({}) outside [0, {}]",
            ms,
            MANUAL_ADVANCE_MS_MAX
        );

        let old_time = self.current_ms.fetch_add(ms, Ordering::SeqCst);
        old_time + ms
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.now_ms())
            .single()
            .unwrap_or_default()
    }
}
