//! Simulation clock utility: wall-clock gaps to bounded simulated seconds.
//!
//! A vault that was offline (or simply between scheduler cycles) is
//! credited with the real time that passed, capped so a long absence never
//! produces an unbounded simulation jump. These are pure functions with no
//! I/O or side effects -- the unit boundary for time-travel tests.
//!
//! # Design Principles
//!
//! - Elapsed time is always within `[0, max_catchup_seconds]`.
//! - A wall clock that moved backwards (skew, NTP step) yields 0 elapsed
//!   seconds rather than an error; the caller's tick proceeds and
//!   re-anchors `last_tick_time`.

use chrono::{DateTime, Utc};
use tracing::debug;

/// Convert the gap between `last_tick_time` and `now` into simulated
/// seconds, clamped to `[0, max_catchup_seconds]`.
///
/// Never returns a negative value: if `now` is earlier than
/// `last_tick_time` the gap is treated as zero and logged at debug level
/// (clock skew is expected operational noise, not an error).
pub fn elapsed_seconds(
    last_tick_time: DateTime<Utc>,
    now: DateTime<Utc>,
    max_catchup_seconds: u64,
) -> u64 {
    let raw = now.signed_duration_since(last_tick_time).num_seconds();

    if raw < 0 {
        debug!(
            last_tick_time = %last_tick_time,
            now = %now,
            skew_seconds = raw,
            "Clock moved backwards, clamping elapsed time to 0"
        );
        return 0;
    }

    let raw_u64 = u64::try_from(raw).unwrap_or(u64::MAX);
    raw_u64.min(max_catchup_seconds)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    /// Default offline catch-up cap used in tests (one hour).
    const CAP: u64 = 3600;

    #[test]
    fn normal_interval_passes_through() {
        let last = Utc::now();
        let now = last + Duration::seconds(60);
        assert_eq!(elapsed_seconds(last, now, CAP), 60);
    }

    #[test]
    fn zero_gap_is_zero() {
        let last = Utc::now();
        assert_eq!(elapsed_seconds(last, last, CAP), 0);
    }

    #[test]
    fn long_offline_gap_clamps_to_cap() {
        let last = Utc::now();
        // Two days offline: elapsed must equal the cap, not the raw gap.
        let now = last + Duration::days(2);
        assert_eq!(elapsed_seconds(last, now, CAP), CAP);
    }

    #[test]
    fn gap_just_over_cap_clamps_to_cap() {
        let last = Utc::now();
        let now = last + Duration::seconds(i64::try_from(CAP).unwrap_or(i64::MAX) + 1);
        assert_eq!(elapsed_seconds(last, now, CAP), CAP);
    }

    #[test]
    fn gap_at_cap_is_exact() {
        let last = Utc::now();
        let now = last + Duration::seconds(i64::try_from(CAP).unwrap_or(i64::MAX));
        assert_eq!(elapsed_seconds(last, now, CAP), CAP);
    }

    #[test]
    fn backwards_clock_is_zero() {
        let last = Utc::now();
        let now = last - Duration::seconds(120);
        assert_eq!(elapsed_seconds(last, now, CAP), 0);
    }

    #[test]
    fn sub_second_gap_floors_to_zero() {
        let last = Utc::now();
        let now = last + Duration::milliseconds(900);
        assert_eq!(elapsed_seconds(last, now, CAP), 0);
    }

    #[test]
    fn zero_cap_always_zero() {
        let last = Utc::now();
        let now = last + Duration::seconds(500);
        assert_eq!(elapsed_seconds(last, now, 0), 0);
    }
}
