//! Daily fire-time scheduling.
//!
//! All times are UTC. There is no timezone or DST handling: the agent
//! fires once per day at `target_hour:00:00` UTC.

use chrono::{DateTime, Duration, NaiveTime, Utc};

/// Source of the current time. Swapped for a controllable clock in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Next instant strictly after `now` at `target_hour:00:00` UTC.
///
/// When `now` is at or past today's target, returns tomorrow's target.
/// Hours above 23 wrap modulo 24.
pub fn compute_next_fire_time(now: DateTime<Utc>, target_hour: u32) -> DateTime<Utc> {
    let time = NaiveTime::default() + Duration::hours(i64::from(target_hour % 24));
    let today = now.date_naive().and_time(time).and_utc();

    if now < today {
        today
    } else {
        today + Duration::days(1)
    }
}

/// How long to sleep from `now` until `fire_at`. Zero if already due.
pub fn time_until(now: DateTime<Utc>, fire_at: DateTime<Utc>) -> std::time::Duration {
    (fire_at - now).to_std().unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
