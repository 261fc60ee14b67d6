// crates/drop-engine/src/clock.rs

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Pending,
    Live,
    Ended,
}

/// Akhir window drop. Saturasi ke batas kalender chrono, tidak pernah panic.
pub fn window_end(drop_start: DateTime<Utc>, drop_duration: Duration) -> DateTime<Utc> {
    drop_start
        .checked_add_signed(drop_duration)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// PENDING sebelum start, LIVE selama [start, start + duration), ENDED setelahnya.
pub fn phase(now: DateTime<Utc>, drop_start: DateTime<Utc>, drop_duration: Duration) -> Phase {
    phase_until(now, drop_start, window_end(drop_start, drop_duration))
}

fn phase_until(now: DateTime<Utc>, drop_start: DateTime<Utc>, ends_at: DateTime<Utc>) -> Phase {
    if now < drop_start {
        Phase::Pending
    } else if now < ends_at {
        Phase::Live
    } else {
        Phase::Ended
    }
}

/// Sisa waktu menuju start, tidak pernah negatif. Hanya untuk countdown display.
pub fn time_remaining(now: DateTime<Utc>, drop_start: DateTime<Utc>) -> Duration {
    (drop_start - now).max(Duration::zero())
}

/// Jadwal drop. Tidak punya state selain jadwal itu sendiri; akhir window
/// dihitung sekali saat konstruksi.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DropClock {
    start: DateTime<Utc>,
    ends_at: DateTime<Utc>,
}

impl DropClock {
    pub fn new(start: DateTime<Utc>, duration: Duration) -> Self {
        Self::until(start, window_end(start, duration))
    }

    pub fn until(start: DateTime<Utc>, ends_at: DateTime<Utc>) -> Self {
        Self { start, ends_at }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn ends_at(&self) -> DateTime<Utc> {
        self.ends_at
    }

    pub fn phase(&self, now: DateTime<Utc>) -> Phase {
        phase_until(now, self.start, self.ends_at)
    }

    pub fn time_remaining(&self, now: DateTime<Utc>) -> Duration {
        time_remaining(now, self.start)
    }

    pub fn permits_share(&self, now: DateTime<Utc>) -> bool {
        self.phase(now) == Phase::Live
    }
}

// Sumber waktu di-inject ke processor supaya transisi fase bisa dites tanpa sleep.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Jam manual untuk test & simulasi.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_phase_boundaries() {
        let clock = DropClock::new(start(), Duration::hours(24));

        assert_eq!(clock.phase(start() - Duration::seconds(1)), Phase::Pending);
        assert_eq!(clock.phase(start()), Phase::Live);
        assert_eq!(clock.phase(clock.ends_at() - Duration::milliseconds(1)), Phase::Live);
        // Batas akhir eksklusif
        assert_eq!(clock.phase(clock.ends_at()), Phase::Ended);
        assert_eq!(clock.phase(clock.ends_at() + Duration::days(30)), Phase::Ended);
    }

    #[test]
    fn test_only_live_permits_share() {
        let clock = DropClock::new(start(), Duration::minutes(10));
        assert!(!clock.permits_share(start() - Duration::minutes(1)));
        assert!(clock.permits_share(start() + Duration::minutes(1)));
        assert!(!clock.permits_share(start() + Duration::minutes(11)));
    }

    #[test]
    fn test_time_remaining_never_negative() {
        let now = start() - Duration::seconds(90);
        assert_eq!(time_remaining(now, start()), Duration::seconds(90));
        assert_eq!(time_remaining(start(), start()), Duration::zero());
        assert_eq!(time_remaining(start() + Duration::hours(1), start()), Duration::zero());
    }

    #[test]
    fn test_huge_duration_saturates_instead_of_panicking() {
        let clock = DropClock::new(start(), Duration::MAX);
        assert_eq!(clock.ends_at(), DateTime::<Utc>::MAX_UTC);
        assert_eq!(clock.phase(start() + Duration::days(365 * 1000)), Phase::Live);
        assert_eq!(phase(start(), start(), Duration::MAX), Phase::Live);
    }

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(start());
        clock.advance(Duration::seconds(5));
        assert_eq!(clock.now(), start() + Duration::seconds(5));
        clock.set(start());
        assert_eq!(clock.now(), start());
    }
}
