//! Wall clock anchored to the monotonic embassy timer

use embassy_time::Instant;

/// Unix time of 2020-01-01T00:00:00Z; anything earlier is an unsynchronized clock
pub const MIN_VALID_UNIX: u64 = 1_577_836_800;

/// Unix seconds derived from an SNTP sample and the time elapsed since it was taken
#[derive(Debug, Clone, Copy, Default)]
pub struct WallClock {
    anchor: Option<(u64, Instant)>,
}

impl WallClock {
    pub const fn new() -> Self {
        Self { anchor: None }
    }

    /// Record that it is `unix_secs` right now.
    /// Values before 2020 are rejected and leave the clock untouched.
    pub fn set_unix_time(&mut self, unix_secs: u64) -> bool {
        self.set_unix_time_at(unix_secs, Instant::now())
    }

    fn set_unix_time_at(&mut self, unix_secs: u64, at: Instant) -> bool {
        if unix_secs < MIN_VALID_UNIX {
            log::warn!("[TIME] Rejecting implausible unix time {}", unix_secs);
            return false;
        }
        self.anchor = Some((unix_secs, at));
        true
    }

    pub fn is_synchronized(&self) -> bool {
        self.anchor.is_some()
    }

    /// Current unix time, if synchronized
    pub fn unix_time(&self) -> Option<u64> {
        self.anchor
            .map(|(secs, at)| secs + Instant::now().saturating_duration_since(at).as_secs())
    }

    /// Unix time when synchronized, seconds since boot otherwise
    pub fn now_secs(&self) -> u64 {
        self.unix_time().unwrap_or_else(|| Instant::now().as_secs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_time::Duration;

    #[test]
    fn unsynchronized_clock_falls_back_to_uptime() {
        let clock = WallClock::new();
        assert!(!clock.is_synchronized());
        assert_eq!(clock.unix_time(), None);
        assert!(clock.now_secs() < MIN_VALID_UNIX);
    }

    #[test]
    fn rejects_pre_2020_time() {
        let mut clock = WallClock::new();
        assert!(!clock.set_unix_time(1_000));
        assert!(!clock.is_synchronized());
    }

    #[test]
    fn elapsed_time_is_added_to_anchor() {
        let mut clock = WallClock::new();
        let earlier = Instant::now()
            .checked_sub(Duration::from_secs(5))
            .unwrap_or(Instant::from_ticks(0));
        assert!(clock.set_unix_time_at(1_700_000_000, earlier));
        let now = clock.unix_time().unwrap();
        assert!((1_700_000_000..=1_700_000_006).contains(&now));
    }
}
