use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Monotonic clock shared by the simulation. All cast timers, movement
/// schedules and harvest durations compare against this, never against the
/// wall clock, so a host time jump cannot fire or stall timers.
#[derive(Debug, Clone, Copy)]
pub struct GameClock {
    start: Instant,
}

impl GameClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Seconds since process start.
    pub fn now_secs(&self) -> f32 {
        self.start.elapsed().as_secs_f32()
    }

    /// Milliseconds since process start.
    pub fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Default for GameClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Wall-clock milliseconds since the unix epoch. Only used for the lag
/// compensation fields (`serverRecvMs`/`serverSendMs`) that clients compare
/// against their own wall clock.
pub fn wall_clock_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_is_monotonic() {
        let clock = GameClock::new();
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a);
    }

    #[test]
    fn wall_clock_is_after_2020() {
        assert!(wall_clock_ms() > 1_577_836_800_000);
    }
}
