//! `mftb`: reads a monotonic 50 MHz guest tick counter driven by the host's monotonic clock,
//! scaled to guest ticks.
use std::time::Instant;

/// The guest timebase frequency, per the Xbox 360's fixed 50 MHz decrementer/timebase clock.
pub const GUEST_TIMEBASE_HZ: u64 = 50_000_000;

/// A guest-tick clock anchored at the moment it was created, typically process/thread start.
pub struct Timebase {
    epoch: Instant,
}

impl Timebase {
    /// Anchors a new timebase at the current instant.
    pub fn new() -> Self {
        Timebase { epoch: Instant::now() }
    }

    /// Reads the elapsed time since this timebase's epoch, scaled to 50 MHz guest ticks, as
    /// `mftb` would.
    pub fn ticks(&self) -> u64 {
        let elapsed = self.epoch.elapsed();
        let nanos = elapsed.as_secs() * 1_000_000_000 + elapsed.subsec_nanos() as u64;
        nanos.saturating_mul(GUEST_TIMEBASE_HZ) / 1_000_000_000
    }
}

impl Default for Timebase {
    fn default() -> Self {
        Self::new()
    }
}

thread_local! {
    static THREAD_TIMEBASE: Timebase = Timebase::new();
}

/// Reads the calling thread's guest timebase, as an emitted `mftb` compiles to. Each guest thread
/// gets its own epoch, matching a real `mftb`'s monotonic-but-not-globally-synchronized behavior
/// closely enough for the scaling this crate models.
pub fn read_ticks() -> u64 {
    THREAD_TIMEBASE.with(|tb| tb.ticks())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn ticks_advance_monotonically() {
        let tb = Timebase::new();
        let a = tb.ticks();
        sleep(Duration::from_millis(5));
        let b = tb.ticks();
        assert!(b >= a);
    }
}
