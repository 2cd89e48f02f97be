//! Admission rate limiting for handler starts
//!
//! A virtual-schedule (GCRA) limiter: each `acquire` reserves the next start
//! slot under a short lock and then sleeps until that slot. Only starts are
//! limited; in-flight work is bounded separately by the orchestrator.

use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Bounds how many handler invocations may start per second
#[derive(Debug)]
pub struct AdmissionLimiter {
    /// Spacing between starts; `None` disables throttling
    interval: Option<Duration>,
    /// How far ahead of schedule a start may run (burst headroom)
    tolerance: Duration,
    /// Theoretical arrival time of the next start
    next_start: Mutex<Instant>,
}

impl AdmissionLimiter {
    /// `rate_per_sec == 0` disables throttling. `burst` is clamped to at least 1.
    pub fn new(rate_per_sec: u32, burst: u32) -> Self {
        let interval = (rate_per_sec > 0).then(|| Duration::from_nanos(1_000_000_000 / u64::from(rate_per_sec)));
        let tolerance = interval.map_or(Duration::ZERO, |i| i * burst.max(1).saturating_sub(1));
        Self {
            interval,
            tolerance,
            next_start: Mutex::new(Instant::now()),
        }
    }

    /// Limiter that admits everything immediately
    pub fn unlimited() -> Self {
        Self::new(0, 1)
    }

    pub fn is_unlimited(&self) -> bool {
        self.interval.is_none()
    }

    /// Wait until a start is admitted. Never fails.
    pub async fn acquire(&self) {
        let Some(interval) = self.interval else {
            return;
        };

        let slot = {
            let mut next_start = self.next_start.lock().unwrap();
            let now = Instant::now();
            let base = (*next_start).max(now);
            *next_start = base + interval;
            base.checked_sub(self.tolerance).map_or(now, |slot| slot.max(now))
        };

        if slot > Instant::now() {
            tokio::time::sleep_until(slot).await;
        }
    }
}
