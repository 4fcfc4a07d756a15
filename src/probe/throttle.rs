use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

/// Scan-wide pacing gate shared by every outbound request.
///
/// Grants are spaced at least `interval` apart. Waiters queue on a FIFO
/// mutex, so a burst of concurrent callers is served in arrival order and
/// nobody starves.
pub struct RateLimiter {
    interval: Duration,
    next_slot: Mutex<Instant>,
    granted: AtomicU64,
}

impl RateLimiter {
    /// No more than `per_second` grants in any one-second window.
    pub fn per_second(per_second: u32) -> Self {
        let n = u64::from(per_second.max(1));
        // round up so that `n * interval` never falls short of one second
        let interval = Duration::from_nanos((1_000_000_000 + n - 1) / n);
        Self::with_interval(interval)
    }

    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(Instant::now()),
            granted: AtomicU64::new(0),
        }
    }

    pub fn unlimited() -> Self {
        Self::with_interval(Duration::ZERO)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait for the next slot. Never fails.
    pub async fn acquire(&self) {
        let mut next = self.next_slot.lock().await;
        let now = Instant::now();
        let slot = if *next > now { *next } else { now };
        if slot > now {
            sleep_until(slot).await;
        }
        *next = slot + self.interval;
        self.granted.fetch_add(1, Ordering::Relaxed);
    }

    /// Push the next grant back by `pause` (e.g. after an HTTP 429).
    pub async fn cool_down(&self, pause: Duration) {
        let mut next = self.next_slot.lock().await;
        let candidate = Instant::now() + pause;
        if candidate > *next {
            tracing::debug!(pause_ms = pause.as_millis() as u64, "rate limiter cooling down");
            *next = candidate;
        }
    }

    pub fn granted(&self) -> u64 {
        self.granted.load(Ordering::Relaxed)
    }
}
