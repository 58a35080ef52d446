// Trailing-edge throttle used to rate-limit telemetry parsing.
// Invariants: at most one value is released per window, and it is the latest one offered.

use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct TrailingThrottle<T> {
    window: Duration,
    pending: Option<T>,
    deadline: Option<Instant>,
}

impl<T> TrailingThrottle<T> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
            deadline: None,
        }
    }

    /// Stores `value`, replacing anything not yet released. The first offer
    /// while idle opens a window ending at `now + window`.
    pub fn offer(&mut self, value: T, now: Instant) {
        if self.deadline.is_none() {
            self.deadline = Some(now + self.window);
        }
        self.pending = Some(value);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Releases the pending value once the window has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                self.pending.take()
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(100);

    #[test]
    fn burst_inside_window_releases_latest_once() {
        let start = Instant::now();
        let mut throttle = TrailingThrottle::new(WINDOW);

        for (offset_ms, value) in [(0, "a"), (10, "b"), (40, "c"), (99, "d")] {
            throttle.offer(value, start + Duration::from_millis(offset_ms));
            assert_eq!(throttle.poll(start + Duration::from_millis(offset_ms)), None);
        }

        assert_eq!(throttle.poll(start + WINDOW), Some("d"));
        assert_eq!(throttle.poll(start + WINDOW * 2), None);
        assert!(throttle.deadline().is_none());
    }

    #[test]
    fn window_is_anchored_at_first_offer() {
        let start = Instant::now();
        let mut throttle = TrailingThrottle::new(WINDOW);

        throttle.offer(1, start);
        throttle.offer(2, start + Duration::from_millis(80));
        assert_eq!(throttle.deadline(), Some(start + WINDOW));
    }

    #[test]
    fn next_offer_after_release_opens_new_window() {
        let start = Instant::now();
        let mut throttle = TrailingThrottle::new(WINDOW);

        throttle.offer(1, start);
        assert_eq!(throttle.poll(start + WINDOW), Some(1));

        let later = start + Duration::from_millis(250);
        throttle.offer(2, later);
        assert_eq!(throttle.poll(later + Duration::from_millis(50)), None);
        assert_eq!(throttle.poll(later + WINDOW), Some(2));
    }

    #[test]
    fn idle_throttle_releases_nothing() {
        let mut throttle: TrailingThrottle<u8> = TrailingThrottle::new(WINDOW);
        assert_eq!(throttle.poll(Instant::now()), None);
    }
}
