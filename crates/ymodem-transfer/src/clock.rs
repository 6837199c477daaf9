//! Wall-clock deadline used to bound every blocking wait.

use std::time::{Duration, Instant};

/// A fixed duration measured from a captured start instant.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    duration: Duration,
}

impl Deadline {
    /// Start measuring `duration` from now.
    pub fn start(duration: Duration) -> Self {
        Self {
            started: Instant::now(),
            duration,
        }
    }

    /// Time left before expiry, zero once expired.
    pub fn remaining(&self) -> Duration {
        self.duration.saturating_sub(self.started.elapsed())
    }

    #[inline]
    pub fn is_expired(&self) -> bool {
        self.started.elapsed() >= self.duration
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_duration_is_expired_immediately() {
        let deadline = Deadline::start(Duration::ZERO);
        assert!(deadline.is_expired());
        assert_eq!(deadline.remaining(), Duration::ZERO);
    }

    #[test]
    fn expires_after_duration() {
        let deadline = Deadline::start(Duration::from_millis(20));
        assert!(!deadline.is_expired());
        assert!(deadline.remaining() <= Duration::from_millis(20));

        std::thread::sleep(Duration::from_millis(30));
        assert!(deadline.is_expired());
        assert!(deadline.elapsed() >= Duration::from_millis(30));
    }
}
