//! Attempt and wall-clock budget for one detection run

use std::time::{Duration, Instant};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 15;
pub const DEFAULT_MAX_DURATION: Duration = Duration::from_secs(90);

/// Trips once `max_attempts` parser trials have run or `max_duration` has
/// passed, whichever comes first. Created per run and dropped with it.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    attempts: u32,
    started: Instant,
    max_attempts: u32,
    max_duration: Duration,
}

impl CircuitBreaker {
    pub fn new(max_attempts: u32, max_duration: Duration) -> Self {
        Self {
            attempts: 0,
            started: Instant::now(),
            max_attempts,
            max_duration,
        }
    }

    /// Budget ending no later than `deadline`
    pub fn with_deadline(max_attempts: u32, max_duration: Duration, deadline: Instant) -> Self {
        let until_deadline = deadline.saturating_duration_since(Instant::now());
        Self::new(max_attempts, max_duration.min(until_deadline))
    }

    pub fn should_continue(&self) -> bool {
        self.attempts < self.max_attempts && self.elapsed() < self.max_duration
    }

    pub fn record_attempt(&mut self) {
        self.attempts += 1;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time left before the duration limit trips
    pub fn remaining(&self) -> Duration {
        self.max_duration.saturating_sub(self.elapsed())
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DURATION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trips_on_attempts() {
        let mut breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        for _ in 0..3 {
            assert!(breaker.should_continue());
            breaker.record_attempt();
        }
        assert!(!breaker.should_continue());
        assert_eq!(breaker.attempts(), 3);
    }

    #[test]
    fn test_trips_on_duration() {
        let breaker = CircuitBreaker::new(100, Duration::ZERO);
        assert!(!breaker.should_continue());
        assert_eq!(breaker.remaining(), Duration::ZERO);
    }

    #[test]
    fn test_deadline_shortens_budget() {
        let breaker =
            CircuitBreaker::with_deadline(10, Duration::from_secs(90), Instant::now() + Duration::from_secs(5));
        assert!(breaker.remaining() <= Duration::from_secs(5));
        assert!(breaker.should_continue());
    }

    #[test]
    fn test_defaults() {
        let breaker = CircuitBreaker::default();
        assert!(breaker.should_continue());
        assert!(breaker.remaining() > Duration::from_secs(89));
    }
}
