//! Rate limiting for the unauthenticated packet hooks.
//!
//! The engine itself never throttles; it only consults
//! [`Handler::permit`](crate::Handler::permit) before processing INIT and
//! HEARTBEAT. This module provides a ready-made sliding-window limiter a
//! host can keep inside its handler to answer that question without
//! storing excessive state.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

/// Rate limiter using sliding window counters, one per peer IP.
pub struct RateLimiter {
    counters: HashMap<IpAddr, WindowCounter>,
    max_requests: u32,
    window: Duration,
    last_cleanup: Instant,
}

/// Sliding window counter for a single IP.
struct WindowCounter {
    current: u32,
    previous: u32,
    window_start: Instant,
}

impl WindowCounter {
    fn new() -> Self {
        Self {
            current: 0,
            previous: 0,
            window_start: Instant::now(),
        }
    }

    /// Get the estimated count using the sliding window.
    fn get(&mut self, window: Duration) -> u32 {
        let now = Instant::now();
        let elapsed = now.duration_since(self.window_start);

        if elapsed >= window * 2 {
            self.current = 0;
            self.previous = 0;
            self.window_start = now;
        } else if elapsed >= window {
            self.previous = self.current;
            self.current = 0;
            self.window_start = now;
        }

        // Weight the previous window by how much of it still overlaps
        let weight = (elapsed.as_secs_f64() / window.as_secs_f64()).min(1.0);
        let estimate = (self.previous as f64 * (1.0 - weight)) + self.current as f64;
        estimate.ceil() as u32
    }

    fn increment(&mut self, window: Duration) {
        let now = Instant::now();
        if now.duration_since(self.window_start) >= window {
            self.previous = self.current;
            self.current = 1;
            self.window_start = now;
        } else {
            self.current += 1;
        }
    }
}

impl RateLimiter {
    /// Create a limiter allowing `max_requests` per `window` per IP.
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            counters: HashMap::new(),
            max_requests,
            window,
            last_cleanup: Instant::now(),
        }
    }

    /// Check whether a request from this IP is allowed, counting it if so.
    pub fn check(&mut self, ip: &IpAddr) -> bool {
        self.maybe_cleanup();

        let window = self.window;
        let counter = self.counters.entry(*ip).or_insert_with(WindowCounter::new);
        if counter.get(window) >= self.max_requests {
            false
        } else {
            counter.increment(window);
            true
        }
    }

    /// Get the current estimated request count for an IP.
    pub fn current_count(&mut self, ip: &IpAddr) -> u32 {
        let window = self.window;
        match self.counters.get_mut(ip) {
            Some(counter) => counter.get(window),
            None => 0,
        }
    }

    /// Forget an IP's history.
    pub fn reset(&mut self, ip: &IpAddr) {
        self.counters.remove(ip);
    }

    /// Number of IPs currently tracked.
    pub fn tracked_count(&self) -> usize {
        self.counters.len()
    }

    fn maybe_cleanup(&mut self) {
        let now = Instant::now();
        if now.duration_since(self.last_cleanup) > self.window * 2 {
            let horizon = self.window * 3;
            self.counters
                .retain(|_, counter| now.duration_since(counter.window_start) < horizon);
            self.last_cleanup = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limiter_allows_under_limit() {
        let mut limiter = RateLimiter::new(10, Duration::from_secs(1));
        let ip: IpAddr = "192.168.1.1".parse().unwrap();

        for _ in 0..10 {
            assert!(limiter.check(&ip));
        }
    }

    #[test]
    fn test_rate_limiter_blocks_over_limit() {
        let mut limiter = RateLimiter::new(5, Duration::from_secs(1));
        let ip: IpAddr = "192.168.1.1".parse().unwrap();

        for _ in 0..5 {
            assert!(limiter.check(&ip));
        }

        assert!(!limiter.check(&ip));
    }

    #[test]
    fn test_rate_limiter_different_ips() {
        let mut limiter = RateLimiter::new(2, Duration::from_secs(1));
        let ip1: IpAddr = "192.168.1.1".parse().unwrap();
        let ip2: IpAddr = "192.168.1.2".parse().unwrap();

        assert!(limiter.check(&ip1));
        assert!(limiter.check(&ip1));
        assert!(!limiter.check(&ip1));

        // A different peer gets its own budget
        assert!(limiter.check(&ip2));
        assert!(limiter.check(&ip2));
        assert!(!limiter.check(&ip2));
    }

    #[test]
    fn test_rate_limiter_reset() {
        let mut limiter = RateLimiter::new(2, Duration::from_secs(1));
        let ip: IpAddr = "192.168.1.1".parse().unwrap();

        assert!(limiter.check(&ip));
        assert!(limiter.check(&ip));
        assert!(!limiter.check(&ip));

        limiter.reset(&ip);
        assert!(limiter.check(&ip));
    }

    #[test]
    fn test_current_count_tracks_checks() {
        let mut limiter = RateLimiter::new(10, Duration::from_secs(10));
        let ip: IpAddr = "10.0.0.1".parse().unwrap();

        assert_eq!(limiter.current_count(&ip), 0);
        limiter.check(&ip);
        limiter.check(&ip);
        assert_eq!(limiter.current_count(&ip), 2);
        assert_eq!(limiter.tracked_count(), 1);
    }
}
