//! Shared rate limiter for outbound API calls
//!
//! Every remote call goes through [`RateLimiter::acquire`]. The limiter keeps
//! a log of recent call instants per window and admits a call only when every
//! window has room, so at most `max_calls` calls start within any span of
//! `period`. Waiters queue on a fair tokio mutex, which gives FIFO admission.

use crate::config::RateLimitWindow;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// A single sliding window
#[derive(Debug)]
struct Window {
    max_calls: usize,
    period: Duration,
    calls: VecDeque<Instant>,
}

impl Window {
    fn new(max_calls: u32, period: Duration) -> Self {
        Self {
            max_calls: max_calls.max(1) as usize,
            period,
            calls: VecDeque::new(),
        }
    }

    /// Drops call instants that have left the window
    fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.calls.front() {
            if now.duration_since(oldest) >= self.period {
                self.calls.pop_front();
            } else {
                break;
            }
        }
    }

    /// Time until one more call fits, or `None` if it fits now
    fn time_until_slot(&self, now: Instant) -> Option<Duration> {
        if self.calls.len() < self.max_calls {
            return None;
        }
        // The slot frees when the oldest call that must expire leaves the window
        let blocking = self.calls[self.calls.len() - self.max_calls];
        Some((blocking + self.period).saturating_duration_since(now))
    }
}

/// Rate limiter shared by all workers
#[derive(Debug)]
pub struct RateLimiter {
    windows: Mutex<Vec<Window>>,
}

impl RateLimiter {
    /// Creates a limiter enforcing every given window at once
    pub fn new(windows: &[RateLimitWindow]) -> Self {
        let windows = windows
            .iter()
            .map(|w| Window::new(w.max_calls, Duration::from_secs(w.window_secs)))
            .collect();

        Self {
            windows: Mutex::new(windows),
        }
    }

    /// Creates a limiter with a single window of `max_calls` per `period`
    pub fn with_period(max_calls: u32, period: Duration) -> Self {
        Self {
            windows: Mutex::new(vec![Window::new(max_calls, period)]),
        }
    }

    /// Creates a limiter that never blocks
    pub fn unlimited() -> Self {
        Self {
            windows: Mutex::new(Vec::new()),
        }
    }

    /// Waits until one remote call may be issued, then records it
    ///
    /// The lock is held while sleeping so later callers cannot overtake the
    /// one at the head of the queue.
    pub async fn acquire(&self) {
        let mut windows = self.windows.lock().await;

        loop {
            let now = Instant::now();
            let mut wait = Duration::ZERO;

            for window in windows.iter_mut() {
                window.prune(now);
                if let Some(until) = window.time_until_slot(now) {
                    wait = wait.max(until);
                }
            }

            if wait.is_zero() {
                for window in windows.iter_mut() {
                    window.calls.push_back(now);
                }
                return;
            }

            tracing::debug!("Rate limit reached, waiting {:?}", wait);
            tokio::time::sleep(wait).await;
        }
    }

    /// Number of calls currently counted against the most loaded window
    #[cfg(test)]
    async fn in_flight_window_calls(&self) -> usize {
        let mut windows = self.windows.lock().await;
        let now = Instant::now();
        windows
            .iter_mut()
            .map(|w| {
                w.prune(now);
                w.calls.len()
            })
            .max()
            .unwrap_or(0)
    }
}
