//! Per-source sliding-window attempt limiter.
//!
//! Every authentication attempt that gets past the limiter counts, whether
//! it later succeeds or fails. An attempt stops counting once its age
//! reaches the window length. Blocked attempts are not recorded, so a
//! source hammering the endpoint is released on schedule.

use crate::config::RateLimitPolicy;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Outcome of [`AttemptLimiter::check_and_record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Attempt recorded.
    Allowed {
        /// Attempts left in the current window after this one.
        remaining: usize,
    },
    /// Limit reached; nothing recorded.
    Blocked {
        /// Seconds until the oldest counted attempt leaves the window.
        retry_after_seconds: u64,
    },
}

impl RateDecision {
    /// Whether the attempt may proceed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }
}

/// Sliding-window limiter keyed by source address.
#[derive(Debug)]
pub struct AttemptLimiter {
    max_attempts: usize,
    window_millis: i64,
    windows: Mutex<HashMap<IpAddr, VecDeque<DateTime<Utc>>>>,
}

impl AttemptLimiter {
    /// Create a limiter for `policy`.
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            max_attempts: policy.max_attempts,
            window_millis: i64::try_from(policy.window.as_millis()).unwrap_or(i64::MAX),
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Count an attempt from `ip` at `now`, unless the window is full.
    ///
    /// Check and record happen under one lock, so concurrent attempts from
    /// the same source cannot overshoot the limit.
    pub fn check_and_record(&self, ip: IpAddr, now: DateTime<Utc>) -> RateDecision {
        let mut windows = self.lock();
        let attempts = windows.entry(ip).or_default();
        self.prune(attempts, now);

        if attempts.len() >= self.max_attempts {
            let retry_after_seconds = attempts
                .front()
                .map(|oldest| self.retry_after(*oldest, now))
                .unwrap_or(1);
            return RateDecision::Blocked {
                retry_after_seconds,
            };
        }

        attempts.push_back(now);
        RateDecision::Allowed {
            remaining: self.max_attempts - attempts.len(),
        }
    }

    /// Attempts from `ip` still inside the window at `now`.
    pub fn attempts_in_window(&self, ip: IpAddr, now: DateTime<Utc>) -> usize {
        let windows = self.lock();
        windows.get(&ip).map_or(0, |attempts| {
            attempts
                .iter()
                .filter(|at| self.age_millis(**at, now) < self.window_millis)
                .count()
        })
    }

    /// Drop expired attempts and forget sources with none left.
    ///
    /// Returns how many sources were forgotten.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut windows = self.lock();
        let before = windows.len();
        windows.retain(|_, attempts| {
            self.prune(attempts, now);
            !attempts.is_empty()
        });
        before - windows.len()
    }

    /// Sources currently tracked.
    pub fn tracked_sources(&self) -> usize {
        self.lock().len()
    }

    fn prune(&self, attempts: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>) {
        while let Some(oldest) = attempts.front() {
            if self.age_millis(*oldest, now) >= self.window_millis {
                attempts.pop_front();
            } else {
                break;
            }
        }
    }

    fn age_millis(&self, at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
        now.signed_duration_since(at).num_milliseconds()
    }

    fn retry_after(&self, oldest: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
        let remaining = self.window_millis.saturating_sub(self.age_millis(oldest, now));
        let seconds = (remaining.max(0) as u64).div_ceil(1000);
        seconds.max(1)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<IpAddr, VecDeque<DateTime<Utc>>>> {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
