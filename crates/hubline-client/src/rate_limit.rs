//! # Rate Limiter
//!
//! Local admission control with two overlapping fixed windows.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Two-Window Admission                                 │
//! │                                                                         │
//! │   minute window  [started_at ─────── +60s)   count ≤ per_minute        │
//! │   hour window    [started_at ─────────────────────── +3600s)           │
//! │                                               count ≤ per_hour         │
//! │                                                                         │
//! │   admit  ⇔  minute.count < per_minute  AND  hour.count < per_hour      │
//! │   admit  ⇒  minute.count += 1  AND  hour.count += 1                    │
//! │                                                                         │
//! │   saturated → wait until the later of the saturated windows resets,   │
//! │               bounded by max_wait, else RateLimited                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Clock-taking `*_at` variants keep the window arithmetic testable without
//! sleeping.

use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{ClientError, ClientResult};

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3600);

// =============================================================================
// Window
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct Window {
    span: Duration,
    limit: u32,
    started_at: Instant,
    count: u32,
}

impl Window {
    fn new(span: Duration, limit: u32, now: Instant) -> Self {
        Window {
            span,
            limit,
            started_at: now,
            count: 0,
        }
    }

    /// Starts a new window once the current one has run its span.
    fn roll(&mut self, now: Instant) {
        if now.saturating_duration_since(self.started_at) >= self.span {
            self.started_at = now;
            self.count = 0;
        }
    }

    fn has_capacity(&self) -> bool {
        self.count < self.limit
    }

    fn resets_in(&self, now: Instant) -> Duration {
        (self.started_at + self.span).saturating_duration_since(now)
    }
}

// =============================================================================
// Admission
// =============================================================================

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    /// Saturated; capacity returns after this long.
    Wait(Duration),
}

/// Current usage of both windows.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitStatus {
    pub minute_used: u32,
    pub minute_limit: u32,
    pub hour_used: u32,
    pub hour_limit: u32,
}

struct Windows {
    minute: Window,
    hour: Window,
}

// =============================================================================
// Rate Limiter
// =============================================================================

pub struct RateLimiter {
    windows: Mutex<Windows>,
}

impl RateLimiter {
    pub fn new(per_minute: u32, per_hour: u32) -> Self {
        let now = Instant::now();
        RateLimiter {
            windows: Mutex::new(Windows {
                minute: Window::new(MINUTE, per_minute, now),
                hour: Window::new(HOUR, per_hour, now),
            }),
        }
    }

    pub async fn try_admit(&self) -> Admission {
        self.try_admit_at(Instant::now()).await
    }

    /// Admits and counts one request, or reports how long to wait.
    ///
    /// Counters only move on admission.
    pub async fn try_admit_at(&self, now: Instant) -> Admission {
        let mut windows = self.windows.lock().await;
        windows.minute.roll(now);
        windows.hour.roll(now);

        if windows.minute.has_capacity() && windows.hour.has_capacity() {
            windows.minute.count += 1;
            windows.hour.count += 1;
            return Admission::Admitted;
        }

        let mut wait = Duration::ZERO;
        for window in [&windows.minute, &windows.hour] {
            if !window.has_capacity() {
                wait = wait.max(window.resets_in(now));
            }
        }
        Admission::Wait(wait)
    }

    /// Waits for capacity for at most `max_wait`.
    ///
    /// Fails with [`ClientError::RateLimited`] as soon as the required wait
    /// would overrun the bound.
    pub async fn acquire(&self, max_wait: Duration) -> ClientResult<()> {
        let deadline = Instant::now() + max_wait;

        loop {
            let now = Instant::now();
            match self.try_admit_at(now).await {
                Admission::Admitted => return Ok(()),
                Admission::Wait(wait) => {
                    if now + wait > deadline {
                        warn!(
                            retry_after_ms = wait.as_millis() as u64,
                            "Rate limit saturated beyond wait bound"
                        );
                        return Err(ClientError::RateLimited {
                            retry_after_ms: wait.as_millis() as u64,
                        });
                    }
                    debug!(wait_ms = wait.as_millis() as u64, "Rate limit saturated, waiting");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    pub async fn status(&self) -> RateLimitStatus {
        self.status_at(Instant::now()).await
    }

    pub async fn status_at(&self, now: Instant) -> RateLimitStatus {
        let mut windows = self.windows.lock().await;
        windows.minute.roll(now);
        windows.hour.roll(now);
        RateLimitStatus {
            minute_used: windows.minute.count,
            minute_limit: windows.minute.limit,
            hour_used: windows.hour.count,
            hour_limit: windows.hour.limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_minute_window_saturates_at_61() {
        let limiter = RateLimiter::new(60, 1000);
        let t0 = Instant::now();

        for i in 0..60 {
            let at = t0 + Duration::from_millis(i * 500);
            assert_eq!(limiter.try_admit_at(at).await, Admission::Admitted);
        }

        let at = t0 + Duration::from_secs(30);
        match limiter.try_admit_at(at).await {
            Admission::Wait(wait) => assert!(wait > Duration::ZERO && wait <= MINUTE),
            Admission::Admitted => panic!("61st request inside one minute was admitted"),
        }

        // Refused attempts are not counted.
        let status = limiter.status_at(at).await;
        assert_eq!(status.minute_used, 60);
        assert_eq!(status.hour_used, 60);
    }

    #[tokio::test]
    async fn test_minute_window_resets() {
        let limiter = RateLimiter::new(2, 1000);
        let t0 = Instant::now();

        assert_eq!(limiter.try_admit_at(t0).await, Admission::Admitted);
        assert_eq!(limiter.try_admit_at(t0).await, Admission::Admitted);
        assert!(matches!(limiter.try_admit_at(t0).await, Admission::Wait(_)));
        assert_eq!(limiter.try_admit_at(t0 + MINUTE).await, Admission::Admitted);
    }

    #[tokio::test]
    async fn test_hour_window_saturates_at_1001() {
        let limiter = RateLimiter::new(60, 1000);
        let t0 = Instant::now();

        // 60 per minute keeps the minute window from saturating first.
        for i in 0..1000u64 {
            let at = t0 + Duration::from_secs((i / 60) * 60);
            assert_eq!(limiter.try_admit_at(at).await, Admission::Admitted, "request {}", i);
        }

        let at = t0 + Duration::from_secs(16 * 60);
        let status = limiter.status_at(at).await;
        assert!(status.minute_used < 60);

        match limiter.try_admit_at(at).await {
            Admission::Wait(wait) => {
                assert!(wait <= HOUR - Duration::from_secs(16 * 60));
                assert!(wait > HOUR - Duration::from_secs(17 * 60));
            }
            Admission::Admitted => panic!("1001st request inside one hour was admitted"),
        }
    }

    #[tokio::test]
    async fn test_acquire_fails_fast_beyond_bound() {
        let limiter = RateLimiter::new(1, 1000);
        limiter.acquire(Duration::ZERO).await.unwrap();

        let err = limiter.acquire(Duration::from_millis(10)).await.unwrap_err();
        assert!(matches!(err, ClientError::RateLimited { retry_after_ms } if retry_after_ms > 10));
    }

    #[tokio::test]
    async fn test_acquire_does_not_wait_out_an_hour_window() {
        let limiter = RateLimiter::new(5, 1);
        limiter.acquire(Duration::ZERO).await.unwrap();

        let err = limiter.acquire(Duration::from_secs(120)).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::RateLimited { retry_after_ms } if retry_after_ms > 3_500_000
        ));
        assert_eq!(limiter.status().await.hour_used, 1);
    }
}
