//! Outgoing request throttle
//!
//! Spaces requests evenly at `max_requests_per_second`. Each caller reserves
//! the next free slot under a short lock and then sleeps outside it, so
//! concurrent status queries queue up instead of bursting past exchange
//! request-weight limits.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

#[derive(Debug, Clone)]
pub struct RequestThrottle {
    spacing: Duration,
    next_slot: Arc<Mutex<Instant>>,
}

impl RequestThrottle {
    /// A rate of zero disables throttling
    pub fn new(max_requests_per_second: usize) -> Self {
        let spacing = if max_requests_per_second == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs(1) / u32::try_from(max_requests_per_second).unwrap_or(u32::MAX)
        };
        Self {
            spacing,
            next_slot: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn spacing(&self) -> Duration {
        self.spacing
    }

    /// Wait until this caller's slot comes up
    pub async fn acquire(&self) {
        if self.spacing.is_zero() {
            return;
        }
        let slot = {
            let mut next = self.next_slot.lock().await;
            let slot = (*next).max(Instant::now());
            *next = slot + self.spacing;
            slot
        };
        sleep_until(slot).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_requests_are_spaced() {
        let throttle = RequestThrottle::new(10);
        assert_eq!(throttle.spacing(), Duration::from_millis(100));

        let start = Instant::now();
        for _ in 0..5 {
            throttle.acquire().await;
        }
        // First slot is immediate, four more follow at 100ms each
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(400), "{:?}", elapsed);
        assert!(elapsed < Duration::from_millis(450), "{:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_throttle_does_not_accumulate_debt() {
        let throttle = RequestThrottle::new(10);
        throttle.acquire().await;
        tokio::time::sleep(Duration::from_secs(5)).await;

        let start = Instant::now();
        throttle.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clones_share_schedule() {
        let a = RequestThrottle::new(2);
        let b = a.clone();
        let start = Instant::now();
        a.acquire().await;
        b.acquire().await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(500), "{:?}", elapsed);
        assert!(elapsed < Duration::from_millis(550), "{:?}", elapsed);
    }

    #[tokio::test]
    async fn test_rate_beyond_u32_saturates() {
        // Would truncate to a zero divisor if narrowed with a cast
        let throttle = RequestThrottle::new((u32::MAX as usize).saturating_add(1));
        assert!(throttle.spacing() < Duration::from_micros(1));
        assert!(RequestThrottle::new(usize::MAX).spacing() < Duration::from_micros(1));
    }

    #[tokio::test]
    async fn test_zero_rate_disables_throttle() {
        let throttle = RequestThrottle::new(0);
        for _ in 0..100 {
            throttle.acquire().await;
        }
        assert!(throttle.spacing().is_zero());
    }
}
