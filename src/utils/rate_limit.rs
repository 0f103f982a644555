//! Per-host request spacing.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Enforces a minimum interval between consecutive requests to one host.
#[derive(Debug)]
pub struct HostRateLimiter {
    min_interval: Duration,
    last_request: Mutex<HashMap<String, Instant>>,
    host_intervals: Mutex<HashMap<String, Duration>>,
}

impl HostRateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(HashMap::new()),
            host_intervals: Mutex::new(HashMap::new()),
        }
    }

    /// Raise the interval for one host (e.g. a robots.txt Crawl-delay).
    /// Never lowers it below the configured minimum.
    pub async fn slow_down(&self, host: &str, interval: Duration) {
        if interval > self.min_interval {
            self.host_intervals.lock().await.insert(host.to_string(), interval);
        }
    }

    async fn interval_for(&self, host: &str) -> Duration {
        self.host_intervals
            .lock()
            .await
            .get(host)
            .copied()
            .unwrap_or(self.min_interval)
    }

    /// Wait until a request to `host` is allowed, then record it.
    pub async fn acquire(&self, host: &str) {
        let interval = self.interval_for(host).await;
        let mut last = self.last_request.lock().await;
        let wait = remaining_wait(last.get(host).copied(), Instant::now(), interval);
        if !wait.is_zero() {
            log::info!("Rate limit: waiting {}s before next request to {}", wait.as_secs(), host);
            tokio::time::sleep(wait).await;
        }
        last.insert(host.to_string(), Instant::now());
    }
}

/// Time still to wait given the previous request instant.
pub fn remaining_wait(previous: Option<Instant>, now: Instant, min_interval: Duration) -> Duration {
    match previous {
        Some(prev) => min_interval.saturating_sub(now.saturating_duration_since(prev)),
        None => Duration::ZERO,
    }
}
