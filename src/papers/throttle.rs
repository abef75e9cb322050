//! Courtesy throttle between source attempts
//!
//! Not a rate limiter: no token bucket and no backoff on 429. The cascade asks
//! the policy how long to wait before each network-bound source after the
//! first, and hands the wait to a [`Sleeper`] so tests can run without delays.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

use super::mirror;
use crate::settings::Settings;

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real delays on the tokio timer
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Records requested delays without waiting
#[cfg(test)]
#[derive(Default)]
pub struct RecordingSleeper {
    requested: std::sync::Mutex<Vec<Duration>>,
}

#[cfg(test)]
impl RecordingSleeper {
    pub fn requested(&self) -> Vec<Duration> {
        self.requested.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut requested) = self.requested.lock() {
            requested.push(duration);
        }
    }
}

/// Minimum delay before each source, with a default for unlisted sources
#[derive(Debug, Clone, Default)]
pub struct ThrottlePolicy {
    default_delay: Duration,
    per_source: HashMap<String, Duration>,
}

impl ThrottlePolicy {
    pub fn new(default_delay: Duration) -> Self {
        Self {
            default_delay,
            per_source: HashMap::new(),
        }
    }

    /// No delays at all
    pub fn none() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(Duration::from_millis(settings.source_delay_ms))
            .with_delay(mirror::SOURCE, Duration::from_millis(settings.mirror_delay_ms))
    }

    pub fn with_delay(mut self, source: &str, delay: Duration) -> Self {
        self.per_source.insert(source.to_string(), delay);
        self
    }

    pub fn delay_before(&self, source: &str) -> Duration {
        self.per_source.get(source).copied().unwrap_or(self.default_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_from_settings() {
        let policy = ThrottlePolicy::from_settings(&Settings::default());
        assert_eq!(policy.delay_before("pmc"), Duration::from_millis(340));
        assert_eq!(policy.delay_before("mirror"), Duration::from_millis(1000));
    }

    #[test]
    fn test_none_policy_is_zero() {
        assert_eq!(ThrottlePolicy::none().delay_before("anything"), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_recording_sleeper() {
        let sleeper = RecordingSleeper::default();
        sleeper.sleep(Duration::from_millis(5)).await;
        sleeper.sleep(Duration::from_millis(7)).await;
        assert_eq!(sleeper.requested(), vec![Duration::from_millis(5), Duration::from_millis(7)]);
    }
}
