//! Submission throttling for the authentication endpoint.
//!
//! Flow Overview:
//! 1) Before an authentication `POST` is processed, the client key is looked up
//!    in the [`ThrottleTracker`]. If the instantaneous failure rate since the last
//!    failed attempt is above the threshold, the submission is rejected.
//! 2) When authentication fails, the failure timestamp for the key is replaced.
//! 3) A single cleaner task periodically evicts keys whose rate has decayed
//!    below the threshold, bounding memory.
//!
//! The threshold rate is `failure_threshold / failure_range_seconds`
//! submissions per second. The rate of a key is `1000 / ms since last failure`,
//! so with the defaults (100 failures in 60 seconds) a client must wait at least
//! 600 ms after a failed attempt before its next submission is accepted.
//!
//! State is in memory and per process; it is not shared across instances.

mod cleaner;
mod interceptor;
mod key;
mod middleware;
mod tracker;

pub use cleaner::{CleanerHandle, CleanerSchedule, spawn_cleaner};
pub use interceptor::{ThrottleDecision, ThrottleInterceptor};
pub use key::{KeyStrategy, UnknownKeyStrategy, client_ip};
pub use middleware::throttle_submissions;
pub use tracker::{SweepReport, ThrottleTracker, submission_rate};

use std::time::Duration;

const DEFAULT_FAILURE_THRESHOLD: u32 = 100;
const DEFAULT_FAILURE_RANGE_SECONDS: u64 = 60;
const DEFAULT_CLEANER_INTERVAL: Duration = Duration::from_millis(5000);
const DEFAULT_CLEANER_START_DELAY: Duration = Duration::from_millis(5000);
const DEFAULT_USERNAME_FIELD: &str = "username";

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ThrottleConfigError {
    #[error("failure threshold must be greater than 0")]
    InvalidFailureThreshold,
    #[error("failure range must be greater than 0 seconds")]
    InvalidFailureRange,
    #[error("cleaner interval must be greater than 0")]
    InvalidCleanerInterval,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ThrottleConfig {
    failure_threshold: u32,
    failure_range_seconds: u64,
    cleaner_interval: Duration,
    cleaner_start_delay: Duration,
    key_strategy: KeyStrategy,
    username_field: String,
    trust_forwarded_headers: bool,
}

impl ThrottleConfig {
    /// Default config: 100 failures per 60 seconds, keyed by IP address,
    /// cleaner every 5s after a 5s start delay.
    #[must_use]
    pub fn new() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            failure_range_seconds: DEFAULT_FAILURE_RANGE_SECONDS,
            cleaner_interval: DEFAULT_CLEANER_INTERVAL,
            cleaner_start_delay: DEFAULT_CLEANER_START_DELAY,
            key_strategy: KeyStrategy::IpAddress,
            username_field: DEFAULT_USERNAME_FIELD.to_string(),
            trust_forwarded_headers: false,
        }
    }

    #[must_use]
    pub fn with_failure_threshold(mut self, failure_threshold: u32) -> Self {
        self.failure_threshold = failure_threshold;
        self
    }

    #[must_use]
    pub fn with_failure_range_seconds(mut self, seconds: u64) -> Self {
        self.failure_range_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_cleaner_interval(mut self, interval: Duration) -> Self {
        self.cleaner_interval = interval;
        self
    }

    #[must_use]
    pub fn with_cleaner_start_delay(mut self, delay: Duration) -> Self {
        self.cleaner_start_delay = delay;
        self
    }

    #[must_use]
    pub fn with_key_strategy(mut self, key_strategy: KeyStrategy) -> Self {
        self.key_strategy = key_strategy;
        self
    }

    #[must_use]
    pub fn with_username_field(mut self, field: String) -> Self {
        self.username_field = field;
        self
    }

    /// Take the client address from `X-Forwarded-For` / `X-Real-IP` instead of
    /// the socket peer. Only safe behind a proxy that overwrites those headers.
    #[must_use]
    pub fn with_trust_forwarded_headers(mut self, trust: bool) -> Self {
        self.trust_forwarded_headers = trust;
        self
    }

    /// Reject settings that would disable throttling or the cleaner.
    ///
    /// # Errors
    /// Returns the first invalid setting found.
    pub fn validate(self) -> Result<Self, ThrottleConfigError> {
        if self.failure_threshold == 0 {
            return Err(ThrottleConfigError::InvalidFailureThreshold);
        }
        if self.failure_range_seconds == 0 {
            return Err(ThrottleConfigError::InvalidFailureRange);
        }
        if self.cleaner_interval.is_zero() {
            return Err(ThrottleConfigError::InvalidCleanerInterval);
        }
        Ok(self)
    }

    /// Allowed failed submissions per second.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn threshold_rate(&self) -> f64 {
        f64::from(self.failure_threshold) / self.failure_range_seconds as f64
    }

    #[must_use]
    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    #[must_use]
    pub fn failure_range_seconds(&self) -> u64 {
        self.failure_range_seconds
    }

    #[must_use]
    pub fn cleaner_schedule(&self) -> CleanerSchedule {
        CleanerSchedule::new(self.cleaner_start_delay, self.cleaner_interval)
    }

    #[must_use]
    pub fn key_strategy(&self) -> KeyStrategy {
        self.key_strategy
    }

    #[must_use]
    pub fn username_field(&self) -> &str {
        &self.username_field
    }

    #[must_use]
    pub fn trust_forwarded_headers(&self) -> bool {
        self.trust_forwarded_headers
    }
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_threshold_rate() {
        let config = ThrottleConfig::new();
        assert!((config.threshold_rate() - 100.0 / 60.0).abs() < f64::EPSILON);
        assert_eq!(config.key_strategy(), KeyStrategy::IpAddress);
        assert_eq!(config.username_field(), "username");
        assert!(!config.trust_forwarded_headers());
        assert_eq!(
            config.cleaner_schedule(),
            CleanerSchedule::new(Duration::from_secs(5), Duration::from_secs(5))
        );
    }

    #[test]
    fn validate_rejects_zero_settings() {
        assert_eq!(
            ThrottleConfig::new().with_failure_threshold(0).validate(),
            Err(ThrottleConfigError::InvalidFailureThreshold)
        );
        assert_eq!(
            ThrottleConfig::new()
                .with_failure_range_seconds(0)
                .validate(),
            Err(ThrottleConfigError::InvalidFailureRange)
        );
        assert_eq!(
            ThrottleConfig::new()
                .with_cleaner_interval(Duration::ZERO)
                .validate(),
            Err(ThrottleConfigError::InvalidCleanerInterval)
        );
    }

    #[test]
    fn validate_accepts_custom_settings() {
        let config = ThrottleConfig::new()
            .with_failure_threshold(1)
            .with_failure_range_seconds(1)
            .with_cleaner_start_delay(Duration::ZERO)
            .validate()
            .expect("valid config");
        assert!((config.threshold_rate() - 1.0).abs() < f64::EPSILON);
    }
}
