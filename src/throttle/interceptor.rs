//! Boundary between request handling and the throttle tracker.

use chrono::{DateTime, Utc};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tracing::{debug, info, warn};

use super::{
    ThrottleConfig,
    cleaner::{CleanerHandle, spawn_cleaner},
    tracker::{SweepReport, ThrottleTracker},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThrottleDecision {
    Allowed,
    Denied,
}

/// Throttling entry points for the HTTP layer and the cleaner schedule.
///
/// Exactly one interceptor per process should be built with `cleaner_owner`
/// set; only that one starts the periodic sweep.
#[derive(Debug)]
pub struct ThrottleInterceptor {
    config: ThrottleConfig,
    tracker: Arc<ThrottleTracker>,
    cleaner_owner: bool,
    cleaner_started: AtomicBool,
}

impl ThrottleInterceptor {
    #[must_use]
    pub fn new(config: ThrottleConfig, cleaner_owner: bool) -> Self {
        let tracker = Arc::new(ThrottleTracker::new(config.threshold_rate()));
        Self::with_tracker(config, tracker, cleaner_owner)
    }

    /// Build around an existing tracker, e.g. one shared by several routes.
    #[must_use]
    pub fn with_tracker(
        config: ThrottleConfig,
        tracker: Arc<ThrottleTracker>,
        cleaner_owner: bool,
    ) -> Self {
        Self {
            config,
            tracker,
            cleaner_owner,
            cleaner_started: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ThrottleConfig {
        &self.config
    }

    #[must_use]
    pub fn tracker(&self) -> &Arc<ThrottleTracker> {
        &self.tracker
    }

    /// Decide whether a submission from `key` may be processed.
    #[must_use]
    pub fn before_request(&self, key: &str) -> ThrottleDecision {
        self.before_request_at(key, Utc::now())
    }

    #[must_use]
    pub fn before_request_at(&self, key: &str, now: DateTime<Utc>) -> ThrottleDecision {
        if self.tracker.exceeds_threshold_at(key, now) {
            self.record_throttle(key);
            ThrottleDecision::Denied
        } else {
            ThrottleDecision::Allowed
        }
    }

    /// Record a failed authentication for `key`. Never call on success.
    pub fn on_authentication_failure(&self, key: &str) {
        debug!(key = %key, "Recording failed authentication");
        self.tracker.record_failure(key);
    }

    /// Run one cleaner sweep at `now`.
    pub fn run_cleanup_tick(&self, now: DateTime<Utc>) -> SweepReport {
        self.tracker.sweep(now)
    }

    /// Start the periodic cleaner if this instance owns it and it is not
    /// already running. Must be called from within a tokio runtime.
    #[must_use]
    pub fn start_cleaner(&self) -> Option<CleanerHandle> {
        if !self.cleaner_owner {
            debug!("Not the throttle cleaner owner, skipping cleaner");
            return None;
        }
        if self.cleaner_started.swap(true, Ordering::SeqCst) {
            debug!("Throttle cleaner already started");
            return None;
        }

        let schedule = self.config.cleaner_schedule();
        let handle = spawn_cleaner(self.tracker.clone(), schedule);
        info!(
            "Throttle cleaner will clean entries every {} ms",
            schedule.interval().as_millis()
        );
        Some(handle)
    }

    fn record_throttle(&self, key: &str) {
        warn!(
            target: "audit",
            key = %key,
            "Throttling submission from {key}. More than {} failed login attempts within {} seconds.",
            self.config.failure_threshold(),
            self.config.failure_range_seconds()
        );
    }
}
