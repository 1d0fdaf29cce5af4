//! Periodic decay sweep for the throttle tracker.

use chrono::Utc;
use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval_at},
};
use tracing::{debug, error, info};

use super::tracker::{SweepReport, ThrottleTracker};

/// When the cleaner first runs and how often it repeats.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CleanerSchedule {
    start_delay: Duration,
    interval: Duration,
}

impl CleanerSchedule {
    #[must_use]
    pub fn new(start_delay: Duration, interval: Duration) -> Self {
        Self {
            start_delay,
            interval,
        }
    }

    #[must_use]
    pub fn start_delay(&self) -> Duration {
        self.start_delay
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// Stop handle for a running cleaner. Dropping the handle also stops the task.
#[derive(Debug)]
pub struct CleanerHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl CleanerHandle {
    /// Signal the cleaner to stop and wait for the task to finish.
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        if let Err(err) = self.task.await {
            error!("throttle cleaner task failed: {err}");
        }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawn the cleaner for `tracker`.
///
/// `schedule.interval()` must be non-zero.
pub fn spawn_cleaner(tracker: Arc<ThrottleTracker>, schedule: CleanerSchedule) -> CleanerHandle {
    info!(
        start_delay_ms = schedule.start_delay().as_millis(),
        interval_ms = schedule.interval().as_millis(),
        "Scheduling throttle cleaner"
    );
    spawn_with(schedule, move || tracker.sweep(Utc::now()))
}

fn spawn_with<F>(schedule: CleanerSchedule, sweep: F) -> CleanerHandle
where
    F: Fn() -> SweepReport + Send + 'static,
{
    let (stop, mut stopped) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + schedule.start_delay, schedule.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => run_sweep(&sweep),
                // Fires on an explicit stop and when the handle is dropped.
                _ = stopped.changed() => break,
            }
        }

        info!("Throttle cleaner stopped");
    });

    CleanerHandle { stop, task }
}

// A failed sweep must not end the schedule; the next tick sweeps again.
fn run_sweep<F>(sweep: &F)
where
    F: Fn() -> SweepReport,
{
    debug!("Beginning throttle cleanup");
    match panic::catch_unwind(AssertUnwindSafe(sweep)) {
        Ok(report) => debug!(
            evicted = report.evicted,
            retained = report.retained,
            "Throttle cleanup complete"
        ),
        Err(payload) => error!(
            reason = panic_reason(payload.as_ref()),
            "Throttle cleanup failed"
        ),
    }
}

fn panic_reason(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown"
    }
}
