//! Usage-count and idle-timeout expiration.

use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;
use tracing::debug;

use super::{ExpirationPolicy, TicketState};

/// Default usage ceiling for service tickets.
pub const DEFAULT_NUMBER_OF_USES: u64 = 1;
/// Default maximum idle time for service tickets.
pub const DEFAULT_TIME_TO_KILL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ExpirationPolicyError {
    #[error("number of uses must be greater than 0")]
    InvalidNumberOfUses,
    #[error("time to kill must be greater than 0")]
    InvalidTimeToKill,
    #[error("time to kill is out of range")]
    TimeToKillOutOfRange,
}

/// Expires a ticket once it has been used `number_of_uses` times, or once it
/// has been idle for `time_to_kill`, whichever happens first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultiTimeUseOrTimeoutExpirationPolicy {
    number_of_uses: u64,
    time_to_kill: Duration,
    time_to_kill_delta: TimeDelta,
}

impl MultiTimeUseOrTimeoutExpirationPolicy {
    /// # Errors
    /// Returns an error if either limit is zero, or if `time_to_kill` cannot be
    /// represented as a calendar duration.
    pub fn new(number_of_uses: u64, time_to_kill: Duration) -> Result<Self, ExpirationPolicyError> {
        if number_of_uses == 0 {
            return Err(ExpirationPolicyError::InvalidNumberOfUses);
        }
        if time_to_kill.is_zero() {
            return Err(ExpirationPolicyError::InvalidTimeToKill);
        }
        let time_to_kill_delta = TimeDelta::from_std(time_to_kill)
            .map_err(|_| ExpirationPolicyError::TimeToKillOutOfRange)?;

        Ok(Self {
            number_of_uses,
            time_to_kill,
            time_to_kill_delta,
        })
    }

    #[must_use]
    pub fn number_of_uses(&self) -> u64 {
        self.number_of_uses
    }

    #[must_use]
    pub fn time_to_kill(&self) -> Duration {
        self.time_to_kill
    }
}

impl Default for MultiTimeUseOrTimeoutExpirationPolicy {
    fn default() -> Self {
        Self {
            number_of_uses: DEFAULT_NUMBER_OF_USES,
            time_to_kill: DEFAULT_TIME_TO_KILL,
            time_to_kill_delta: TimeDelta::seconds(10),
        }
    }
}

impl ExpirationPolicy for MultiTimeUseOrTimeoutExpirationPolicy {
    fn is_expired_at(&self, state: Option<&dyn TicketState>, now: DateTime<Utc>) -> bool {
        let Some(state) = state else {
            debug!("Ticket state is missing, treating ticket as expired");
            return true;
        };

        let count_of_uses = state.count_of_uses();
        if count_of_uses >= self.number_of_uses {
            debug!(
                count_of_uses,
                number_of_uses = self.number_of_uses,
                "Ticket usage count reached the configured ceiling"
            );
            return true;
        }

        let last_time_used = state.last_time_used();
        let idle = now.signed_duration_since(last_time_used);
        if idle >= self.time_to_kill_delta {
            debug!(
                now = %now,
                last_time_used = %last_time_used,
                time_to_kill_ms = self.time_to_kill_delta.num_milliseconds(),
                "Ticket idle time reached time to kill"
            );
            return true;
        }

        false
    }
}
