//! Ticket validity.
//!
//! Ticket storage is owned by an external ticket store. This module only reads
//! the usage state the store exposes through [`TicketState`] and decides, via an
//! [`ExpirationPolicy`], whether the ticket may still be used.
//!
//! The state read is expected to be a fast in-memory or cache lookup: policies
//! are evaluated on every ticket validation.

mod expiration;

pub use expiration::{
    DEFAULT_NUMBER_OF_USES, DEFAULT_TIME_TO_KILL, ExpirationPolicyError,
    MultiTimeUseOrTimeoutExpirationPolicy,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Usage state of an issued ticket, as maintained by the ticket store.
///
/// Both values are non-decreasing over the lifetime of a ticket.
pub trait TicketState: Send + Sync {
    /// Number of times the ticket has been validated.
    fn count_of_uses(&self) -> u64;

    /// Instant of the last validation.
    fn last_time_used(&self) -> DateTime<Utc>;
}

/// Decides whether a ticket is still usable.
pub trait ExpirationPolicy: Send + Sync + std::fmt::Debug {
    /// Evaluate against the current wall clock.
    fn is_expired(&self, state: Option<&dyn TicketState>) -> bool {
        self.is_expired_at(state, Utc::now())
    }

    /// Evaluate against an explicit `now`.
    fn is_expired_at(&self, state: Option<&dyn TicketState>, now: DateTime<Utc>) -> bool;
}

/// Point-in-time copy of a ticket's usage state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TicketSnapshot {
    pub count_of_uses: u64,
    pub last_time_used: DateTime<Utc>,
}

impl TicketState for TicketSnapshot {
    fn count_of_uses(&self) -> u64 {
        self.count_of_uses
    }

    fn last_time_used(&self) -> DateTime<Utc> {
        self.last_time_used
    }
}
