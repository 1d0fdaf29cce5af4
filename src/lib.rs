//! # Ticketguard
//!
//! Protection engine for a single sign-on server.
//!
//! ## Service tickets
//!
//! A service ticket may be validated a limited number of times, and only while
//! it has been used recently. [`ticket::MultiTimeUseOrTimeoutExpirationPolicy`]
//! expires a ticket once its use count reaches the configured ceiling or once
//! it has been idle for the configured time to kill, whichever happens first.
//!
//! ## Submission throttling
//!
//! Failed login submissions are tracked per client key (IP address, or
//! username and IP address). When the observed rate of failures for a key
//! exceeds `failure_threshold / failure_range_seconds`, further submissions
//! are rejected with `403 Forbidden` and an audit event is logged. A
//! background cleaner evicts keys whose rate has fallen back below the
//! threshold.
//!
//! ## Delegated authentication
//!
//! Profiles returned by an external identity provider are turned into an
//! authentication result whose principal id is either the raw profile id or
//! the typed id `<ProfileType>#<id>`.

pub mod api;
pub mod auth;
pub mod cli;
pub mod throttle;
pub mod ticket;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
