use crate::{
    api::{self, Services},
    auth::{DelegatedAuthenticationHandler, IdentifierMode},
    cli::telemetry,
    throttle::{ThrottleConfig, ThrottleInterceptor},
    ticket::MultiTimeUseOrTimeoutExpirationPolicy,
};
use anyhow::Result;
use std::sync::Arc;
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub ticket_policy: MultiTimeUseOrTimeoutExpirationPolicy,
    pub throttle: ThrottleConfig,
    pub identifier_mode: IdentifierMode,
    pub cleaner_owner: bool,
}

impl Args {
    /// Wire the configured components together.
    #[must_use]
    pub fn services(&self) -> Services {
        Services {
            interceptor: Arc::new(ThrottleInterceptor::new(
                self.throttle.clone(),
                self.cleaner_owner,
            )),
            authentication: Arc::new(DelegatedAuthenticationHandler::new(self.identifier_mode)),
            expiration_policy: Arc::new(self.ticket_policy),
        }
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let result = api::new(args.port, args.services()).await;

    telemetry::shutdown_tracer();

    result
}

fn log_startup_args(args: &Args) {
    let schedule = args.throttle.cleaner_schedule();
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        (
            "st_number_of_uses",
            args.ticket_policy.number_of_uses().to_string(),
        ),
        (
            "st_time_to_kill",
            format!("{}s", args.ticket_policy.time_to_kill().as_secs()),
        ),
        (
            "throttle_threshold",
            format!(
                "{} failures / {}s",
                args.throttle.failure_threshold(),
                args.throttle.failure_range_seconds()
            ),
        ),
        ("throttle_key", args.throttle.key_strategy().to_string()),
        (
            "throttle_trust_forwarded_headers",
            args.throttle.trust_forwarded_headers().to_string(),
        ),
        (
            "throttle_cleaner",
            format!(
                "owner={} delay={}ms interval={}ms",
                args.cleaner_owner,
                schedule.start_delay().as_millis(),
                schedule.interval().as_millis()
            ),
        ),
        (
            "typed_id_used",
            matches!(args.identifier_mode, IdentifierMode::Typed).to_string(),
        ),
    ];
    log_entries("Startup configuration", &entries);
}

fn log_entries(title: &str, entries: &[(&str, String)]) {
    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "ticketguard {} - {}\n\n{title}:",
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn short_commit(hash: &str) -> String {
    let trimmed = hash.trim();
    if trimmed.len() > 7 {
        trimmed[..7].to_string()
    } else {
        trimmed.to_string()
    }
}
