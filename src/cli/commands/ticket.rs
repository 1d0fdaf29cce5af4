use crate::ticket::MultiTimeUseOrTimeoutExpirationPolicy;
use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use std::time::Duration;

pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("st-number-of-uses")
                .long("st-number-of-uses")
                .help("Maximum number of times a service ticket may be validated")
                .env("TICKETGUARD_ST_NUMBER_OF_USES")
                .default_value("1")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("st-time-to-kill-seconds")
                .long("st-time-to-kill-seconds")
                .help("Maximum idle time of a service ticket in seconds")
                .env("TICKETGUARD_ST_TIME_TO_KILL_SECONDS")
                .default_value("10")
                .value_parser(clap::value_parser!(u64)),
        )
}

/// Build the service ticket expiration policy.
///
/// # Errors
/// Returns an error if either limit is zero.
pub fn parse(matches: &ArgMatches) -> Result<MultiTimeUseOrTimeoutExpirationPolicy> {
    let number_of_uses = matches
        .get_one::<u64>("st-number-of-uses")
        .copied()
        .unwrap_or(1);
    let time_to_kill = matches
        .get_one::<u64>("st-time-to-kill-seconds")
        .copied()
        .unwrap_or(10);

    MultiTimeUseOrTimeoutExpirationPolicy::new(number_of_uses, Duration::from_secs(time_to_kill))
        .context("invalid service ticket expiration settings")
}
