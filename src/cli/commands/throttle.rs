use crate::throttle::{KeyStrategy, ThrottleConfig};
use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command, builder::{PossibleValuesParser, TypedValueParser}};
use std::time::Duration;

pub fn with_args(command: Command) -> Command {
    let command = with_threshold_args(command);
    let command = with_cleaner_args(command);
    with_key_args(command)
}

fn with_threshold_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("throttle-failure-threshold")
                .long("throttle-failure-threshold")
                .help("Failed submissions allowed within the failure range")
                .env("TICKETGUARD_THROTTLE_FAILURE_THRESHOLD")
                .default_value("100")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("throttle-failure-range-seconds")
                .long("throttle-failure-range-seconds")
                .help("Window in seconds the failure threshold applies to")
                .env("TICKETGUARD_THROTTLE_FAILURE_RANGE_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(u64)),
        )
}

fn with_cleaner_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("throttle-cleaner-interval-ms")
                .long("throttle-cleaner-interval-ms")
                .help("Interval between throttle cleaner sweeps in milliseconds")
                .env("TICKETGUARD_THROTTLE_CLEANER_INTERVAL_MS")
                .default_value("5000")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("throttle-cleaner-start-delay-ms")
                .long("throttle-cleaner-start-delay-ms")
                .help("Delay before the first throttle cleaner sweep in milliseconds")
                .env("TICKETGUARD_THROTTLE_CLEANER_START_DELAY_MS")
                .default_value("5000")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("throttle-cleaner-owner")
                .long("throttle-cleaner-owner")
                .help("Whether this process runs the throttle cleaner")
                .env("TICKETGUARD_THROTTLE_CLEANER_OWNER")
                .default_value("true")
                .value_parser(clap::value_parser!(bool)),
        )
}

fn with_key_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("throttle-key")
                .long("throttle-key")
                .help("How clients are bucketed: by IP address, or by username and IP address")
                .env("TICKETGUARD_THROTTLE_KEY")
                .default_value(KeyStrategy::IpAddress.as_str())
                .value_parser(
                    PossibleValuesParser::new(KeyStrategy::ALL.map(KeyStrategy::as_str))
                        .try_map(|value| value.parse::<KeyStrategy>()),
                ),
        )
        .arg(
            Arg::new("throttle-username-field")
                .long("throttle-username-field")
                .help("JSON body field holding the submitted username")
                .env("TICKETGUARD_THROTTLE_USERNAME_FIELD")
                .default_value("username"),
        )
        .arg(
            Arg::new("throttle-trust-forwarded-headers")
                .long("throttle-trust-forwarded-headers")
                .help("Key clients by X-Forwarded-For / X-Real-IP; only behind a proxy that sets them")
                .env("TICKETGUARD_THROTTLE_TRUST_FORWARDED_HEADERS")
                .default_value("false")
                .value_parser(clap::value_parser!(bool)),
        )
}

#[derive(Debug)]
pub struct Options {
    pub config: ThrottleConfig,
    pub cleaner_owner: bool,
}

impl Options {
    /// # Errors
    /// Returns an error if the throttle settings are invalid.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let key_strategy = matches
            .get_one::<KeyStrategy>("throttle-key")
            .copied()
            .unwrap_or_default();
        let trust_forwarded_headers = matches
            .get_one::<bool>("throttle-trust-forwarded-headers")
            .copied()
            .unwrap_or(false);

        let mut config = ThrottleConfig::new()
            .with_key_strategy(key_strategy)
            .with_trust_forwarded_headers(trust_forwarded_headers);
        if let Some(threshold) = matches.get_one::<u32>("throttle-failure-threshold") {
            config = config.with_failure_threshold(*threshold);
        }
        if let Some(range) = matches.get_one::<u64>("throttle-failure-range-seconds") {
            config = config.with_failure_range_seconds(*range);
        }
        if let Some(interval) = matches.get_one::<u64>("throttle-cleaner-interval-ms") {
            config = config.with_cleaner_interval(Duration::from_millis(*interval));
        }
        if let Some(delay) = matches.get_one::<u64>("throttle-cleaner-start-delay-ms") {
            config = config.with_cleaner_start_delay(Duration::from_millis(*delay));
        }
        if let Some(field) = matches.get_one::<String>("throttle-username-field") {
            config = config.with_username_field(field.clone());
        }

        let config = config.validate().context("invalid throttle settings")?;

        Ok(Self {
            config,
            cleaner_owner: matches
                .get_one::<bool>("throttle-cleaner-owner")
                .copied()
                .unwrap_or(true),
        })
    }
}
