pub mod auth;
pub mod logging;
pub mod throttle;
pub mod ticket;

use clap::{
    Arg, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("ticketguard")
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("TICKETGUARD_PORT")
                .value_parser(clap::value_parser!(u16)),
        );

    let command = ticket::with_args(command);
    let command = throttle::with_args(command);
    let command = auth::with_args(command);
    logging::with_args(command)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::throttle::KeyStrategy;

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "ticketguard");
        assert_eq!(
            command.get_about().map(ToString::to_string),
            Some(env!("CARGO_PKG_DESCRIPTION").to_string())
        );
        assert_eq!(
            command.get_version().map(ToString::to_string),
            Some(env!("CARGO_PKG_VERSION").to_string())
        );
    }

    #[test]
    fn test_defaults() {
        temp_env::with_vars_unset(
            [
                "TICKETGUARD_PORT",
                "TICKETGUARD_ST_NUMBER_OF_USES",
                "TICKETGUARD_ST_TIME_TO_KILL_SECONDS",
                "TICKETGUARD_THROTTLE_FAILURE_THRESHOLD",
                "TICKETGUARD_THROTTLE_KEY",
                "TICKETGUARD_THROTTLE_TRUST_FORWARDED_HEADERS",
                "TICKETGUARD_TYPED_ID_USED",
            ],
            || {
                let matches = new().get_matches_from(vec!["ticketguard"]);
                assert_eq!(matches.get_one::<u16>("port").copied(), Some(8080));
                assert_eq!(
                    matches.get_one::<u64>("st-number-of-uses").copied(),
                    Some(1)
                );
                assert_eq!(
                    matches.get_one::<u64>("st-time-to-kill-seconds").copied(),
                    Some(10)
                );
                assert_eq!(
                    matches
                        .get_one::<u32>("throttle-failure-threshold")
                        .copied(),
                    Some(100)
                );
                assert_eq!(
                    matches.get_one::<KeyStrategy>("throttle-key").copied(),
                    Some(KeyStrategy::IpAddress)
                );
                assert_eq!(
                    matches
                        .get_one::<bool>("throttle-trust-forwarded-headers")
                        .copied(),
                    Some(false)
                );
                assert_eq!(matches.get_one::<bool>("typed-id-used").copied(), Some(true));
            },
        );
    }

    #[test]
    fn test_check_env() {
        temp_env::with_vars(
            [
                ("TICKETGUARD_PORT", Some("443")),
                ("TICKETGUARD_ST_NUMBER_OF_USES", Some("3")),
                ("TICKETGUARD_THROTTLE_CLEANER_INTERVAL_MS", Some("1000")),
                ("TICKETGUARD_THROTTLE_KEY", Some("ip-and-username")),
                ("TICKETGUARD_THROTTLE_TRUST_FORWARDED_HEADERS", Some("true")),
                ("TICKETGUARD_TYPED_ID_USED", Some("false")),
                ("TICKETGUARD_LOG_LEVEL", Some("info")),
            ],
            || {
                let matches = new().get_matches_from(vec!["ticketguard"]);
                assert_eq!(matches.get_one::<u16>("port").copied(), Some(443));
                assert_eq!(
                    matches.get_one::<u64>("st-number-of-uses").copied(),
                    Some(3)
                );
                assert_eq!(
                    matches
                        .get_one::<u64>("throttle-cleaner-interval-ms")
                        .copied(),
                    Some(1000)
                );
                assert_eq!(
                    matches.get_one::<KeyStrategy>("throttle-key").copied(),
                    Some(KeyStrategy::IpAddressAndUsername)
                );
                assert_eq!(
                    matches
                        .get_one::<bool>("throttle-trust-forwarded-headers")
                        .copied(),
                    Some(true)
                );
                assert_eq!(
                    matches.get_one::<bool>("typed-id-used").copied(),
                    Some(false)
                );
                assert_eq!(matches.get_one::<u8>("verbosity").copied(), Some(2));
            },
        );
    }

    #[test]
    fn test_check_log_level_verbosity() {
        // loop cover all possible value_parse
        let levels = ["error", "warn", "info", "debug", "trace"];
        for (index, _) in levels.iter().enumerate() {
            temp_env::with_vars([("TICKETGUARD_LOG_LEVEL", None::<String>)], || {
                let mut args = vec!["ticketguard".to_string()];

                // Add the appropriate number of "-v" flags based on the index
                if index > 0 {
                    let v = format!("-{}", "v".repeat(index));
                    args.push(v);
                }

                let matches = new().get_matches_from(args);

                assert_eq!(
                    matches.get_one::<u8>("verbosity").copied(),
                    u8::try_from(index).ok()
                );
            });
        }
    }

    #[test]
    fn test_rejects_unknown_throttle_key() {
        let result = new().try_get_matches_from(vec!["ticketguard", "--throttle-key", "cookie"]);
        assert_eq!(
            result.map(|_| ()).map_err(|e| e.kind()),
            Err(clap::error::ErrorKind::InvalidValue)
        );
    }
}
