use crate::auth::IdentifierMode;
use clap::{Arg, ArgMatches, Command};

pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new("typed-id-used")
            .long("typed-id-used")
            .help("Use the typed identifier (<ProfileType>#<id>) as principal id instead of the raw id")
            .env("TICKETGUARD_TYPED_ID_USED")
            .default_value("true")
            .value_parser(clap::value_parser!(bool)),
    )
}

#[must_use]
pub fn parse(matches: &ArgMatches) -> IdentifierMode {
    IdentifierMode::from_typed_id_used(
        matches
            .get_one::<bool>("typed-id-used")
            .copied()
            .unwrap_or(true),
    )
}
