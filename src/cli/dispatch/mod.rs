use crate::cli::{
    actions::{Action, server::Args},
    commands::{auth, throttle, ticket},
};
use anyhow::Result;

/// # Errors
/// Returns an error if the ticket or throttle settings are invalid.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let ticket_policy = ticket::parse(matches)?;
    let throttle = throttle::Options::parse(matches)?;
    let identifier_mode = auth::parse(matches);

    Ok(Action::Server(Args {
        port,
        ticket_policy,
        throttle: throttle.config,
        identifier_mode,
        cleaner_owner: throttle.cleaner_owner,
    }))
}
