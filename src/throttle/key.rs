//! Client key construction.

use axum::http::HeaderMap;
use std::{fmt, net::SocketAddr, str::FromStr};

const UNKNOWN_CLIENT: &str = "unknown";

/// How throttle state is bucketed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum KeyStrategy {
    /// One bucket per remote IP address.
    #[default]
    IpAddress,
    /// One bucket per submitted username and remote IP address pair.
    IpAddressAndUsername,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown throttle key strategy: {0}")]
pub struct UnknownKeyStrategy(String);

impl KeyStrategy {
    pub const ALL: [Self; 2] = [Self::IpAddress, Self::IpAddressAndUsername];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::IpAddress => "ip",
            Self::IpAddressAndUsername => "ip-and-username",
        }
    }

    #[must_use]
    pub fn needs_username(self) -> bool {
        matches!(self, Self::IpAddressAndUsername)
    }

    /// Build the tracker key. A missing username is keyed as empty.
    #[must_use]
    pub fn construct_key(self, ip: &str, username: Option<&str>) -> String {
        match self {
            Self::IpAddress => ip.to_string(),
            Self::IpAddressAndUsername => {
                let username = username.map(str::trim).unwrap_or_default().to_lowercase();
                format!("{username};{ip}")
            }
        }
    }
}

impl FromStr for KeyStrategy {
    type Err = UnknownKeyStrategy;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == value)
            .ok_or_else(|| UnknownKeyStrategy(value.to_string()))
    }
}

impl fmt::Display for KeyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remote client address.
///
/// The socket peer is used unless `trust_forwarded` is set. Only enable that
/// behind a reverse proxy that overwrites the headers: clients can send any
/// value. When trusted, the first `X-Forwarded-For` entry wins, then
/// `X-Real-IP`, then the peer.
#[must_use]
pub fn client_ip(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_forwarded: bool,
) -> String {
    let forwarded = if trust_forwarded {
        forwarded_ip(headers)
    } else {
        None
    };
    forwarded
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };
    header("x-forwarded-for").or_else(|| header("x-real-ip"))
}
